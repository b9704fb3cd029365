use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceUnavailable(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("language model error: {0}")]
    LanguageModel(String),
    #[error("index store error: {0}")]
    IndexStore(String),
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported document: {0}")]
    UnsupportedDocument(String),
    #[error("failed to load document: {0}")]
    DocumentLoad(String),
    #[error("chunks out of order: {0}")]
    ChunkOrder(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(String),
}

impl RagError {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        RagError::IndexStore(err.to_string())
    }

    pub fn io<E: std::fmt::Display>(err: E) -> Self {
        RagError::Io(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::EmbeddingServiceUnavailable(err.to_string())
    }

    pub fn llm<E: std::fmt::Display>(err: E) -> Self {
        RagError::LanguageModel(err.to_string())
    }

    /// Errors caused by caller input rather than a failing service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RagError::MissingParameter(_)
                | RagError::NotFound(_)
                | RagError::UnsupportedDocument(_)
        )
    }

    /// Short message suitable for end users; service failures are not detailed.
    pub fn user_message(&self) -> String {
        match self {
            RagError::MissingParameter(name) => format!("Missing parameter: {}", name),
            RagError::NotFound(what) => format!("Not found: {}", what),
            RagError::UnsupportedDocument(name) => format!("Unsupported document: {}", name),
            _ => "The request could not be completed. Please try again later.".to_string(),
        }
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(RagError::MissingParameter("query".into()).is_client_error());
        assert!(RagError::NotFound("doc".into()).is_client_error());
        assert!(!RagError::store("disk full").is_client_error());
        assert!(!RagError::ModelNotFound("mistral".into()).is_client_error());
    }

    #[test]
    fn service_errors_hide_details_from_users() {
        let err = RagError::embedding("connection refused on 127.0.0.1:11434");
        assert!(!err.user_message().contains("11434"));
        assert_eq!(
            RagError::NotFound("report.pdf".into()).user_message(),
            "Not found: report.pdf"
        );
    }
}
