use super::service::AppConfig;
use crate::core::errors::RagError;

const MAX_TOP_K: usize = 100;

pub fn validate_config(config: &AppConfig) -> Result<(), RagError> {
    let rag = &config.rag;

    if rag.chunk_size == 0 {
        return Err(invalid("rag.chunk_size", "must be greater than 0"));
    }
    if rag.chunk_overlap >= rag.chunk_size {
        return Err(invalid(
            "rag.chunk_overlap",
            &format!("must be smaller than chunk_size ({})", rag.chunk_size),
        ));
    }
    if rag.top_k == 0 || rag.top_k > MAX_TOP_K {
        return Err(invalid(
            "rag.top_k",
            &format!("must be between 1 and {}", MAX_TOP_K),
        ));
    }
    for placeholder in ["{context}", "{question}"] {
        if !rag.prompt_template.contains(placeholder) {
            return Err(invalid(
                "rag.prompt_template",
                &format!("must contain the {} placeholder", placeholder),
            ));
        }
    }
    if rag.channel.trim().is_empty() {
        return Err(invalid("rag.channel", "must not be empty"));
    }

    let ollama = &config.ollama;
    if ollama.base_url.trim().is_empty() {
        return Err(invalid("ollama.base_url", "must not be empty"));
    }
    if ollama.embedding_model.trim().is_empty() {
        return Err(invalid("ollama.embedding_model", "must not be empty"));
    }
    if ollama.language_model.trim().is_empty() {
        return Err(invalid("ollama.language_model", "must not be empty"));
    }

    Ok(())
}

fn invalid(field: &str, reason: &str) -> RagError {
    RagError::InvalidConfig(format!("{} {}", field, reason))
}
