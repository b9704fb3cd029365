use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize index store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Failed to initialize model client: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to build query engine: {0}")]
    Engine(#[source] anyhow::Error),
}
