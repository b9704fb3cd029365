use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::events::EventHub;
use crate::llm::{Embedder, LanguageModel, ModelGuard, OllamaClient, OllamaEmbedder, OllamaLanguageModel};
use crate::rag::{IndexStore, Ingestor, QueryEngine, SqliteIndexStore};

pub mod error;

use error::InitializationError;

/// Process-wide services, built once and passed to whoever needs them.
///
/// Holds:
/// - Paths and the loaded configuration
/// - The index store (SQLite)
/// - The embedding and language model clients
/// - Ingestion and query services sharing that store
/// - The live-delivery hub
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub ollama: OllamaClient,
    pub store: Arc<dyn IndexStore>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn LanguageModel>,
    pub ingestor: Arc<Ingestor>,
    pub engine: Arc<QueryEngine>,
    pub events: Arc<EventHub>,
}

impl AppState {
    /// Load the config for `paths` and build the state.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let service = ConfigService::new(paths.clone());
        let config_path = service.config_path();
        let config = service.load_config().map_err(|e| {
            InitializationError::Config(
                anyhow::Error::new(e).context(format!("reading {}", config_path.display())),
            )
        })?;
        Self::with_config(paths, config).await
    }

    /// Build the state from explicit paths and config.
    ///
    /// 1. Opening the SQLite index
    /// 2. Connecting the Ollama embedder and guarded language model
    /// 3. Wiring ingestion and query services over the shared store
    pub async fn with_config(
        paths: Arc<AppPaths>,
        config: AppConfig,
    ) -> Result<Arc<Self>, InitializationError> {
        let store: Arc<dyn IndexStore> = Arc::new(
            SqliteIndexStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );

        let ollama = OllamaClient::from_config(&config.ollama)
            .map_err(|e| InitializationError::Llm(e.into()))?;
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
            ollama.clone(),
            config.ollama.embedding_model.clone(),
        ));
        let model: Arc<dyn LanguageModel> = Arc::new(ModelGuard::new(OllamaLanguageModel::new(
            ollama.clone(),
            config.ollama.language_model.clone(),
        )));

        let ingestor = Arc::new(Ingestor::new(
            store.clone(),
            embedder.clone(),
            &config.rag,
            paths.documents_dir.clone(),
        ));
        let engine = Arc::new(
            QueryEngine::new(store.clone(), embedder.clone(), model.clone(), &config.rag)
                .map_err(|e| InitializationError::Engine(e.into()))?,
        );

        tracing::debug!(
            "State ready: index at {}, models {} / {}",
            paths.db_path.display(),
            embedder.model_name(),
            model.model_name()
        );

        Ok(Arc::new(AppState {
            paths,
            config: Arc::new(config),
            ollama,
            store,
            embedder,
            model,
            ingestor,
            engine,
            events: Arc::new(EventHub::new()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_builds_offline_against_temp_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::with_data_dir(
            tmp.path().to_path_buf(),
            tmp.path().join("data"),
        ));

        let state = AppState::with_config(paths.clone(), AppConfig::default())
            .await
            .unwrap();

        assert!(paths.db_path.exists());
        assert_eq!(state.store.count().await.unwrap(), 0);
        assert_eq!(state.embedder.model_name(), "nomic-embed-text");
        assert_eq!(state.model.model_name(), "mistral");

        // empty index never reaches the network
        let answer = state.engine.answer("anything").await.unwrap();
        assert!(answer.is_fallback());
    }

    #[tokio::test]
    async fn initialize_reads_and_validates_user_config() {
        if std::env::var("DOCQA_CONFIG_PATH").is_ok() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let paths = Arc::new(AppPaths::with_data_dir(tmp.path().to_path_buf(), data.clone()));

        let mut config = AppConfig::default();
        config.rag.top_k = 2;
        ConfigService::new(paths.clone()).save_config(&config).unwrap();
        let state = AppState::initialize(paths.clone()).await.unwrap();
        assert_eq!(state.config.rag.top_k, 2);

        std::fs::write(data.join("config.yml"), "rag:\n  chunk_size: 0\n").unwrap();
        let err = AppState::initialize(paths).await.err().unwrap();
        assert!(matches!(err, InitializationError::Config(_)));
    }
}
