use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::paths::AppPaths;
use super::validation::validate_config;
use crate::core::errors::RagError;

/// Connection details for the model server that provides both embeddings and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub language_model: String,
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            language_model: DEFAULT_LANGUAGE_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Chunking and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub context_separator: String,
    pub prompt_template: String,
    pub empty_index_message: String,
    pub channel: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            context_separator: DEFAULT_CONTEXT_SEPARATOR.to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            empty_index_message: DEFAULT_EMPTY_INDEX_MESSAGE.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ollama: OllamaConfig,
    pub rag: RagSettings,
}

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("DOCQA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn config_write_path(&self) -> PathBuf {
        if let Ok(path) = env::var("DOCQA_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        self.paths.user_data_dir.join("config.yml")
    }

    /// Load and validate the config. A missing file yields the defaults.
    pub fn load_config(&self) -> Result<AppConfig, RagError> {
        let config = load_yaml_file(&self.config_path())?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<PathBuf, RagError> {
        validate_config(config)?;

        let path = self.config_write_path();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let yaml = serde_yaml::to_string(config)
            .map_err(|e| RagError::InvalidConfig(e.to_string()))?;
        fs::write(&path, yaml)?;
        Ok(path)
    }
}

fn load_yaml_file(path: &Path) -> Result<AppConfig, RagError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    serde_yaml::from_str::<AppConfig>(&contents)
        .map_err(|e| RagError::InvalidConfig(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_in(dir: &Path) -> ConfigService {
        let paths = AppPaths::with_data_dir(dir.to_path_buf(), dir.join("data"));
        ConfigService::new(Arc::new(paths))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_yaml_file(&tmp.path().join("absent.yml")).unwrap();

        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.rag.chunk_overlap, 80);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.ollama.embedding_model, "nomic-embed-text");
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(
            &path,
            "ollama:\n  language_model: llama3\nrag:\n  top_k: 3\n",
        )
        .unwrap();

        let config = load_yaml_file(&path).unwrap();
        assert_eq!(config.ollama.language_model, "llama3");
        assert_eq!(config.ollama.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(&path, "rag: [not, a, map").unwrap();

        assert!(matches!(
            load_yaml_file(&path),
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn save_then_load_uses_user_config() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());

        let mut config = AppConfig::default();
        config.rag.chunk_size = 400;
        config.rag.chunk_overlap = 40;
        let written = service.save_config(&config).unwrap();
        assert!(written.exists());

        if env::var("DOCQA_CONFIG_PATH").is_err() {
            let loaded = service.load_config().unwrap();
            assert_eq!(loaded.rag.chunk_size, 400);
        }
    }
}
