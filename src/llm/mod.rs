pub mod guard;
pub mod ollama;
pub mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use guard::{GuardState, ModelGuard};
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLanguageModel};
pub use provider::{Embedder, FragmentReceiver, LanguageModel};
