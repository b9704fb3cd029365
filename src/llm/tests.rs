// Live checks against a local Ollama server; run with `--ignored`.

use std::time::Duration;

use super::ollama::{OllamaClient, OllamaEmbedder, OllamaLanguageModel};
use super::provider::{Embedder, LanguageModel};
use super::ModelGuard;

const LIVE_URL: &str = "http://localhost:11434";

#[tokio::test]
#[ignore]
async fn test_live_ollama_embedding() {
    let client = OllamaClient::new(LIVE_URL, Duration::from_secs(60)).unwrap();
    if !client.health_check().await {
        panic!("Ollama is not reachable at {}", LIVE_URL);
    }

    let embedder = OllamaEmbedder::new(client, "nomic-embed-text");
    let first = embedder.embed("I love raclette cheese.").await.unwrap();
    let second = embedder.embed("I like raclette cheese.").await.unwrap();

    assert_eq!(first.len(), second.len());
    let similarity = crate::vector_math::cosine_similarity(&first, &second);
    println!("similarity: {}", similarity);
    assert!(similarity > 0.8);
}

#[tokio::test]
#[ignore]
async fn test_live_ollama_generation_with_guard() {
    let client = OllamaClient::new(LIVE_URL, Duration::from_secs(60)).unwrap();
    let models = client.list_models().await.unwrap();
    for m in &models {
        println!(" - {} ({} bytes)", m.name, m.size);
    }

    let guard = ModelGuard::new(OllamaLanguageModel::new(client, "mistral"));
    let mut rx = guard.stream_generate("Say hello in one word.").await.unwrap();

    let mut answer = String::new();
    while let Some(fragment) = rx.recv().await {
        answer.push_str(&fragment.unwrap());
    }
    println!("answer: {}", answer);
    assert!(!answer.is_empty());
}
