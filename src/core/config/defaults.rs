pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_LANGUAGE_MODEL: &str = "mistral";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_CHUNK_SIZE: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP: usize = 80;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
pub const DEFAULT_CHANNEL: &str = "chat";

pub const DEFAULT_EMPTY_INDEX_MESSAGE: &str =
    "Sorry, the knowledge base is empty. Please add documents before asking a question.";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Answer the question based only on the following context:

{context}

---

Answer the question based on the above context: {question}";
