pub mod llm_client;

pub use llm_client::{ChatMessage, ChatRole, LanguageModel, OpenAiClient};
