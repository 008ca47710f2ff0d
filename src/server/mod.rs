// Answering service and its completion provider

pub mod answering;
pub mod llm;

pub use answering::AnsweringService;
pub use llm::{CompletionProvider, OpenRouterProvider};
