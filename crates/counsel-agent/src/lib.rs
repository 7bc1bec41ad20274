pub mod agents;
pub mod gemini;
pub mod inference;
pub mod ollama;
pub mod orchestrator;
pub mod prompt;

pub use gemini::GeminiBackend;
pub use inference::{Inference, InferenceBackend, ModelTier, Prompt};
pub use ollama::OllamaBackend;
pub use orchestrator::Orchestrator;
