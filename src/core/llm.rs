use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

/// A finite sequence of generated output chunks, delivered in the order the
/// model produces them. Ends when the model signals completion; an `Err`
/// item terminates the stream without retracting earlier chunks.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A loaded, ready-to-invoke language model.
///
/// The handle is reusable: repeated calls on the same handle are
/// independent generations. Implementations exist for an in-process
/// pipeline ([`crate::llm::LocalPipeline`]) and a remote Ollama endpoint
/// ([`crate::llm::OllamaLlm`]).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one full generation and return the complete output.
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError>;

    /// Start a generation and return its output incrementally. Each call
    /// begins from scratch; a stream cannot be resumed once dropped.
    async fn invoke_stream(&self, prompt: &str) -> Result<TokenStream, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("error loading model {model}: {reason}")]
    ModelLoad { model: String, reason: String },
    #[error("error generating: {0}")]
    Generation(String),
}

impl LlmError {
    pub fn model_load(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}
