pub mod local;
pub mod ollama;

pub use local::{load_llm_hf, LocalPipeline, PipelineOptions, TEXT_GENERATION_TASK};
pub use ollama::{load_llm_ollama, OllamaLlm, OllamaOptions};

use futures::StreamExt;

use crate::core::{LanguageModel, LlmError, TokenStream};

/// Generate a complete response from a loaded model.
///
/// The handle's output is returned unmodified; any failure is normalized
/// into a generation error carrying the original message.
pub async fn generate_response(
    prompt: &str,
    llm: &dyn LanguageModel,
) -> Result<String, LlmError> {
    llm.invoke(prompt).await.map_err(to_generation_error)
}

/// Generate a response incrementally, yielding chunks in the order the
/// model produces them.
///
/// Chunks already yielded before a mid-stream failure stay delivered; the
/// failure itself arrives as the stream's final `Err` item.
pub async fn generate_streaming_response(
    prompt: &str,
    llm: &dyn LanguageModel,
) -> Result<TokenStream, LlmError> {
    let chunks = llm
        .invoke_stream(prompt)
        .await
        .map_err(to_generation_error)?;
    Ok(Box::pin(chunks.map(|item| item.map_err(to_generation_error))))
}

fn to_generation_error(e: LlmError) -> LlmError {
    match e {
        LlmError::Generation(_) => e,
        other => LlmError::Generation(other.to_string()),
    }
}
