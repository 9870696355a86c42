pub mod cmd;
pub mod core;
pub mod envconfig;
pub mod llm;
pub mod splitter;

pub use crate::core::{Fragment, LanguageModel, LlmError, TokenStream};
pub use crate::llm::{
    generate_response, generate_streaming_response, load_llm_hf, load_llm_ollama, LocalPipeline,
    OllamaLlm, OllamaOptions, PipelineOptions,
};
pub use crate::splitter::{
    split_markdown_text, MarkdownHeaderSplitter, SplitOptions, SplitterError,
};
