pub mod document;
pub mod llm;

pub use document::Fragment;
pub use llm::{LanguageModel, LlmError, TokenStream};
