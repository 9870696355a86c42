use std::collections::BTreeMap;

use serde::Serialize;

/// A contiguous piece of source text annotated with the header path it
/// occurs under. Produced by the markdown splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub page_content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Fragment {
    pub fn new(page_content: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }
}
