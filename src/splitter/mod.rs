use std::collections::BTreeMap;

use crate::core::Fragment;

#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    #[error("failed to split markdown document: {0}")]
    SplitFailed(String),
}

/// Knobs forwarded to the splitter, mirroring the keyword arguments the
/// calling layer passes through.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Drop header lines from fragment content, keeping them only as
    /// metadata. Defaults to true.
    pub strip_headers: bool,
    /// Skip aggregation and emit one fragment per blank-line-separated
    /// block instead of one per header section. Defaults to false.
    pub return_each_line: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            strip_headers: true,
            return_each_line: false,
        }
    }
}

/// Splits markdown into fragments annotated with the header path each
/// piece of content occurs under.
///
/// Headers are recognized by configured `(marker, label)` pairs, e.g.
/// `("##", "h2")`. A header at a given level closes every tracked header
/// at the same or deeper level, so metadata always reflects the current
/// header path. Fenced code blocks are opaque: header-looking lines inside
/// them are plain content.
pub struct MarkdownHeaderSplitter {
    // sorted longest marker first so "##" is never matched by the "#" rule
    headers_to_split_on: Vec<(String, String)>,
    strip_headers: bool,
    return_each_line: bool,
}

struct Section {
    content: String,
    metadata: BTreeMap<String, String>,
}

impl MarkdownHeaderSplitter {
    pub fn new(
        headers_to_split_on: &[(&str, &str)],
        options: SplitOptions,
    ) -> Result<Self, SplitterError> {
        if headers_to_split_on.is_empty() {
            return Err(SplitterError::SplitFailed(
                "no header markers configured".to_string(),
            ));
        }
        for (marker, _) in headers_to_split_on {
            if marker.trim().is_empty() {
                return Err(SplitterError::SplitFailed(
                    "header marker must not be empty".to_string(),
                ));
            }
        }

        let mut headers: Vec<(String, String)> = headers_to_split_on
            .iter()
            .map(|(marker, name)| (marker.to_string(), name.to_string()))
            .collect();
        headers.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self {
            headers_to_split_on: headers,
            strip_headers: options.strip_headers,
            return_each_line: options.return_each_line,
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<Fragment> {
        tracing::debug!(chars = text.len(), "splitting markdown text");

        let mut sections: Vec<Section> = Vec::new();
        let mut current_content: Vec<String> = Vec::new();
        // headers currently in scope, as (level, label) in nesting order
        let mut active_headers: Vec<(usize, String)> = Vec::new();
        let mut metadata: BTreeMap<String, String> = BTreeMap::new();
        // metadata as of the previous line; content flushed at a header
        // boundary belongs to the section that header closes
        let mut scope_metadata: BTreeMap<String, String> = BTreeMap::new();
        let mut in_code_block = false;
        let mut opening_fence = "";

        for raw_line in text.lines() {
            let line = raw_line.trim();

            if !in_code_block {
                if line.starts_with("```") && line.matches("```").count() == 1 {
                    in_code_block = true;
                    opening_fence = "```";
                } else if line.starts_with("~~~") {
                    in_code_block = true;
                    opening_fence = "~~~";
                }
            } else if line.starts_with(opening_fence) {
                in_code_block = false;
                opening_fence = "";
            }

            if in_code_block {
                current_content.push(line.to_string());
                scope_metadata = metadata.clone();
                continue;
            }

            if let Some((marker, name)) = self.match_header(line) {
                let level = marker.chars().filter(|c| *c == '#').count();
                while active_headers
                    .last()
                    .map_or(false, |(active_level, _)| *active_level >= level)
                {
                    if let Some((_, closed)) = active_headers.pop() {
                        metadata.remove(&closed);
                    }
                }
                let value = line[marker.len()..].trim().to_string();
                active_headers.push((level, name.clone()));
                metadata.insert(name, value);

                if !current_content.is_empty() {
                    sections.push(Section {
                        content: current_content.join("\n"),
                        metadata: scope_metadata.clone(),
                    });
                    current_content.clear();
                }
                if !self.strip_headers {
                    current_content.push(line.to_string());
                }
            } else if !line.is_empty() {
                current_content.push(line.to_string());
            } else if !current_content.is_empty() {
                sections.push(Section {
                    content: current_content.join("\n"),
                    metadata: scope_metadata.clone(),
                });
                current_content.clear();
            }

            scope_metadata = metadata.clone();
        }

        if !current_content.is_empty() {
            sections.push(Section {
                content: current_content.join("\n"),
                metadata: scope_metadata,
            });
        }

        let fragments = if self.return_each_line {
            sections
                .into_iter()
                .map(|section| Fragment::new(section.content, section.metadata))
                .collect()
        } else {
            aggregate_sections(sections)
        };

        tracing::debug!(fragments = fragments.len(), "markdown split complete");
        fragments
    }

    fn match_header(&self, line: &str) -> Option<(String, String)> {
        for (marker, name) in &self.headers_to_split_on {
            let matches = line.starts_with(marker.as_str())
                && (line.len() == marker.len() || line.as_bytes()[marker.len()] == b' ');
            if matches {
                return Some((marker.clone(), name.clone()));
            }
        }
        None
    }
}

/// Merge consecutive sections sharing the same header metadata into one
/// fragment, joining their content with newlines.
fn aggregate_sections(sections: Vec<Section>) -> Vec<Fragment> {
    let mut fragments: Vec<Fragment> = Vec::new();
    for section in sections {
        match fragments.last_mut() {
            Some(last) if last.metadata == section.metadata => {
                last.page_content.push('\n');
                last.page_content.push_str(&section.content);
            }
            _ => fragments.push(Fragment::new(section.content, section.metadata)),
        }
    }
    fragments
}

/// Split a markdown document into header-annotated fragments.
pub fn split_markdown_text(
    text: &str,
    headers_to_split_on: &[(&str, &str)],
    options: SplitOptions,
) -> Result<Vec<Fragment>, SplitterError> {
    let splitter = MarkdownHeaderSplitter::new(headers_to_split_on, options)?;
    Ok(splitter.split_text(text))
}
