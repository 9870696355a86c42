use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::io::{self, Write};

use crate::core::LanguageModel;
use crate::envconfig;
use crate::llm::{self, OllamaOptions, PipelineOptions};
use crate::splitter::{self, SplitOptions};

pub async fn split(path: &str, headers: &str, keep_headers: bool, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let pairs = parse_header_spec(headers)?;
    let refs: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(marker, name)| (marker.as_str(), name.as_str()))
        .collect();

    let options = SplitOptions {
        strip_headers: !keep_headers,
        ..Default::default()
    };
    let fragments = splitter::split_markdown_text(&text, &refs, options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&fragments)?);
    } else {
        for (index, fragment) in fragments.iter().enumerate() {
            println!("--- fragment {index} ---");
            for (key, value) in &fragment.metadata {
                println!("{key}: {value}");
            }
            println!("{}", fragment.page_content);
        }
    }
    Ok(())
}

pub async fn generate(
    prompt: &str,
    model: &str,
    base_url: Option<String>,
    hf: bool,
    stream: bool,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
) -> Result<()> {
    let handle: Box<dyn LanguageModel> = if hf {
        let mut options = PipelineOptions::default();
        if let Some(t) = temperature {
            options.temperature = Some(t as f64);
        }
        if let Some(n) = max_tokens {
            options.max_new_tokens = n;
        }
        Box::new(llm::load_llm_hf(model, llm::TEXT_GENERATION_TASK, options)?)
    } else {
        let base_url = base_url.unwrap_or_else(|| envconfig::Host::from_env().base_url());
        let mut options = OllamaOptions::default();
        if let Some(t) = temperature {
            options.temperature = t;
        }
        if let Some(n) = max_tokens {
            options.num_predict = n as i32;
        }
        Box::new(llm::load_llm_ollama(model, &base_url, options)?)
    };

    if stream {
        let mut chunks = llm::generate_streaming_response(prompt, handle.as_ref()).await?;
        while let Some(chunk) = chunks.next().await {
            print!("{}", chunk?);
            io::stdout().flush()?;
        }
        println!();
    } else {
        let response = llm::generate_response(prompt, handle.as_ref()).await?;
        println!("{response}");
    }
    Ok(())
}

fn parse_header_spec(spec: &str) -> Result<Vec<(String, String)>> {
    spec.split(',')
        .map(|part| {
            let (marker, name) = part.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("invalid header spec {part:?}, expected marker=name")
            })?;
            Ok((marker.trim().to_string(), name.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_spec() {
        let pairs = parse_header_spec("#=h1,##=h2").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("#".to_string(), "h1".to_string()));
        assert_eq!(pairs[1], ("##".to_string(), "h2".to_string()));
    }

    #[test]
    fn test_parse_header_spec_rejects_missing_name() {
        assert!(parse_header_spec("#").is_err());
    }
}
