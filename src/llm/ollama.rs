use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{LanguageModel, LlmError, TokenStream};
use crate::envconfig;

/// Model handle bound to a remote Ollama endpoint.
#[derive(Debug)]
pub struct OllamaLlm {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: OllamaOptions,
}

/// Sampling options forwarded verbatim in the request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: usize,
    #[serde(default = "default_num_predict")]
    pub num_predict: i32,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub seed: i32,
}

fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    0.9
}
fn default_num_ctx() -> usize {
    2048
}
fn default_num_predict() -> i32 {
    -1
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            num_ctx: default_num_ctx(),
            num_predict: default_num_predict(),
            stop: Vec::new(),
            seed: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a OllamaOptions,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
    #[serde(default)]
    pub total_duration: Option<i64>,
    #[serde(default)]
    pub eval_count: Option<i32>,
}

// One newline-delimited JSON object of a streaming response.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaLlm {
    pub fn new(model: &str, base_url: &str, options: OllamaOptions) -> Result<Self, LlmError> {
        let url = Url::parse(base_url).map_err(|e| {
            LlmError::model_load(model, format!("invalid base url {base_url:?}: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LlmError::model_load(
                model,
                format!("unsupported url scheme {:?}", url.scheme()),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(envconfig::request_timeout())
            .build()
            .map_err(|e| LlmError::model_load(model, e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options,
        })
    }

    async fn send_generate(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: &self.options,
        };

        tracing::debug!(model = %self.model, stream, "sending generate request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Generation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Generation(format!("HTTP {status}: {body}")));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl LanguageModel for OllamaLlm {
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.send_generate(prompt, false).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Generation(e.to_string()))?;
        Ok(body.response)
    }

    async fn invoke_stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        let response = self.send_generate(prompt, true).await?;

        // NDJSON: lines can split across byte chunks, so carry a buffer.
        let mut buffer = String::new();
        let mut finished = false;
        let chunks = response.bytes_stream().flat_map(move |chunk_result| {
            let items: Vec<Result<String, LlmError>> = match chunk_result {
                Ok(bytes) if !finished => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    let mut out = Vec::new();
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        match parse_stream_line(line.trim()) {
                            None => continue,
                            Some(Err(e)) => out.push(Err(e)),
                            Some(Ok(chunk)) => {
                                if !chunk.response.is_empty() {
                                    out.push(Ok(chunk.response));
                                }
                                if chunk.done {
                                    finished = true;
                                    break;
                                }
                            }
                        }
                    }
                    out
                }
                Ok(_) => Vec::new(),
                Err(e) => vec![Err(LlmError::Generation(e.to_string()))],
            };
            futures::stream::iter(items)
        });

        Ok(Box::pin(chunks))
    }
}

fn parse_stream_line(line: &str) -> Option<Result<StreamChunk, LlmError>> {
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamChunk>(line) {
        Ok(chunk) => match chunk.error {
            Some(message) => Some(Err(LlmError::Generation(message))),
            None => Some(Ok(chunk)),
        },
        Err(e) => Some(Err(LlmError::Generation(format!(
            "invalid stream payload: {e}"
        )))),
    }
}

/// Load a language model served by a remote Ollama endpoint.
pub fn load_llm_ollama(
    model_name: &str,
    base_url: &str,
    options: OllamaOptions,
) -> Result<OllamaLlm, LlmError> {
    OllamaLlm::new(model_name, base_url, options)
}
