use std::path::PathBuf;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::{LanguageModel, LlmError, TokenStream};

/// The only pipeline task the handle interface can honor.
pub const TEXT_GENERATION_TASK: &str = "text-generation";

/// Sampling and length options for the in-process pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_new_tokens: usize,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: None,
            top_p: None,
            seed: 42,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

/// Model handle backed by a Llama-family causal LM running in-process.
///
/// Weights and tokenizer are pulled from the Hugging Face hub at load time;
/// generation runs on candle with a fresh KV cache per invocation, so the
/// handle stays reusable and calls stay independent.
pub struct LocalPipeline {
    inner: Arc<PipelineInner>,
}

impl std::fmt::Debug for LocalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPipeline").finish_non_exhaustive()
    }
}

struct PipelineInner {
    model: Llama,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    dtype: DType,
    options: PipelineOptions,
}

impl LocalPipeline {
    pub fn load(model_id: &str, task: &str, options: PipelineOptions) -> Result<Self, LlmError> {
        if task != TEXT_GENERATION_TASK {
            return Err(LlmError::model_load(
                model_id,
                format!("unsupported task {task:?}, expected {TEXT_GENERATION_TASK:?}"),
            ));
        }

        let device = select_device();
        tracing::info!(device = ?device, model = model_id, "loading local text generation pipeline");

        let api = Api::new().map_err(|e| LlmError::model_load(model_id, e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| LlmError::model_load(model_id, format!("tokenizer.json: {e}")))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| LlmError::model_load(model_id, format!("tokenizer: {e}")))?;

        let config_path = repo
            .get("config.json")
            .map_err(|e| LlmError::model_load(model_id, format!("config.json: {e}")))?;
        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::model_load(model_id, format!("read config: {e}")))?;
        let llama_config: LlamaConfig = serde_json::from_str(&config_contents)
            .map_err(|e| LlmError::model_load(model_id, format!("parse config: {e}")))?;
        let config = llama_config.into_config(false);

        let weight_paths = resolve_weight_files(&repo)
            .map_err(|e| LlmError::model_load(model_id, format!("weights: {e}")))?;
        let dtype = select_dtype(&device);

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&weight_paths, dtype, &device)
                .map_err(|e| LlmError::model_load(model_id, format!("weights: {e}")))?
        };
        let model = Llama::load(vb, &config)
            .map_err(|e| LlmError::model_load(model_id, format!("model: {e}")))?;

        tracing::info!(
            model = model_id,
            files = weight_paths.len(),
            "local pipeline ready"
        );

        Ok(Self {
            inner: Arc::new(PipelineInner {
                model,
                tokenizer,
                config,
                device,
                dtype,
                options,
            }),
        })
    }
}

// Single-file checkpoints ship model.safetensors; larger ones ship an
// index mapping tensor names to shard files.
fn resolve_weight_files(repo: &ApiRepo) -> anyhow::Result<Vec<PathBuf>> {
    if let Ok(single) = repo.get("model.safetensors") {
        return Ok(vec![single]);
    }

    let index_path = repo.get("model.safetensors.index.json")?;
    let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&index_path)?)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow::anyhow!("malformed safetensors index"))?;

    let mut files: Vec<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    files.sort_unstable();
    files.dedup();

    files.into_iter().map(|f| Ok(repo.get(f)?)).collect()
}

fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        return device;
    }
    Device::new_metal(0).unwrap_or(Device::Cpu)
}

fn select_dtype(device: &Device) -> DType {
    if device.is_cpu() {
        DType::F32
    } else {
        DType::F16
    }
}

fn generation_error(e: candle_core::Error) -> LlmError {
    LlmError::Generation(e.to_string())
}

impl PipelineInner {
    // Blocking token loop. `on_chunk` receives each newly decoded piece of
    // the completion as soon as it is UTF-8 complete.
    fn generate<F>(&self, prompt: &str, mut on_chunk: F) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)
            .map_err(generation_error)?;

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| LlmError::Generation(e.to_string()))?;
        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        let prompt_len = tokens.len();

        let mut logits_processor = LogitsProcessor::new(
            self.options.seed,
            self.options.temperature,
            self.options.top_p,
        );
        let mut output = String::new();

        for step in 0..self.options.max_new_tokens {
            let (context, context_offset) = if step == 0 {
                (&tokens[..], 0)
            } else {
                (&tokens[tokens.len() - 1..], tokens.len() - 1)
            };
            let input = Tensor::new(context, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(generation_error)?;
            let logits = self
                .model
                .forward(&input, context_offset, &mut cache)
                .and_then(|t| t.squeeze(0))
                .map_err(generation_error)?;
            let logits = if self.options.repeat_penalty == 1.0 {
                logits
            } else {
                let start = tokens.len().saturating_sub(self.options.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.options.repeat_penalty,
                    &tokens[start..],
                )
                .map_err(generation_error)?
            };

            let next = logits_processor.sample(&logits).map_err(generation_error)?;
            tokens.push(next);
            if self.is_eos(next) {
                break;
            }

            let decoded = self
                .tokenizer
                .decode(&tokens[prompt_len..], true)
                .map_err(|e| LlmError::Generation(e.to_string()))?;
            // emit only once the suffix is a complete UTF-8 sequence
            if decoded.len() > output.len() && decoded.is_char_boundary(output.len()) {
                on_chunk(&decoded[output.len()..]);
                output = decoded;
            }
        }

        Ok(output)
    }

    fn is_eos(&self, token: u32) -> bool {
        match &self.config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => token == *id,
            Some(LlamaEosToks::Multiple(ids)) => ids.contains(&token),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for LocalPipeline {
    async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || inner.generate(&prompt, |_| {}))
            .await
            .map_err(|e| LlmError::Generation(e.to_string()))?
    }

    async fn invoke_stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, LlmError>>(32);

        tokio::task::spawn_blocking(move || {
            let sender = tx.clone();
            let result = inner.generate(&prompt, |chunk| {
                let _ = sender.blocking_send(Ok(chunk.to_string()));
            });
            if let Err(e) = result {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Load a tokenizer and causal LM identified by `model_id` from the
/// Hugging Face hub and wrap them as an in-process pipeline handle.
pub fn load_llm_hf(
    model_id: &str,
    task: &str,
    options: PipelineOptions,
) -> Result<LocalPipeline, LlmError> {
    LocalPipeline::load(model_id, task, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = PipelineOptions::default();
        assert_eq!(options.max_new_tokens, 512);
        assert!(options.temperature.is_none());
        assert_eq!(options.repeat_penalty, 1.1);
    }

    #[test]
    fn test_unknown_task_is_rejected_before_loading() {
        let err = load_llm_hf("meta-llama/Llama-3.2-1B", "summarization", PipelineOptions::default())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("meta-llama/Llama-3.2-1B"));
        assert!(message.contains("summarization"));
        assert!(message.contains(TEXT_GENERATION_TASK));
    }
}
