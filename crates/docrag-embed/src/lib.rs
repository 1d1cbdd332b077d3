//! Embedding back-ends behind `docrag_core::traits::Embedder`.
//!
//! - [`SentenceEmbedder`]: local XLM-RoBERTa sentence encoder on candle
//!   (mean pooling + L2 norm), e.g. `paraphrase-multilingual-mpnet-base-v2`.
//! - [`HashEmbedder`]: deterministic token-hash vectors for tests and offline
//!   development. Selected by `APP_USE_FAKE_EMBEDDINGS=1` or `embed.provider = "hash"`.

use anyhow::{anyhow, bail, Context, Result};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use twox_hash::XxHash64;

use docrag_core::config::{expand_path, EmbedSettings};
use docrag_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

pub struct SentenceEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl SentenceEmbedder {
    /// Load tokenizer, config and weights from `model_dir`.
    ///
    /// Weights are read from `model.safetensors` when present, otherwise from
    /// `pytorch_model.bin`.
    pub fn load(model_dir: &Path, model_name: &str, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        tracing::info!(model = model_name, dir = %model_dir.display(), "loading sentence encoder");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("<pad>").unwrap_or(1);

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let vb = load_weights(model_dir, &device)?;
        // Some exports nest the encoder under `roberta.`.
        let vb = if vb.contains_tensor("roberta.embeddings.word_embeddings.weight") { vb.pp("roberta") } else { vb };
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!(dim, max_len, "sentence encoder ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            id: format!("local:{}:d{}", model_name, dim),
            dim,
            max_len,
            pad_id,
        })
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "encoded batch");
        Ok(vectors)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while the model is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    if !weights_path.exists() {
        bail!("No model.safetensors or pytorch_model.bin in {}", model_dir.display());
    }
    let weights = candle_core::pickle::read_all(&weights_path)?;
    let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl Embedder for SentenceEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.encode(texts)
    }
}

/// Bag-of-tokens hashing embedder. Identical texts map to identical unit
/// vectors and texts sharing words land close together, which is all the
/// retrieval tests need.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    /// `dim` is clamped to at least 1.
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:xxh64:d{}", dim) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbedSettings) -> Result<Arc<dyn Embedder>> {
    if !matches!(settings.provider.as_str(), "local" | "hash") {
        bail!("Unknown embed.provider '{}' (expected 'local' or 'hash')", settings.provider);
    }
    if settings.hash_dim == 0 {
        bail!("embed.hash_dim must be at least 1");
    }
    if fake_embeddings_requested() || settings.provider == "hash" {
        tracing::info!(dim = settings.hash_dim, "using HashEmbedder");
        return Ok(Arc::new(HashEmbedder::new(settings.hash_dim)));
    }
    let dir = resolve_model_dir(settings)?;
    Ok(Arc::new(SentenceEmbedder::load(&dir, &settings.model, settings.max_len)?))
}

fn resolve_model_dir(settings: &EmbedSettings) -> Result<PathBuf> {
    let mut candidates: Vec<(&str, PathBuf)> = Vec::new();
    if let Some(dir) = &settings.model_dir { candidates.push(("embed.model_dir", expand_path(dir))); }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { candidates.push(("APP_MODEL_DIR", PathBuf::from(dir))); }
    if let Ok(dir) = std::env::var("MODEL_DIR") { candidates.push(("MODEL_DIR", PathBuf::from(dir))); }
    candidates.push(("default", Path::new("models").join(&settings.model)));
    candidates.push(("default", Path::new("../models").join(&settings.model)));
    for (origin, path) in candidates {
        if path.exists() {
            tracing::info!(origin, dir = %path.display(), "using model directory");
            return Ok(path);
        }
    }
    Err(anyhow!("Could not locate model directory for '{}'", settings.model))
}
