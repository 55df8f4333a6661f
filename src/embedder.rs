//! Sentence embedding backend for the semantic matcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ort::Environment;
use rust_bert::pipelines::hf_tokenizers::HFTokenizer;
use rust_bert::pipelines::onnx::{config::ONNXEnvironmentConfig, ONNXEncoder};
use tch::{Kind, Tensor};

/// Text-to-vector backend the semantic matcher runs on. Inference runs
/// inline on the calling task; there is no timeout or cancellation.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedder backed by a local ONNX export of a sentence-transformer
/// model. Expects `model.onnx`, `tokenizer.json` and
/// `special_tokens_map.json` in the model directory.
pub struct OnnxEmbedder {
    encoder: ONNXEncoder,
    tokenizer: HFTokenizer,
}

impl OnnxEmbedder {
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = PathBuf::from(model_dir.as_ref());
        let environment = Arc::new(Environment::builder().with_name("answer-engine").build()?);
        let onnx_config = ONNXEnvironmentConfig::default();
        let encoder = ONNXEncoder::new(dir.join("model.onnx"), &environment, &onnx_config)
            .map_err(|e| anyhow::anyhow!("model loading failed: {}", e))?;
        let tokenizer = HFTokenizer::from_file(
            dir.join("tokenizer.json"),
            dir.join("special_tokens_map.json"),
        )
        .map_err(|e| anyhow::anyhow!(e))?;

        Ok(Self { encoder, tokenizer })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode_list(&[text])
            .map_err(|e| anyhow::anyhow!("tokenization failed: {}", e))?;

        let token_ids = encoding
            .first()
            .map(|enc| enc.token_ids.clone())
            .ok_or_else(|| anyhow::anyhow!("empty tokenizer output"))?;
        let seq_len = i64::try_from(token_ids.len())
            .map_err(|_| anyhow::anyhow!("token sequence exceeds i64 limits"))?;

        let input_tensor = Tensor::from_slice(&token_ids)
            .view([1, seq_len])
            .to_kind(Kind::Int64);
        let attention_mask = Tensor::from_slice(&vec![1_i64; token_ids.len()])
            .view([1, seq_len])
            .to_kind(Kind::Int64);

        let output =
            self.encoder
                .forward(Some(&input_tensor), Some(&attention_mask), None, None, None)?;
        let hidden = output
            .last_hidden_state
            .ok_or_else(|| anyhow::anyhow!("empty last_hidden_state"))?;

        // CLS vector, L2-normalized so cosine reduces to a dot product.
        let cls = hidden.select(1, 0);
        let normalized = &cls / cls.norm_scalaropt_dim(2, [1], true);

        tensor_to_vec(&normalized)
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text)
    }
}

fn tensor_to_vec(tensor: &Tensor) -> Result<Vec<f32>> {
    Vec::<f32>::try_from(tensor.squeeze()).map_err(|_| anyhow::anyhow!("Tensor conversion failed"))
}
