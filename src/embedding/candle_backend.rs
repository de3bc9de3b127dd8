//! Sentence embeddings with candle.
//!
//! A model is either a HuggingFace repository id, fetched with hf-hub, or a
//! local directory holding the same three files (useful on machines without
//! network access). [`BertEmbedder`] pools token states into one
//! L2-normalized vector per feedback text.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{LayerNorm, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// The three files a BERT checkpoint needs.
pub struct ModelFiles {
    pub config_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub weights_path: PathBuf,
}

impl ModelFiles {
    /// Files inside a local model directory, if all of them are present.
    pub fn in_dir(dir: &Path) -> Option<Self> {
        let files = Self {
            config_path: dir.join(CONFIG_FILE),
            tokenizer_path: dir.join(TOKENIZER_FILE),
            weights_path: dir.join(WEIGHTS_FILE),
        };
        [&files.config_path, &files.tokenizer_path, &files.weights_path]
            .iter()
            .all(|p| p.is_file())
            .then_some(files)
    }

    /// Resolve `model` to files on disk.
    ///
    /// An existing directory is used as is; anything else is a repository id
    /// downloaded into the hf-hub cache (`cache_dir` when given). Blocking.
    pub fn locate(model: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let dir = Path::new(model);
        if dir.is_dir() {
            return Self::in_dir(dir).with_context(|| {
                format!(
                    "{} must contain {}, {} and {}",
                    dir.display(),
                    CONFIG_FILE,
                    TOKENIZER_FILE,
                    WEIGHTS_FILE
                )
            });
        }

        let mut builder = hf_hub::api::sync::ApiBuilder::new();
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir.to_path_buf());
        }
        let repo = builder
            .build()
            .context("Failed to initialize HuggingFace Hub API")?
            .model(model.to_string());
        let fetch = |name: &str| {
            repo.get(name)
                .with_context(|| format!("Failed to download {} from {}", name, model))
        };

        Ok(Self {
            config_path: fetch(CONFIG_FILE)?,
            tokenizer_path: fetch(TOKENIZER_FILE)?,
            weights_path: fetch(WEIGHTS_FILE)?,
        })
    }
}

/// How token states collapse into one sentence vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// Hidden state of the leading `[CLS]` token (BGE family).
    Cls,
    /// Attention-masked mean over all tokens (MiniLM, GTE, E5).
    Mean,
}

impl Pooling {
    /// Pooling the checkpoint was trained with, judged by its name.
    pub fn for_model(model: &str) -> Self {
        if model.to_ascii_lowercase().contains("bge") {
            Pooling::Cls
        } else {
            Pooling::Mean
        }
    }

    /// `[batch, seq, hidden]` states and `[batch, seq]` mask to `[batch, hidden]`.
    fn apply(self, states: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Pooling::Cls => states.narrow(1, 0, 1)?.squeeze(1),
            Pooling::Mean => {
                let mask = mask.to_dtype(states.dtype())?.unsqueeze(2)?;
                let summed = states.broadcast_mul(&mask)?.sum(1)?;
                summed.broadcast_div(&mask.sum(1)?)
            }
        }
    }
}

fn l2_normalize(rows: &Tensor) -> candle_core::Result<Tensor> {
    rows.broadcast_div(&rows.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?)
}

/// GPU when one is usable, else CPU.
///
/// A device only counts as usable if it runs layer norm, which BERT needs.
pub fn select_device() -> Device {
    let candidates: Vec<(&str, candle_core::Result<Device>)> = vec![
        #[cfg(target_os = "macos")]
        ("Metal", Device::new_metal(0)),
        #[cfg(feature = "cuda")]
        ("CUDA", Device::new_cuda(0)),
    ];

    for (name, device) in candidates {
        match device {
            Ok(device) if supports_layer_norm(&device) => {
                tracing::info!("Using {} GPU for inference", name);
                return device;
            }
            Ok(_) => tracing::warn!("{} GPU lacks layer-norm support, skipping", name),
            Err(e) => tracing::debug!("{} GPU unavailable: {}", name, e),
        }
    }
    tracing::info!("Using CPU for inference");
    Device::Cpu
}

fn supports_layer_norm(device: &Device) -> bool {
    let run = || -> candle_core::Result<()> {
        let ln = LayerNorm::new(
            Tensor::ones(4, DType::F32, device)?,
            Tensor::zeros(4, DType::F32, device)?,
            1e-5,
        );
        ln.forward(&Tensor::ones((1, 4), DType::F32, device)?)?;
        Ok(())
    };
    run().is_ok()
}

/// A loaded BERT checkpoint and its tokenizer.
///
/// Feedback blobs can run long; inputs are truncated to the model's position
/// limit rather than rejected.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pooling: Pooling,
    hidden_size: usize,
}

impl BertEmbedder {
    pub fn new(files: &ModelFiles, device: Device, pooling: Pooling) -> Result<Self> {
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&files.config_path).context("Failed to read model config")?,
        )
        .context("Failed to parse BERT config")?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_padding(Some(PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..Default::default()
            }))
            .with_truncation(Some(TruncationParams {
                max_length: config.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        // SAFETY: the safetensors file is memory-mapped and must not change
        // while the model is loaded.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };
        let model = BertModel::load(vb, &config).context("Failed to construct BERT model")?;

        Ok(Self {
            model,
            tokenizer,
            device,
            pooling,
            hidden_size: config.hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// One unit vector per text, row `i` for `texts[i]`.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.iter().map(String::as_str).collect::<Vec<_>>(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let input_ids = self.stack(&encodings, Encoding::get_ids)?;
        let type_ids = self.stack(&encodings, Encoding::get_type_ids)?;
        let mask = self.stack(&encodings, Encoding::get_attention_mask)?;

        let states = self.model.forward(&input_ids, &type_ids, Some(&mask))?;
        let pooled = self.pooling.apply(&states, &mask)?;

        let rows = l2_normalize(&pooled)?
            .to_vec2::<f32>()
            .context("Failed to read embeddings back from the device")?;
        if rows.len() != texts.len() {
            bail!("Model produced {} rows for {} texts", rows.len(), texts.len());
        }
        Ok(rows)
    }

    /// Pack one per-token field of every encoding into a `[batch, seq]` tensor.
    fn stack(&self, encodings: &[Encoding], field: fn(&Encoding) -> &[u32]) -> Result<Tensor> {
        let seq_len = encodings.first().map_or(0, |e| field(e).len());
        let flat: Vec<u32> = encodings.iter().flat_map(|e| field(e).iter().copied()).collect();
        Ok(Tensor::from_vec(flat, (encodings.len(), seq_len), &self.device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor3(data: &[f32], shape: (usize, usize, usize)) -> Tensor {
        Tensor::from_vec(data.to_vec(), shape, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_pooling_for_model() {
        assert_eq!(Pooling::for_model("BAAI/bge-small-en-v1.5"), Pooling::Cls);
        assert_eq!(
            Pooling::for_model("sentence-transformers/all-MiniLM-L6-v2"),
            Pooling::Mean
        );
    }

    #[test]
    fn test_mean_pooling_ignores_padding() {
        // one text, three tokens, the last is padding
        let states = tensor3(&[1.0, 0.0, 3.0, 2.0, 100.0, 100.0], (1, 3, 2));
        let mask = Tensor::from_vec(vec![1u32, 1, 0], (1, 3), &Device::Cpu).unwrap();

        let pooled = Pooling::Mean.apply(&states, &mask).unwrap();
        assert_eq!(pooled.to_vec2::<f32>().unwrap(), vec![vec![2.0, 1.0]]);
    }

    #[test]
    fn test_cls_pooling_takes_first_token() {
        let states = tensor3(&[1.0, 2.0, 9.0, 9.0, 3.0, 4.0, 9.0, 9.0], (2, 2, 2));
        let mask = Tensor::ones((2, 2), DType::U32, &Device::Cpu).unwrap();

        let pooled = Pooling::Cls.apply(&states, &mask).unwrap();
        assert_eq!(
            pooled.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]]
        );
    }

    #[test]
    fn test_l2_normalize_rows() {
        let rows = Tensor::from_vec(vec![3.0f32, 4.0, 0.0, 2.0], (2, 2), &Device::Cpu).unwrap();
        let normalized = l2_normalize(&rows).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(normalized, vec![vec![0.6, 0.8], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_local_dir_requires_all_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), "{}").unwrap();
        assert!(ModelFiles::in_dir(dir.path()).is_none());

        let model = dir.path().to_string_lossy().into_owned();
        assert!(ModelFiles::locate(&model, None).is_err());

        std::fs::write(dir.path().join(WEIGHTS_FILE), "").unwrap();
        assert!(ModelFiles::in_dir(dir.path()).is_some());
    }
}
