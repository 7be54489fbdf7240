//! BERT token-classification model for IOB tagging.

use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{Device, Result, Tensor};
use candle_nn::{Dropout, Linear, Module, VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use shibie_core::Tag;
use tracing::{debug, info};

/// Dropout applied to encoder outputs when the config does not set one.
const DEFAULT_CLASSIFIER_DROPOUT: f64 = 0.1;

/// A BERT encoder followed by a per-token linear classifier.
pub struct BertTagger {
    pub bert: BertModel,
    pub dropout: Dropout,
    pub classifier: Linear,
}

impl BertTagger {
    /// Build the model under the `bert.` and `classifier.` prefixes.
    pub fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let bert = BertModel::load(vb.pp("bert"), config)?;
        let dropout = Dropout::new(
            config
                .classifier_dropout
                .unwrap_or(DEFAULT_CLASSIFIER_DROPOUT) as f32,
        );
        let classifier = candle_nn::linear(config.hidden_size, Tag::NUM_TAGS, vb.pp("classifier"))?;

        Ok(Self {
            bert,
            dropout,
            classifier,
        })
    }

    /// Forward pass producing per-token tag logits.
    /// `input_ids`, `token_type_ids`, `attention_mask`: [batch_size, seq_len]
    /// Returns [batch_size, seq_len, NUM_TAGS].
    pub fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let hidden_states = self
            .bert
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        let hidden_states = self.dropout.forward(&hidden_states, train)?;
        self.classifier.forward(&hidden_states)
    }
}

/// Cross-entropy over the attended positions only.
///
/// `logits`: [batch, seq, tags], `labels`: [batch, seq], `active`: flat
/// indices into `batch * seq` of the positions whose mask is 1.
pub fn masked_cross_entropy(logits: &Tensor, labels: &Tensor, active: &Tensor) -> Result<Tensor> {
    let (batch, seq, num_tags) = logits.dims3()?;
    let logits = logits
        .reshape((batch * seq, num_tags))?
        .index_select(active, 0)?;
    let labels = labels.flatten_all()?.index_select(active, 0)?;
    candle_nn::loss::cross_entropy(&logits, &labels)
}

/// Read a BERT `config.json`.
pub fn load_bert_config<P: AsRef<Path>>(path: P) -> anyhow::Result<BertConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read BERT config {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse BERT config {}", path.display()))
}

/// Candidate checkpoint names for a variable, covering the legacy
/// `gamma`/`beta` layer-norm names and checkpoints saved without the
/// `bert.` prefix.
fn checkpoint_names(name: &str) -> Vec<String> {
    let mut bases = vec![name.to_string()];
    if let Some(stripped) = name.strip_prefix("bert.") {
        bases.push(stripped.to_string());
    }

    let mut names = bases.clone();
    for base in &bases {
        if base.contains("LayerNorm") {
            if let Some(stem) = base.strip_suffix(".weight") {
                names.push(format!("{stem}.gamma"));
            } else if let Some(stem) = base.strip_suffix(".bias") {
                names.push(format!("{stem}.beta"));
            }
        }
    }
    names
}

/// Copy pretrained encoder weights from a safetensors file into `varmap`.
///
/// Every encoder variable must be present in the checkpoint. The
/// classification head keeps its fresh initialisation when absent.
pub fn load_pretrained<P: AsRef<Path>>(
    varmap: &VarMap,
    path: P,
    device: &Device,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let tensors = candle_core::safetensors::load(path, device)
        .with_context(|| format!("failed to read pretrained weights {}", path.display()))?;

    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow::anyhow!("variable map lock poisoned"))?;

    let mut loaded = 0usize;
    for (name, var) in data.iter() {
        let found = checkpoint_names(name)
            .into_iter()
            .find_map(|candidate| tensors.get(&candidate));

        match found {
            Some(tensor) => {
                let tensor = tensor.to_dtype(var.dtype())?;
                if tensor.shape() != var.shape() {
                    bail!(
                        "shape mismatch for {name}: checkpoint {:?}, model {:?}",
                        tensor.shape(),
                        var.shape()
                    );
                }
                var.set(&tensor)?;
                loaded += 1;
            }
            None if name.starts_with("classifier.") => {
                debug!(name = %name, "classifier weight not in checkpoint, keeping init");
            }
            None => bail!("pretrained checkpoint {} has no weight for {name}", path.display()),
        }
    }

    info!(path = %path.display(), loaded, "loaded pretrained weights");
    Ok(())
}

/// A two-layer, 16-dim BERT `config.json` for tests.
#[cfg(test)]
pub(crate) const TINY_BERT_CONFIG: &str = r#"{
    "vocab_size": 32,
    "hidden_size": 16,
    "num_hidden_layers": 2,
    "num_attention_heads": 2,
    "intermediate_size": 32,
    "hidden_act": "gelu",
    "hidden_dropout_prob": 0.1,
    "max_position_embeddings": 16,
    "type_vocab_size": 2,
    "initializer_range": 0.02,
    "layer_norm_eps": 1e-12,
    "pad_token_id": 0,
    "position_embedding_type": "absolute",
    "use_cache": false,
    "classifier_dropout": null,
    "model_type": "bert"
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn tiny_config() -> BertConfig {
        serde_json::from_str(TINY_BERT_CONFIG).unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BertTagger::load(vb, &tiny_config()).unwrap();

        let input_ids = Tensor::new(&[[2u32, 5, 6, 3, 0, 0], [2, 7, 3, 0, 0, 0]], &device).unwrap();
        let token_type_ids = input_ids.zeros_like().unwrap();
        let mask = Tensor::new(&[[1u32, 1, 1, 1, 0, 0], [1, 1, 1, 0, 0, 0]], &device).unwrap();

        let logits = model
            .forward(&input_ids, &token_type_ids, &mask, false)
            .unwrap();
        assert_eq!(logits.dims(), &[2, 6, Tag::NUM_TAGS]);
    }

    #[test]
    fn test_masked_cross_entropy_ignores_padding() {
        let device = Device::Cpu;
        // One sequence of two positions over 9 tags. Position 0 strongly
        // predicts its label; position 1 is padding with a wrong label.
        let mut values = vec![0f32; 2 * Tag::NUM_TAGS];
        values[3] = 20.0;
        values[Tag::NUM_TAGS] = 20.0;
        let logits = Tensor::from_vec(values, (1, 2, Tag::NUM_TAGS), &device).unwrap();
        let labels = Tensor::new(&[[3u32, 5]], &device).unwrap();
        let active = Tensor::new(&[0u32], &device).unwrap();

        let masked = masked_cross_entropy(&logits, &labels, &active)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(masked < 1e-3);

        let all = Tensor::new(&[0u32, 1], &device).unwrap();
        let unmasked = masked_cross_entropy(&logits, &labels, &all)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(unmasked > 1.0);
    }

    #[test]
    fn test_checkpoint_names() {
        let names = checkpoint_names("bert.embeddings.LayerNorm.weight");
        assert!(names.contains(&"bert.embeddings.LayerNorm.weight".to_string()));
        assert!(names.contains(&"embeddings.LayerNorm.weight".to_string()));
        assert!(names.contains(&"bert.embeddings.LayerNorm.gamma".to_string()));
        assert!(names.contains(&"embeddings.LayerNorm.gamma".to_string()));

        let names = checkpoint_names("classifier.bias");
        assert_eq!(names, vec!["classifier.bias".to_string()]);
    }

    #[test]
    fn test_load_pretrained_roundtrip() {
        let device = Device::Cpu;
        let source = VarMap::new();
        BertTagger::load(
            VarBuilder::from_varmap(&source, DType::F32, &device),
            &tiny_config(),
        )
        .unwrap();

        let path = std::env::temp_dir().join(format!("shibie-pretrained-{}.safetensors", std::process::id()));
        source.save(&path).unwrap();

        let target = VarMap::new();
        BertTagger::load(
            VarBuilder::from_varmap(&target, DType::F32, &device),
            &tiny_config(),
        )
        .unwrap();
        load_pretrained(&target, &path, &device).unwrap();
        std::fs::remove_file(&path).unwrap();

        let name = "bert.embeddings.word_embeddings.weight";
        let a = source.data().lock().unwrap()[name].as_tensor().clone();
        let b = target.data().lock().unwrap()[name].as_tensor().clone();
        let diff = (a - b).unwrap().abs().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap();
        assert_eq!(diff, 0.0);
    }
}
