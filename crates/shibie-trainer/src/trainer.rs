//! Fine-tuning and evaluation loops for the BERT tagger.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use candle_core::{DType, Device, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use shibie_core::{decode, load_examples, EncodedExample, EvalReport, EvalStats, SentenceEncoder};
use tracing::{info, warn};

use crate::batch::Batch;
use crate::config::TrainConfig;
use crate::model::{load_bert_config, load_pretrained, masked_cross_entropy, BertTagger};

/// Pick CUDA when available unless `cpu` is set.
pub fn select_device(cpu: bool) -> anyhow::Result<Device> {
    if cpu {
        return Ok(Device::Cpu);
    }
    Ok(Device::cuda_if_available(0)?)
}

/// Owns the model, its variables and the optimizer for one run.
pub struct NerTrainer {
    config: TrainConfig,
    device: Device,
    encoder: SentenceEncoder,
    varmap: VarMap,
    model: BertTagger,
    optimizer: AdamW,
}

impl NerTrainer {
    /// Build the model and load either `init_checkpoint` or the pretrained
    /// weights. Any load failure is fatal.
    pub fn new(config: TrainConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let device = select_device(config.cpu)?;
        let encoder = SentenceEncoder::from_model_dir(&config.model_dir, config.max_len)
            .with_context(|| format!("failed to load tokenizer from {}", config.model_dir.display()))?;
        let bert_config = load_bert_config(config.bert_config_path())?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BertTagger::load(vb, &bert_config)?;

        match &config.init_checkpoint {
            Some(path) => {
                varmap
                    .load(path)
                    .with_context(|| format!("failed to load snapshot {}", path.display()))?;
                info!(path = %path.display(), "resumed from snapshot");
            }
            None => load_pretrained(&varmap, config.weights_path(), &device)?,
        }

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;

        info!(
            device = ?device,
            vocab = encoder.vocab_size(),
            max_len = encoder.max_len(),
            "model ready"
        );

        Ok(Self {
            config,
            device,
            encoder,
            varmap,
            model,
            optimizer,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Load and encode a dataset file.
    pub fn load_dataset<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<Vec<EncodedExample>> {
        let path = path.as_ref();
        let examples = load_examples(path)
            .with_context(|| format!("failed to load dataset {}", path.display()))?;
        Ok(self.encoder.encode_all(&examples))
    }

    /// One pass over `examples` in a seeded shuffled order. Returns the mean
    /// batch loss.
    pub fn train_epoch(&mut self, examples: &[EncodedExample], epoch: usize) -> anyhow::Result<f32> {
        let order = shuffled_indices(examples.len(), self.config.seed.wrapping_add(epoch as u64));
        let num_batches = order.len().div_ceil(self.config.batch_size);

        let mut total_loss = 0f32;
        let mut window_loss = 0f32;

        for (step, chunk) in order.chunks(self.config.batch_size).enumerate() {
            let rows: Vec<&EncodedExample> = chunk.iter().map(|&i| &examples[i]).collect();
            let batch = Batch::from_examples(&rows, &self.device)?;

            let logits = self.model.forward(
                &batch.input_ids,
                &batch.token_type_ids,
                &batch.attention_mask,
                true,
            )?;
            let loss = masked_cross_entropy(&logits, &batch.labels, &batch.active)?;
            self.optimizer.backward_step(&loss)?;

            let loss = loss.to_scalar::<f32>()?;
            total_loss += loss;
            window_loss += loss;

            if (step + 1) % self.config.log_every == 0 {
                info!(
                    "Epoch {}/{}, Step {}/{}, Loss: {:.4}",
                    epoch,
                    self.config.epochs,
                    step + 1,
                    num_batches,
                    window_loss / self.config.log_every as f32
                );
                window_loss = 0.0;
            }
        }

        Ok(if num_batches > 0 {
            total_loss / num_batches as f32
        } else {
            0.0
        })
    }

    /// Decode predictions and references for `examples` and score them.
    pub fn evaluate(&self, examples: &[EncodedExample]) -> anyhow::Result<EvalStats> {
        let mut stats = EvalStats::new();

        for chunk in examples.chunks(self.config.batch_size) {
            let rows: Vec<&EncodedExample> = chunk.iter().collect();
            let batch = Batch::from_examples(&rows, &self.device)?;

            let logits = self.model.forward(
                &batch.input_ids,
                &batch.token_type_ids,
                &batch.attention_mask,
                false,
            )?;
            let predictions = logits.argmax(D::Minus1)?.to_vec2::<u32>()?;

            for (example, row) in chunk.iter().zip(predictions) {
                let predicted: Vec<usize> = row[1..=example.tokens.len()]
                    .iter()
                    .map(|&id| id as usize)
                    .collect();
                let reference = example.unit_labels();

                stats.update(
                    &decode(&example.tokens, &predicted),
                    &decode(&example.tokens, &reference),
                );
            }
        }

        Ok(stats)
    }

    /// Write the full parameter state to `{output_dir}/model_epoch_{epoch}.bin`.
    pub fn save_snapshot(&self, epoch: usize) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("failed to create output dir {}", self.config.output_dir.display())
        })?;
        let path = self.config.snapshot_path(epoch);
        self.varmap
            .save(&path)
            .with_context(|| format!("failed to save snapshot {}", path.display()))?;
        info!(path = %path.display(), "snapshot saved");
        Ok(path)
    }
}

/// Seeded Fisher-Yates permutation of `0..len`.
fn shuffled_indices(len: usize, seed: u64) -> Vec<usize> {
    let mut rng = oorandom::Rand64::new(u128::from(seed));
    let mut indices: Vec<usize> = (0..len).collect();
    for i in (1..len).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        indices.swap(i, j);
    }
    indices
}

/// Fine-tune for `config.epochs` epochs, scoring the dev set and saving a
/// snapshot after each one.
pub fn run_training(config: TrainConfig) -> anyhow::Result<Option<EvalReport>> {
    let mut trainer = NerTrainer::new(config)?;

    let train = trainer.load_dataset(&trainer.config().train_path)?;
    if train.is_empty() {
        bail!("training data {} has no usable lines", trainer.config().train_path.display());
    }
    let dev = match &trainer.config().dev_path {
        Some(path) => Some(trainer.load_dataset(path)?),
        None => None,
    };
    info!(
        "Loaded {} training examples, {} validation examples",
        train.len(),
        dev.as_ref().map_or(0, Vec::len)
    );

    let epochs = trainer.config().epochs;
    let mut last_report = None;

    for epoch in 1..=epochs {
        let loss = trainer.train_epoch(&train, epoch)?;
        info!("Epoch {}/{} complete - Loss: {:.4}", epoch, epochs, loss);

        if let Some(dev) = &dev {
            let report = trainer.evaluate(dev)?.report();
            info!(
                "Epoch {}/{} - macro F1: {:.4}, micro F1: {:.4}\n{}",
                epoch, epochs, report.macro_f1, report.micro_f1, report
            );
            last_report = Some(report);
        }

        trainer.save_snapshot(epoch)?;
    }

    if last_report.is_none() {
        warn!("no dev_path configured, skipped evaluation");
    }
    Ok(last_report)
}

/// Score `data_path` with the weights in `snapshot`.
pub fn run_evaluation(
    mut config: TrainConfig,
    snapshot: &Path,
    data_path: &Path,
) -> anyhow::Result<EvalReport> {
    config.init_checkpoint = Some(snapshot.to_path_buf());
    let trainer = NerTrainer::new(config)?;

    let examples = trainer.load_dataset(data_path)?;
    info!("Evaluating {} examples from {}", examples.len(), data_path.display());

    Ok(trainer.evaluate(&examples)?.report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TINY_BERT_CONFIG;
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use shibie_core::EntityKind;

    const TRAIN_TSV: &str = "张三在北京\tB-PER I-PER O B-LOC I-LOC\n李四去上海\tB-PER I-PER O B-LOC I-LOC\n";

    /// A model directory with a tiny BERT whose checkpoint has encoder
    /// weights only, stored without the `bert.` prefix.
    fn tiny_model_dir(root: &Path) -> PathBuf {
        let dir = root.join("model");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), TINY_BERT_CONFIG).unwrap();

        let vocab = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "张", "三", "在", "北", "京", "李", "四", "去", "上", "海"];
        std::fs::write(dir.join("vocab.txt"), vocab.join("\n")).unwrap();

        let bert_config: BertConfig = serde_json::from_str(TINY_BERT_CONFIG).unwrap();
        let varmap = VarMap::new();
        BertModel::load(VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu), &bert_config).unwrap();
        varmap.save(dir.join("model.safetensors")).unwrap();
        dir
    }

    fn tiny_config(root: &Path) -> TrainConfig {
        let train_path = root.join("train.tsv");
        std::fs::write(&train_path, TRAIN_TSV).unwrap();
        TrainConfig {
            model_dir: tiny_model_dir(root),
            dev_path: Some(train_path.clone()),
            train_path,
            max_len: 12,
            batch_size: 2,
            learning_rate: 1e-3,
            epochs: 2,
            output_dir: root.join("output"),
            log_every: 1,
            seed: 5,
            cpu: true,
            ..Default::default()
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shibie-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_run_training_saves_every_epoch() {
        let root = scratch_dir("train");
        let config = tiny_config(&root);

        let report = run_training(config.clone()).unwrap();
        assert!(report.is_some());
        assert!(config.snapshot_path(1).exists());
        assert!(config.snapshot_path(2).exists());

        let report = run_evaluation(config.clone(), &config.snapshot_path(2), &config.train_path).unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let reference = |kind: EntityKind| {
            report
                .kinds
                .iter()
                .find(|k| k.kind == kind)
                .map(|k| k.counts.reference)
                .unwrap()
        };
        assert_eq!(reference(EntityKind::Person), 2);
        assert_eq!(reference(EntityKind::Location), 2);
        assert_eq!(reference(EntityKind::Organization), 0);
        assert_eq!(reference(EntityKind::Time), 0);
    }

    #[test]
    fn test_train_epoch_and_evaluate() {
        let root = scratch_dir("epoch");
        let config = tiny_config(&root);
        let mut trainer = NerTrainer::new(config.clone()).unwrap();
        let examples = trainer.load_dataset(&config.train_path).unwrap();
        assert_eq!(examples.len(), 2);

        let loss = trainer.train_epoch(&examples, 1).unwrap();
        assert!(loss.is_finite() && loss > 0.0, "loss {loss}");

        let stats = trainer.evaluate(&examples).unwrap();
        assert_eq!(stats.counts(EntityKind::Person).reference, 2);
        assert_eq!(stats.counts(EntityKind::Location).reference, 2);

        let path = trainer.save_snapshot(1).unwrap();
        assert_eq!(path, config.snapshot_path(1));
        assert!(path.exists());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = TrainConfig {
            batch_size: 0,
            ..Default::default()
        };
        let err = NerTrainer::new(config).err().unwrap();
        assert!(err.to_string().contains("batch_size"), "{err}");

        let config = TrainConfig {
            log_every: 0,
            ..Default::default()
        };
        let err = run_training(config).unwrap_err();
        assert!(err.to_string().contains("log_every"), "{err}");
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut order = shuffled_indices(50, 7);
        assert_ne!(order, (0..50).collect::<Vec<_>>());
        order.sort_unstable();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_is_seeded() {
        assert_eq!(shuffled_indices(20, 3), shuffled_indices(20, 3));
        assert_ne!(shuffled_indices(20, 3), shuffled_indices(20, 4));
    }

    #[test]
    fn test_shuffle_small() {
        assert!(shuffled_indices(0, 1).is_empty());
        assert_eq!(shuffled_indices(1, 1), vec![0]);
    }

    #[test]
    fn test_cpu_device() {
        assert!(matches!(select_device(true).unwrap(), Device::Cpu));
    }
}
