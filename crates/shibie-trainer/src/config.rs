//! Training configuration.
//!
//! A flat option set, loadable from JSON and overridable from the
//! command line or environment.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use clap::Args;
use serde::{Deserialize, Serialize};

/// Options for NER fine-tuning and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Directory holding `config.json`, `tokenizer.json` (or `vocab.txt`)
    /// and `model.safetensors`.
    pub model_dir: PathBuf,
    pub train_path: PathBuf,
    pub dev_path: Option<PathBuf>,
    pub max_len: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub output_dir: PathBuf,
    /// Snapshot to resume from instead of the pretrained weights.
    pub init_checkpoint: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    /// Log the running loss every this many steps.
    pub log_every: usize,
    pub seed: u64,
    /// Stay on CPU even when an accelerator is available.
    pub cpu: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/bert-base-chinese"),
            train_path: PathBuf::from("data/train.tsv"),
            dev_path: None,
            max_len: 128,
            batch_size: 16,
            learning_rate: 2e-5,
            epochs: 3,
            output_dir: PathBuf::from("output"),
            init_checkpoint: None,
            log_file: None,
            log_every: 50,
            seed: 42,
            cpu: false,
        }
    }
}

impl TrainConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.max_len >= 3, "max_len must be at least 3, got {}", self.max_len);
        ensure!(self.learning_rate > 0.0, "learning_rate must be positive");
        ensure!(self.log_every > 0, "log_every must be positive");
        Ok(())
    }

    pub fn bert_config_path(&self) -> PathBuf {
        self.model_dir.join("config.json")
    }

    pub fn weights_path(&self) -> PathBuf {
        self.model_dir.join("model.safetensors")
    }

    /// `{output_dir}/model_epoch_{epoch}.bin`
    pub fn snapshot_path(&self, epoch: usize) -> PathBuf {
        self.output_dir.join(format!("model_epoch_{epoch}.bin"))
    }
}

/// Command-line view of [`TrainConfig`].
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// JSON config file, applied before the flags below
    #[arg(short, long, env = "SHIBIE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pretrained model directory
    #[arg(short, long, env = "SHIBIE_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Training data file
    #[arg(long, env = "SHIBIE_TRAIN_PATH")]
    pub train_path: Option<PathBuf>,

    /// Validation data file
    #[arg(long, env = "SHIBIE_DEV_PATH")]
    pub dev_path: Option<PathBuf>,

    /// Maximum sequence length, boundary markers included
    #[arg(long)]
    pub max_len: Option<usize>,

    #[arg(short, long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Snapshot directory
    #[arg(short, long, env = "SHIBIE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Snapshot to resume from
    #[arg(long)]
    pub init_checkpoint: Option<PathBuf>,

    /// Append log lines to this file as well as stdout
    #[arg(long, env = "SHIBIE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long)]
    pub log_every: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Force CPU
    #[arg(long)]
    pub cpu: bool,
}

impl ConfigArgs {
    /// Merge file, defaults and flags into a validated config.
    pub fn resolve(self) -> anyhow::Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };

        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if let Some(v) = self.train_path {
            config.train_path = v;
        }
        if let Some(v) = self.dev_path {
            config.dev_path = Some(v);
        }
        if let Some(v) = self.max_len {
            config.max_len = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = v;
        }
        if let Some(v) = self.init_checkpoint {
            config.init_checkpoint = Some(v);
        }
        if let Some(v) = self.log_file {
            config.log_file = Some(v);
        }
        if let Some(v) = self.log_every {
            config.log_every = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        config.cpu |= self.cpu;

        config.validate()?;
        Ok(config)
    }
}
