//! # Shibie Trainer
//!
//! Tensor-side workflows: BERT fine-tuning and evaluation for Chinese NER,
//! and a toy multi-class classifier on synthetic data.

pub mod batch;
pub mod classifier;
pub mod config;
pub mod logging;
pub mod model;
pub mod trainer;

pub use classifier::{train_classifier, ClassifierConfig};
pub use config::{ConfigArgs, TrainConfig};
pub use logging::init_logging;
pub use trainer::{run_evaluation, run_training, select_device, NerTrainer};
