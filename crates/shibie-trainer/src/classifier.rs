//! # Toy Classifier
//!
//! A two-layer perceptron trained on standard-normal vectors whose label is
//! the index of their largest coordinate.

use candle_core::{DType, Device, Result, Tensor, D};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use clap::Args;
use serde::Serialize;
use tracing::info;

/// Hyper-parameters for the synthetic task.
#[derive(Debug, Clone, Args, Serialize)]
pub struct ClassifierConfig {
    /// Input dimension, also the number of classes
    #[arg(long, default_value_t = 8)]
    pub dim: usize,

    #[arg(long, default_value_t = 64)]
    pub hidden: usize,

    #[arg(long, default_value_t = 2000)]
    pub train_size: usize,

    #[arg(long, default_value_t = 500)]
    pub test_size: usize,

    #[arg(short, long, default_value_t = 30)]
    pub epochs: usize,

    #[arg(short, long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Report held-out accuracy every this many epochs
    #[arg(long, default_value_t = 5)]
    pub eval_every: usize,

    /// Seed for the synthetic train and test sets
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Force CPU
    #[arg(long)]
    pub cpu: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            dim: 8,
            hidden: 64,
            train_size: 2000,
            test_size: 500,
            epochs: 30,
            batch_size: 64,
            learning_rate: 1e-3,
            eval_every: 5,
            seed: 42,
            cpu: false,
        }
    }
}

/// `n` vectors from N(0, 1) with their arg-max labels. The same seed
/// always yields the same data, on any device.
pub fn synthetic_dataset(n: usize, dim: usize, seed: u64, device: &Device) -> Result<(Tensor, Tensor)> {
    let mut rng = oorandom::Rand64::new(u128::from(seed));
    let values: Vec<f32> = (0..n * dim).map(|_| standard_normal(&mut rng)).collect();
    let x = Tensor::from_vec(values, (n, dim), device)?;
    let y = x.argmax(D::Minus1)?;
    Ok((x, y))
}

/// Box-Muller sample from N(0, 1).
fn standard_normal(rng: &mut oorandom::Rand64) -> f32 {
    let u1 = 1.0 - rng.rand_float();
    let u2 = rng.rand_float();
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

/// Linear -> ReLU -> Linear.
pub struct MlpClassifier {
    hidden: Linear,
    output: Linear,
}

impl MlpClassifier {
    pub fn new(vb: VarBuilder, dim: usize, hidden: usize, classes: usize) -> Result<Self> {
        Ok(Self {
            hidden: candle_nn::linear(dim, hidden, vb.pp("hidden"))?,
            output: candle_nn::linear(hidden, classes, vb.pp("output"))?,
        })
    }
}

impl Module for MlpClassifier {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.hidden.forward(xs)?.relu()?;
        self.output.forward(&xs)
    }
}

/// Fraction of rows whose arg-max logit equals the label.
pub fn accuracy(model: &impl Module, x: &Tensor, y: &Tensor) -> Result<f32> {
    let predictions = model.forward(x)?.argmax(D::Minus1)?;
    predictions
        .eq(y)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()
}

/// Train on fresh synthetic data and return the final held-out accuracy.
pub fn train_classifier(config: &ClassifierConfig, device: &Device) -> anyhow::Result<f32> {
    anyhow::ensure!(config.dim > 1, "dim must be at least 2");
    anyhow::ensure!(config.batch_size > 0, "batch_size must be positive");
    anyhow::ensure!(config.eval_every > 0, "eval_every must be positive");

    let (train_x, train_y) = synthetic_dataset(config.train_size, config.dim, config.seed, device)?;
    let (test_x, test_y) =
        synthetic_dataset(config.test_size, config.dim, config.seed.wrapping_add(1), device)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = MlpClassifier::new(vb, config.dim, config.hidden, config.dim)?;
    let mut optimizer = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: config.learning_rate,
            ..Default::default()
        },
    )?;

    let num_batches = config.train_size.div_ceil(config.batch_size);
    for epoch in 1..=config.epochs {
        let mut total_loss = 0f32;
        for b in 0..num_batches {
            let start = b * config.batch_size;
            let len = config.batch_size.min(config.train_size - start);
            let x = train_x.narrow(0, start, len)?;
            let y = train_y.narrow(0, start, len)?;

            let loss = candle_nn::loss::cross_entropy(&model.forward(&x)?, &y)?;
            optimizer.backward_step(&loss)?;
            total_loss += loss.to_scalar::<f32>()?;
        }

        if epoch % config.eval_every == 0 || epoch == config.epochs {
            let acc = accuracy(&model, &test_x, &test_y)?;
            info!(
                "Epoch {}/{}, Loss: {:.4}, Accuracy: {:.2}%",
                epoch,
                config.epochs,
                total_loss / num_batches.max(1) as f32,
                acc * 100.0
            );
        }
    }

    Ok(accuracy(&model, &test_x, &test_y)?)
}
