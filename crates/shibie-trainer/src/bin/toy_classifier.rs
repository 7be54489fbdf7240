use clap::Parser;
use shibie_trainer::{init_logging, select_device, train_classifier, ClassifierConfig};

/// Train a small MLP to find the largest coordinate of random vectors
#[derive(Parser)]
#[command(name = "toy-classifier")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ClassifierConfig,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Cli::parse().config;
    init_logging(None)?;
    tracing::info!("config: {}", serde_json::to_string(&config)?);

    let device = select_device(config.cpu)?;
    let accuracy = train_classifier(&config, &device)?;
    tracing::info!("Final accuracy: {:.2}%", accuracy * 100.0);
    Ok(())
}
