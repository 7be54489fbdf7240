use clap::Parser;
use shibie_trainer::{init_logging, run_training, ConfigArgs};

/// Fine-tune a BERT tagger on IOB-labelled Chinese sentences
#[derive(Parser)]
#[command(name = "train-ner")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Cli::parse().config.resolve()?;
    init_logging(config.log_file.as_deref())?;
    tracing::info!("config: {}", serde_json::to_string(&config)?);

    run_training(config)?;
    Ok(())
}
