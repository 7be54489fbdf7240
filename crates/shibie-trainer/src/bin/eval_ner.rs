use std::path::PathBuf;

use clap::Parser;
use shibie_trainer::{init_logging, run_evaluation, ConfigArgs};

/// Score a saved snapshot on a labelled data file
#[derive(Parser)]
#[command(name = "eval-ner")]
#[command(version)]
struct Cli {
    /// Snapshot written by train-ner
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Data file to score; defaults to the configured dev_path
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Evaluation failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config.resolve()?;
    init_logging(config.log_file.as_deref())?;

    let data = match cli.data.or_else(|| config.dev_path.clone()) {
        Some(path) => path,
        None => anyhow::bail!("no data file: pass --data or set dev_path"),
    };

    let report = run_evaluation(config, &cli.snapshot, &data)?;
    if cli.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        println!("{report}");
    }
    Ok(())
}
