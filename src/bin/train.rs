use anyhow::{bail, Context};
use parking_predictor::{training, PredictorConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATA: &str = "ml_models/training/parking_data.csv";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // train [events.csv] [model_dir]
    let mut args = std::env::args().skip(1);
    let data = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_DATA.to_string()));
    let mut cfg = PredictorConfig::from_env().context("failed to read predictor config")?;
    if let Some(dir) = args.next() {
        cfg.model_dir = PathBuf::from(dir);
    }
    if args.next().is_some() {
        bail!("usage: train [events.csv] [model_dir]");
    }

    let report = training::run(&data, &cfg)
        .with_context(|| format!("training from {} failed", data.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
