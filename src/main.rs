use anyhow::Context;
use parking_predictor::{PredictError, PredictionRequest, Predictor, PredictorConfig};
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

// ---------- Response shaping ----------

fn error_line(e: &PredictError) -> serde_json::Value {
    json!({ "success": false, "kind": e.kind(), "error": e.to_string() })
}

fn handle_line(predictor: &Predictor, line: &str) -> serde_json::Value {
    let request: PredictionRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return error_line(&PredictError::InvalidInput(format!("unparsable request: {}", e))),
    };
    match predictor.predict(&request) {
        Ok(record) => json!(record),
        Err(e) => {
            tracing::warn!("request failed ({}): {}", e.kind(), e);
            error_line(&e)
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cfg = PredictorConfig::from_env().context("failed to read predictor config")?;

    // Load failure degrades to "not available" instead of exiting.
    let predictor = Predictor::load(&cfg.model_dir);
    match predictor.failure_reason() {
        None => tracing::info!("ML predictor loaded from {}", cfg.model_dir.display()),
        Some(reason) => tracing::warn!("ML predictor not loaded, predictions disabled: {}", reason),
    }

    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read request line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(&predictor, line);
        writeln!(out, "{}", response).context("failed to write response")?;
        out.flush()?;
    }
    Ok(())
}
