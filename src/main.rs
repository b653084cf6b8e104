//! Trend Radar — runner binary.
//! Loads the radar config, runs the pipeline once against the configured
//! sources, and prints the JSON report to stdout. The HTTP surface and
//! scheduling live outside this crate; this is a thin wrapper only.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_radar::config::RadarConfig;
use trend_radar::enrich::{HttpReasoning, ReasoningClient};
use trend_radar::pipeline::{run_pipeline, PipelineInput};
use trend_radar::store::MemoryStore;

/// Compact tracing output; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trend_radar=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RadarConfig::load_default().context("loading radar config")?;
    tracing::info!(
        sources = cfg.sources.len(),
        keyword = %cfg.keyword,
        remote = cfg.remote.is_some(),
        "starting pipeline run"
    );

    // The demo runner keeps scores in memory, seeded from the config. A real
    // deployment injects its persistent store here instead.
    let store = MemoryStore::seed(
        cfg.sources
            .iter()
            .map(|s| (s.id.clone(), s.reliability_score)),
    );

    let reasoning: Option<Box<dyn ReasoningClient>> = match cfg.remote.clone() {
        Some(remote) => Some(Box::new(
            HttpReasoning::new(remote).context("building reasoning client")?,
        )),
        None => None,
    };

    let report = run_pipeline(
        PipelineInput::Sources(cfg.sources.clone()),
        &cfg,
        Some(&store),
        None,
        reasoning.as_deref(),
    )
    .await
    .context("pipeline run")?;

    tracing::info!(
        scanned = report.meta.items_scanned,
        kept = report.meta.items_kept,
        ms = report.meta.execution_time_ms,
        "pipeline finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
