//! Pipeline orchestration: fetch → filter → enrich → report.
//!
//! The orchestrator's contract is that a run always produces a complete
//! report. Per-source fetch failures, store failures, and every enrichment
//! failure are absorbed by the stages themselves; anything unexpected at this
//! level degrades the report rather than aborting it. The single exception is
//! a configuration error from URL resolution, which surfaces to the caller.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::config::RadarConfig;
use crate::enrich::{self, local, Enrichment, ReasoningClient};
use crate::fetch::{self, FetchError, FetchRun, ReqwestTransport, Transport};
use crate::filter;
use crate::store::{self, ReliabilityStore};
use crate::types::{
    PipelineReport, RawItem, ReasoningPath, ReportMeta, Source, StageLog,
};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline invocations.");
        describe_counter!(
            "pipeline_local_fallback_total",
            "Runs that used the local enrichment path."
        );
        describe_histogram!("pipeline_duration_ms", "Wall time of a full pipeline run.");
    });
}

/// Either live sources to fetch or pre-fetched raw items (e.g. from a
/// scheduled job that already ran the fetch stage).
#[derive(Debug)]
pub enum PipelineInput {
    Sources(Vec<Source>),
    RawItems(Vec<RawItem>),
}

/// Run the full pipeline once. `store`, `transport`, and `reasoning` are the
/// external collaborators; each is optional and its absence degrades the
/// relevant stage (no store → no reliability refresh or updates, no transport
/// → a default one is built, no reasoning → local enrichment).
pub async fn run_pipeline(
    input: PipelineInput,
    cfg: &RadarConfig,
    store: Option<&dyn ReliabilityStore>,
    transport: Option<Arc<dyn Transport>>,
    reasoning: Option<&dyn ReasoningClient>,
) -> Result<PipelineReport, FetchError> {
    ensure_metrics_described();
    let started = Instant::now();
    let mut logs: Vec<StageLog> = Vec::new();

    // --- Stage 1: fetch (or accept pre-fetched items) ---
    let raw_items = match input {
        PipelineInput::RawItems(items) => {
            logs.push(StageLog::now(
                "fetch",
                format!("accepted {} pre-fetched raw item(s)", items.len()),
            ));
            items
        }
        PipelineInput::Sources(mut sources) => {
            if let Some(store) = store {
                refresh_scores(&mut sources, store).await;
            }
            let run = fetch_stage(&sources, cfg, transport).await?;
            let ok = run.outcomes.iter().filter(|o| o.success).count();
            logs.push(StageLog::now(
                "fetch",
                format!(
                    "fetched {ok}/{} source(s), {} raw item(s)",
                    run.outcomes.len(),
                    run.items.len()
                ),
            ));
            if let Some(store) = store {
                let updates = store::apply_outcomes(store, &run.outcomes, Utc::now()).await;
                let applied = updates.iter().filter(|u| u.ok).count();
                logs.push(StageLog::now(
                    "reliability",
                    format!("applied {applied}/{} score update(s)", updates.len()),
                ));
            }
            run.items
        }
    };

    // --- Stage 2: noise filter ---
    let outcome = filter::filter(&raw_items, &cfg.filter);
    logs.push(StageLog::now(
        "filter",
        format!(
            "kept {}/{} (hard filter kept {}, dedup removed {}; heat_threshold={}, dedup_similarity={:.2})",
            outcome.kept_after_dedup,
            outcome.scanned,
            outcome.kept_after_hard_filter,
            outcome
                .kept_after_hard_filter
                .saturating_sub(outcome.kept_after_dedup),
            cfg.filter.heat_threshold,
            cfg.filter.dedup_similarity,
        ),
    ));
    let mut cards = outcome.cards;

    // --- Stage 3: enrichment over the top slice ---
    let top = cards.len().min(cfg.enrich_top.max(1));
    let enrichment: Enrichment = enrich::enrich(&cards[..top], &cfg.keyword, reasoning).await;
    let path = enrichment.path();
    logs.push(StageLog::now(
        "enrich",
        match path {
            ReasoningPath::Remote => format!("remote reasoning over top {top} card(s)"),
            ReasoningPath::Local => format!(
                "local heuristics over top {top} card(s){}",
                if reasoning.is_none() {
                    " (remote unconfigured)"
                } else {
                    " (remote degraded)"
                }
            ),
        },
    ));
    let result = enrichment.into_result();

    // Merge labels back into the full filtered set; cards outside the top
    // slice get the deterministic local label so none ships unlabeled.
    for card in cards.iter_mut() {
        card.authenticity = Some(match result.authenticity.get(&card.id) {
            Some(a) => a.clone(),
            None => local::label_card(card),
        });
    }

    let execution_time_ms = started.elapsed().as_millis() as u64;
    counter!("pipeline_runs_total").increment(1);
    if path == ReasoningPath::Local {
        counter!("pipeline_local_fallback_total").increment(1);
    }
    histogram!("pipeline_duration_ms").record(execution_time_ms as f64);

    logs.push(StageLog::now(
        "report",
        format!(
            "assembled report: {} card(s), {} trend(s), path={}",
            cards.len(),
            result.trends.len(),
            match path {
                ReasoningPath::Remote => "remote",
                ReasoningPath::Local => "local",
            }
        ),
    ));

    Ok(PipelineReport {
        meta: ReportMeta {
            execution_time_ms,
            items_scanned: outcome.scanned,
            items_kept: cards.len(),
            used_reasoning: path,
        },
        logs,
        cards,
        trends: result.trends,
        insight: result.insight,
    })
}

/// Refresh each source's score from the store when a record exists. Store
/// errors here only cost freshness, never the run.
async fn refresh_scores(sources: &mut [Source], store: &dyn ReliabilityStore) {
    for source in sources.iter_mut() {
        match store.get(&source.id).await {
            Ok(Some(rec)) => source.reliability_score = rec.reliability_score,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(source_id = %source.id, error = %e, "score refresh failed");
            }
        }
    }
}

/// Run the fetch stage, building a default transport when none was injected.
/// A transport construction failure degrades to an empty fetch, not an abort.
async fn fetch_stage(
    sources: &[Source],
    cfg: &RadarConfig,
    transport: Option<Arc<dyn Transport>>,
) -> Result<FetchRun, FetchError> {
    let transport: Arc<dyn Transport> = match transport {
        Some(t) => t,
        None => match ReqwestTransport::new() {
            Ok(t) => Arc::new(t),
            Err(e) => {
                tracing::warn!(error = %e, "no transport available, skipping fetch");
                return Ok(FetchRun::default());
            }
        },
    };
    fetch::fetch_all(sources, &cfg.fetcher, transport).await
}
