//! Reliability store collaborator.
//!
//! The persistent store itself lives outside this crate; the pipeline only
//! needs keyed get/put of a per-source trust record. `MemoryStore` is the
//! reference implementation used by tests and the demo binary.
//!
//! Updates are plain read-then-write. Concurrent runs against the same source
//! set can lose an update; the window is a single field and a single write,
//! and the trait makes no atomicity promise. A stricter backend may substitute
//! an atomic increment.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::FetchOutcome;

/// Reward/penalty are asymmetric on purpose: trust decays fast on failure and
/// recovers slowly, which keeps flapping sources near the back of the queue.
pub const SUCCESS_REWARD: f64 = 0.02;
pub const FAILURE_PENALTY: f64 = 0.10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceRecord {
    pub reliability_score: f64,
    pub last_fetch_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ReliabilityStore: Send + Sync {
    /// `Ok(None)` means the source is unknown to the store; that is a
    /// per-source condition, not a store failure.
    async fn get(&self, source_id: &str) -> Result<Option<SourceRecord>>;
    async fn put(&self, source_id: &str, record: SourceRecord) -> Result<()>;
}

/// In-memory store behind a mutex. Serializes individual get/put calls but,
/// like any backend, does not make read-modify-write atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, SourceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(scores: impl IntoIterator<Item = (String, f64)>) -> Self {
        let records = scores
            .into_iter()
            .map(|(id, score)| {
                (
                    id,
                    SourceRecord {
                        reliability_score: score,
                        last_fetch_at: None,
                    },
                )
            })
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl ReliabilityStore for MemoryStore {
    async fn get(&self, source_id: &str) -> Result<Option<SourceRecord>> {
        let guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(source_id).copied())
    }

    async fn put(&self, source_id: &str, record: SourceRecord) -> Result<()> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(source_id.to_string(), record);
        Ok(())
    }
}

/// New score after one fetch outcome: +0.02 on success, −0.10 on failure,
/// clamped to [0, 1] and rounded to 3 decimals.
pub fn adjusted_score(old: f64, success: bool) -> f64 {
    let delta = if success {
        SUCCESS_REWARD
    } else {
        -FAILURE_PENALTY
    };
    let next = (old + delta).clamp(0.0, 1.0);
    (next * 1000.0).round() / 1000.0
}

/// Result of one per-source reliability update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub source_id: String,
    pub ok: bool,
    pub old_score: Option<f64>,
    pub new_score: Option<f64>,
    pub error: Option<String>,
}

/// Apply every fetch outcome to the store, once per pipeline run. Store
/// failures and unknown sources are absorbed per source and reported in the
/// returned updates; they never affect other sources.
pub async fn apply_outcomes(
    store: &dyn ReliabilityStore,
    outcomes: &[FetchOutcome],
    now: DateTime<Utc>,
) -> Vec<ScoreUpdate> {
    let mut updates = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let update = apply_one(store, outcome, now).await;
        if !update.ok {
            tracing::warn!(
                source_id = %update.source_id,
                error = update.error.as_deref().unwrap_or("unknown source"),
                "reliability update failed"
            );
        }
        updates.push(update);
    }
    updates
}

async fn apply_one(
    store: &dyn ReliabilityStore,
    outcome: &FetchOutcome,
    now: DateTime<Utc>,
) -> ScoreUpdate {
    let source_id = outcome.source_id.clone();
    let record = match store.get(&source_id).await {
        Ok(Some(rec)) => rec,
        Ok(None) => {
            return ScoreUpdate {
                source_id,
                ok: false,
                old_score: None,
                new_score: None,
                error: Some("source not found in store".to_string()),
            }
        }
        Err(e) => {
            return ScoreUpdate {
                source_id,
                ok: false,
                old_score: None,
                new_score: None,
                error: Some(format!("store read: {e}")),
            }
        }
    };

    let old = record.reliability_score;
    let new = adjusted_score(old, outcome.success);
    let put = store
        .put(
            &source_id,
            SourceRecord {
                reliability_score: new,
                last_fetch_at: Some(now),
            },
        )
        .await;

    match put {
        Ok(()) => ScoreUpdate {
            source_id,
            ok: true,
            old_score: Some(old),
            new_score: Some(new),
            error: None,
        },
        Err(e) => ScoreUpdate {
            source_id,
            ok: false,
            old_score: Some(old),
            new_score: None,
            error: Some(format!("store write: {e}")),
        },
    }
}
