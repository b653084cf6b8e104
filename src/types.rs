// src/types.rs
// Shared data model for the fetch → filter → enrich pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a source's fetch URL is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// The stored endpoint is used verbatim.
    Direct,
    /// The stored endpoint is a path fragment appended to a shared proxy base.
    TemplateProxy,
}

/// A configured feed source. Owned by the reliability store; the fetcher only
/// reads it and proposes score updates after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// Full URL (`Direct`) or path fragment (`TemplateProxy`).
    pub endpoint: Option<String>,
    pub strategy: FetchStrategy,
    #[serde(default)]
    pub category: String,
    /// Editorial weight in [0, 2]; multiplies reliability when ordering.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Adaptive trust in [0, 1].
    #[serde(default = "default_reliability")]
    pub reliability_score: f64,
    #[serde(default)]
    pub last_fetch_at: Option<DateTime<Utc>>,
}

fn default_weight() -> f64 {
    1.0
}
fn default_active() -> bool {
    true
}
fn default_reliability() -> f64 {
    0.5
}

impl Source {
    /// Scheduling priority: degraded or down-weighted sources sort last.
    pub fn priority(&self) -> f64 {
        self.reliability_score * self.weight
    }
}

/// Permissive bag for one external item. Every field is optional with one
/// documented fallback; counters arrive as string|number|null and go through
/// [`crate::filter::metric::parse_counter`]. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(default, alias = "note_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "desc")]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub likes: Value,
    #[serde(default)]
    pub collects: Value,
    #[serde(default)]
    pub comments: Value,
    #[serde(default)]
    pub shares: Value,
    /// Arbitrary upstream shape; normalized (and capped) by the noise filter.
    #[serde(default)]
    pub tags: Value,
}

/// Parsed engagement counters plus the derived heat score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMetrics {
    pub likes: u64,
    pub collects: u64,
    pub comments: u64,
    pub shares: u64,
    pub heat_score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticityLabel {
    /// Reads like a first-hand experience.
    Real,
    /// Reads like marketing copy.
    Generic,
    Unclear,
}

impl AuthenticityLabel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" => Some(Self::Real),
            "generic" => Some(Self::Generic),
            "unclear" => Some(Self::Unclear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticity {
    pub label: AuthenticityLabel,
    pub rationale: String,
}

/// Output of the noise filter: one normalized, scored item.
///
/// `id` is the upstream identifier when present, otherwise a deterministic
/// hash of (title, author, created_at) — the same raw item always maps to the
/// same id across runs. `authenticity` stays `None` until enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCard {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    pub metrics: CardMetrics,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub authenticity: Option<Authenticity>,
}

/// One per source per run; feeds the reliability update and the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub source_id: String,
    pub success: bool,
    pub items_count: usize,
    pub fetch_time_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which enrichment path produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningPath {
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub message: String,
}

impl StageLog {
    pub fn now(stage: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub execution_time_ms: u64,
    pub items_scanned: usize,
    pub items_kept: usize,
    pub used_reasoning: ReasoningPath,
}

/// Final pipeline result. Constructed exactly once per invocation and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub meta: ReportMeta,
    pub logs: Vec<StageLog>,
    pub cards: Vec<NormalizedCard>,
    pub trends: Vec<String>,
    pub insight: String,
}
