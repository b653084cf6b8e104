//! Reliability-weighted concurrent source fetching.
//!
//! Sources are ordered by (active desc, reliability × weight desc) and fetched
//! in fixed-size concurrent batches. Each attempt is individually time-boxed
//! and size-guarded; every network, timeout, size, or structural failure is
//! classified as retryable and retried with exponential backoff. After the
//! retry budget is spent the source gets a failed [`FetchOutcome`] — only a
//! configuration error (an unresolvable URL) aborts the run.

pub mod feed;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FetchOutcome, FetchStrategy, RawItem, Source};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_MAX_BODY_BYTES: u64 = 5 * 1024 * 1024;
const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 5000;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_attempts_total", "Individual fetch attempts issued.");
        describe_counter!(
            "fetch_failures_total",
            "Sources whose retry budget was exhausted."
        );
        describe_histogram!("fetch_duration_ms", "Per-source fetch time incl. retries.");
    });
}

/// Fetch-stage errors. Only `Config` crosses the pipeline boundary; transient
/// failures are absorbed into per-source outcomes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Transient(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Batch size for concurrent fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Additional attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Declared payload sizes above this are rejected before the body is read.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// Base URL prepended to `TemplateProxy` path fragments.
    #[serde(default)]
    pub proxy_base_url: Option<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            proxy_base_url: None,
        }
    }
}

/// Abstract transport so tests inject mocks and the crate stays agnostic of
/// the HTTP client. Implementations must honor `timeout` per call and reject
/// bodies whose declared length exceeds `max_bytes` before reading them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn http_get(&self, url: &str, timeout: Duration, max_bytes: u64)
        -> Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: String,
}

/// Production transport backed by reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("trend-radar/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn http_get(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<HttpResponse> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status().as_u16();
        let content_length = resp.content_length();
        if let Some(len) = content_length {
            if len > max_bytes {
                anyhow::bail!("declared payload of {len} bytes exceeds {max_bytes} byte limit");
            }
        }
        let body = resp.text().await.context("reading body")?;
        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}

/// Everything one pipeline run needs from the fetch stage. Outcomes and items
/// follow schedule order, not completion order, so runs are reproducible for a
/// fixed source list and fixed scores.
#[derive(Debug, Default)]
pub struct FetchRun {
    pub outcomes: Vec<FetchOutcome>,
    pub items: Vec<RawItem>,
}

/// Resolve a source's fetch URL from its strategy. A missing endpoint (or a
/// `TemplateProxy` source without a configured base) is fatal and not retried.
pub fn resolve_url(source: &Source, cfg: &FetcherConfig) -> Result<String, FetchError> {
    let endpoint = source
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    match source.strategy {
        FetchStrategy::Direct => endpoint.map(String::from).ok_or_else(|| {
            FetchError::Config(format!("source {}: missing direct url", source.id))
        }),
        FetchStrategy::TemplateProxy => {
            let fragment = endpoint.ok_or_else(|| {
                FetchError::Config(format!(
                    "source {}: template proxy requires a path fragment",
                    source.id
                ))
            })?;
            let base = cfg
                .proxy_base_url
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    FetchError::Config(format!(
                        "source {}: proxy_base_url not configured",
                        source.id
                    ))
                })?;
            Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                fragment.trim_start_matches('/')
            ))
        }
    }
}

/// Backoff before retry attempt `retry` (1-based): min(1000·2^(retry−1), 5000) ms.
pub fn backoff_ms(retry: u32) -> u64 {
    BACKOFF_BASE_MS
        .saturating_mul(1u64 << (retry.saturating_sub(1)).min(16))
        .min(BACKOFF_CAP_MS)
}

/// Schedule order: active sources first, then by reliability × weight
/// descending. Under a tight time budget this biases completed work toward
/// higher-trust sources. `active` only affects ordering: inactive sources are
/// still fetched, in the trailing batches.
pub fn schedule_order(sources: &[Source]) -> Vec<Source> {
    let mut ordered = sources.to_vec();
    ordered.sort_by(|a, b| {
        b.active.cmp(&a.active).then(
            b.priority()
                .partial_cmp(&a.priority())
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    ordered
}

/// Fetch all sources in fixed-size concurrent batches.
///
/// URL resolution runs up front so a configuration error surfaces immediately,
/// before any network traffic. Everything after that degrades per source.
pub async fn fetch_all(
    sources: &[Source],
    cfg: &FetcherConfig,
    transport: Arc<dyn Transport>,
) -> Result<FetchRun, FetchError> {
    ensure_metrics_described();

    let ordered = schedule_order(sources);
    let mut resolved = Vec::with_capacity(ordered.len());
    for source in &ordered {
        resolved.push((source.id.clone(), resolve_url(source, cfg)?));
    }

    let concurrency = cfg.concurrency.max(1);
    let mut run = FetchRun::default();

    for batch in resolved.chunks(concurrency) {
        let mut handles = Vec::with_capacity(batch.len());
        for (source_id, url) in batch {
            let transport = Arc::clone(&transport);
            let cfg = cfg.clone();
            let source_id = source_id.clone();
            let url = url.clone();
            handles.push((
                source_id.clone(),
                tokio::spawn(async move {
                    fetch_source(&source_id, &url, &cfg, transport.as_ref()).await
                }),
            ));
        }
        // Await in schedule order to keep the outcome array stable.
        for (source_id, handle) in handles {
            match handle.await {
                Ok((outcome, mut items)) => {
                    run.items.append(&mut items);
                    run.outcomes.push(outcome);
                }
                Err(e) => {
                    counter!("fetch_failures_total").increment(1);
                    run.outcomes.push(FetchOutcome {
                        source_id,
                        success: false,
                        items_count: 0,
                        fetch_time_ms: 0,
                        error: Some(format!("fetch task aborted: {e}")),
                    });
                }
            }
        }
    }

    Ok(run)
}

/// Fetch one source with retries. Never fails; the last error string lands in
/// the outcome.
pub async fn fetch_source(
    source_id: &str,
    url: &str,
    cfg: &FetcherConfig,
    transport: &dyn Transport,
) -> (FetchOutcome, Vec<RawItem>) {
    let started = Instant::now();
    let attempts = cfg.max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(Duration::from_millis(backoff_ms(attempt - 1))).await;
        }
        counter!("fetch_attempts_total").increment(1);
        match attempt_fetch(url, cfg, transport).await {
            Ok(items) => {
                let elapsed = started.elapsed().as_millis() as u64;
                histogram!("fetch_duration_ms").record(elapsed as f64);
                tracing::debug!(source_id, attempt, items = items.len(), "fetch ok");
                return (
                    FetchOutcome {
                        source_id: source_id.to_string(),
                        success: true,
                        items_count: items.len(),
                        fetch_time_ms: elapsed,
                        error: None,
                    },
                    items,
                );
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(source_id, attempt, error = %last_error, "fetch attempt failed");
            }
        }
    }

    counter!("fetch_failures_total").increment(1);
    let elapsed = started.elapsed().as_millis() as u64;
    histogram!("fetch_duration_ms").record(elapsed as f64);
    (
        FetchOutcome {
            source_id: source_id.to_string(),
            success: false,
            items_count: 0,
            fetch_time_ms: elapsed,
            error: Some(last_error),
        },
        Vec::new(),
    )
}

/// One attempt. Every failure mode here is uniformly `Transient`: network and
/// timeout errors, non-2xx statuses, oversized payloads, and payloads without
/// a recognizable feed root.
async fn attempt_fetch(
    url: &str,
    cfg: &FetcherConfig,
    transport: &dyn Transport,
) -> Result<Vec<RawItem>, FetchError> {
    let resp = transport
        .http_get(
            url,
            Duration::from_secs(cfg.timeout_secs),
            cfg.max_body_bytes,
        )
        .await
        .map_err(|e| FetchError::Transient(format!("{e:#}")))?;

    if !(200..300).contains(&resp.status) {
        return Err(FetchError::Transient(format!("http status {}", resp.status)));
    }
    if let Some(len) = resp.content_length {
        if len > cfg.max_body_bytes {
            return Err(FetchError::Transient(format!(
                "declared payload of {len} bytes exceeds {} byte limit",
                cfg.max_body_bytes
            )));
        }
    }
    if !feed::has_feed_root(&resp.body) {
        return Err(FetchError::Transient(
            "invalid feed: no recognizable feed root".to_string(),
        ));
    }
    Ok(feed::parse_items(&resp.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(id: &str, reliability: f64, weight: f64, active: bool) -> Source {
        Source {
            id: id.to_string(),
            name: id.to_string(),
            endpoint: Some(format!("https://feeds.test/{id}")),
            strategy: FetchStrategy::Direct,
            category: String::new(),
            weight,
            active,
            reliability_score: reliability,
            last_fetch_at: None,
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(1), 1000);
        assert_eq!(backoff_ms(2), 2000);
        assert_eq!(backoff_ms(3), 4000);
        assert_eq!(backoff_ms(4), 5000);
        assert_eq!(backoff_ms(10), 5000);
    }

    #[test]
    fn schedule_puts_inactive_last_and_sorts_by_priority() {
        let sources = vec![
            src("low", 0.2, 1.0, true),
            src("inactive", 0.99, 2.0, false),
            src("high", 0.9, 1.5, true),
            src("mid", 0.8, 1.0, true),
        ];
        let ordered = schedule_order(&sources);
        let ids: Vec<&str> = ordered.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low", "inactive"]);
    }

    #[test]
    fn direct_url_resolves_verbatim() {
        let cfg = FetcherConfig::default();
        let s = src("a", 0.5, 1.0, true);
        assert_eq!(resolve_url(&s, &cfg).unwrap(), "https://feeds.test/a");
    }

    #[test]
    fn template_proxy_joins_base_and_fragment() {
        let cfg = FetcherConfig {
            proxy_base_url: Some("https://proxy.test/fetch/".to_string()),
            ..Default::default()
        };
        let mut s = src("a", 0.5, 1.0, true);
        s.strategy = FetchStrategy::TemplateProxy;
        s.endpoint = Some("/feeds/a.xml".to_string());
        assert_eq!(
            resolve_url(&s, &cfg).unwrap(),
            "https://proxy.test/fetch/feeds/a.xml"
        );
    }

    #[test]
    fn missing_fragment_is_config_error() {
        let cfg = FetcherConfig {
            proxy_base_url: Some("https://proxy.test".to_string()),
            ..Default::default()
        };
        let mut s = src("a", 0.5, 1.0, true);
        s.strategy = FetchStrategy::TemplateProxy;
        s.endpoint = Some("   ".to_string());
        match resolve_url(&s, &cfg) {
            Err(FetchError::Config(msg)) => assert!(msg.contains("path fragment")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_proxy_base_is_config_error() {
        let cfg = FetcherConfig::default();
        let mut s = src("a", 0.5, 1.0, true);
        s.strategy = FetchStrategy::TemplateProxy;
        assert!(matches!(resolve_url(&s, &cfg), Err(FetchError::Config(_))));
    }
}
