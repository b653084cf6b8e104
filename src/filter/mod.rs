//! Noise filter: raw items in, ranked deduplicated cards out.
//!
//! Stages: normalize every item into a card, hard-filter (heat threshold +
//! keyword blacklist), sort by heat descending, greedy bigram-Jaccard dedup,
//! cap the output. This function never fails; malformed fields degrade to
//! their documented defaults.

pub mod heat;
pub mod metric;
pub mod similarity;

use std::collections::HashSet;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{CardMetrics, NormalizedCard, RawItem};

const MAX_TAGS: usize = 12;
const TITLE_FROM_CONTENT_CHARS: usize = 40;
const UNTITLED: &str = "(untitled)";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("filter_scanned_total", "Raw items seen by the noise filter.");
        describe_counter!(
            "filter_hard_rejected_total",
            "Items dropped by heat threshold or blacklist."
        );
        describe_counter!("filter_dedup_total", "Items dropped as near-duplicates.");
        describe_counter!("filter_kept_total", "Cards surviving the full filter pass.");
    });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Cards below this heat score are dropped outright.
    #[serde(default = "default_heat_threshold")]
    pub heat_threshold: u64,
    /// Title-bigram Jaccard at or above this is a near-duplicate.
    #[serde(default = "default_dedup_similarity")]
    pub dedup_similarity: f64,
    /// Case-insensitive substrings checked against title + content.
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Hard cap on the number of surviving cards.
    #[serde(default = "default_max_output")]
    pub max_output: usize,
}

fn default_heat_threshold() -> u64 {
    50
}
fn default_dedup_similarity() -> f64 {
    0.5
}
fn default_max_output() -> usize {
    20
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            heat_threshold: default_heat_threshold(),
            dedup_similarity: default_dedup_similarity(),
            blacklist: Vec::new(),
            max_output: default_max_output(),
        }
    }
}

/// Filter result plus stage counts for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub cards: Vec<NormalizedCard>,
    pub scanned: usize,
    pub kept_after_hard_filter: usize,
    pub kept_after_dedup: usize,
}

/// Run the full noise-filter pass.
pub fn filter(items: &[RawItem], cfg: &FilterConfig) -> FilterOutcome {
    ensure_metrics_described();

    let scanned = items.len();
    let blacklist: Vec<String> = cfg
        .blacklist
        .iter()
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    // 1) Normalize, 2) hard filter.
    let mut survivors: Vec<NormalizedCard> = Vec::with_capacity(items.len());
    for item in items {
        let card = normalize_card(item);
        if card.metrics.heat_score < cfg.heat_threshold {
            continue;
        }
        if is_blacklisted(&card, &blacklist) {
            continue;
        }
        survivors.push(card);
    }
    let kept_after_hard_filter = survivors.len();

    // 3) Rank by heat, stable for ties.
    survivors.sort_by(|a, b| b.metrics.heat_score.cmp(&a.metrics.heat_score));

    // 4) Greedy dedup against already-kept titles only (first kept wins; the
    // pre-sort makes that the higher-heat version), stop at the cap.
    let mut kept: Vec<NormalizedCard> = Vec::new();
    let mut kept_grams: Vec<HashSet<String>> = Vec::new();
    for card in survivors {
        if kept.len() >= cfg.max_output {
            break;
        }
        let grams = similarity::bigrams(&card.title);
        let dup = kept_grams
            .iter()
            .any(|seen| similarity::jaccard(&grams, seen) >= cfg.dedup_similarity);
        if dup {
            continue;
        }
        kept_grams.push(grams);
        kept.push(card);
    }
    let kept_after_dedup = kept.len();

    counter!("filter_scanned_total").increment(scanned as u64);
    counter!("filter_hard_rejected_total").increment((scanned - kept_after_hard_filter) as u64);
    counter!("filter_dedup_total")
        .increment((kept_after_hard_filter.saturating_sub(kept_after_dedup)) as u64);
    counter!("filter_kept_total").increment(kept_after_dedup as u64);

    tracing::debug!(
        scanned,
        kept_after_hard_filter,
        kept_after_dedup,
        heat_threshold = cfg.heat_threshold,
        "noise filter pass"
    );

    FilterOutcome {
        cards: kept,
        scanned,
        kept_after_hard_filter,
        kept_after_dedup,
    }
}

/// Map one raw item to a normalized card. Infallible; every missing field has
/// exactly one fallback.
pub fn normalize_card(item: &RawItem) -> NormalizedCard {
    let likes = metric::parse_counter(&item.likes);
    let collects = metric::parse_counter(&item.collects);
    let comments = metric::parse_counter(&item.comments);
    let shares = metric::parse_counter(&item.shares);

    let content = item
        .content
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let title = derive_title(item.title.as_deref(), &content);
    let author = item
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from);
    let created_at = item
        .created_at
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);

    let id = match item.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(external) => external.to_string(),
        None => stable_id(&title, author.as_deref(), created_at.as_deref()),
    };

    NormalizedCard {
        id,
        url: item.url.clone(),
        title,
        content,
        author,
        created_at,
        metrics: CardMetrics {
            likes,
            collects,
            comments,
            shares,
            heat_score: heat::heat_score(likes, collects, comments, shares),
        },
        tags: collect_tags(&item.tags),
        authenticity: None,
    }
}

fn derive_title(title: Option<&str>, content: &str) -> String {
    if let Some(t) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return t.to_string();
    }
    let truncated: String = content.chars().take(TITLE_FROM_CONTENT_CHARS).collect();
    let truncated = truncated.trim().to_string();
    if truncated.is_empty() {
        UNTITLED.to_string()
    } else {
        truncated
    }
}

/// Deterministic id for items without an upstream identifier: the same
/// (title, author, created_at) triple always hashes to the same id.
fn stable_id(title: &str, author: Option<&str>, created_at: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(author.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(created_at.unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn is_blacklisted(card: &NormalizedCard, blacklist_lower: &[String]) -> bool {
    if blacklist_lower.is_empty() {
        return false;
    }
    let haystack = format!("{} {}", card.title, card.content).to_lowercase();
    blacklist_lower.iter().any(|w| haystack.contains(w))
}

/// Accept whatever shape `tags` arrived in; keep at most [`MAX_TAGS`] strings.
fn collect_tags(tags: &Value) -> Vec<String> {
    let mut out = Vec::new();
    match tags {
        Value::Array(items) => {
            for v in items {
                let tag = match v {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => continue,
                };
                if !tag.is_empty() {
                    out.push(tag);
                }
                if out.len() == MAX_TAGS {
                    break;
                }
            }
        }
        Value::String(s) => {
            let t = s.trim();
            if !t.is_empty() {
                out.push(t.to_string());
            }
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(title: &str, likes: Value) -> RawItem {
        RawItem {
            title: Some(title.to_string()),
            likes,
            ..Default::default()
        }
    }

    #[test]
    fn stable_id_is_deterministic() {
        let a = normalize_card(&raw("同款标题", json!(10)));
        let b = normalize_card(&raw("同款标题", json!(999)));
        assert_eq!(a.id, b.id); // counters do not affect identity
        let c = normalize_card(&raw("别的标题", json!(10)));
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn external_id_wins_over_hash() {
        let mut item = raw("t", json!(1));
        item.id = Some("ext-1".into());
        assert_eq!(normalize_card(&item).id, "ext-1");
    }

    #[test]
    fn title_falls_back_to_content_then_placeholder() {
        let item = RawItem {
            content: Some("  第一句话就是标题 rest of the body goes on".into()),
            ..Default::default()
        };
        let card = normalize_card(&item);
        assert!(card.title.starts_with("第一句话就是标题"));
        assert!(card.title.chars().count() <= TITLE_FROM_CONTENT_CHARS);

        let empty = normalize_card(&RawItem::default());
        assert_eq!(empty.title, UNTITLED);
    }

    #[test]
    fn tags_are_capped_and_coerced() {
        let vals: Vec<Value> = (0..20).map(|i| json!(format!("tag{i}"))).collect();
        let mut item = RawItem {
            tags: Value::Array(vals),
            ..Default::default()
        };
        assert_eq!(normalize_card(&item).tags.len(), MAX_TAGS);

        item.tags = json!("单个标签");
        assert_eq!(normalize_card(&item).tags, vec!["单个标签"]);

        item.tags = json!({"not": "a list"});
        assert!(normalize_card(&item).tags.is_empty());
    }

    #[test]
    fn hard_filter_drops_cold_and_blacklisted() {
        let items = vec![
            raw("hot item", json!(100)),
            raw("cold item", json!(1)),
            raw("广告 推广链接点这里", json!(500)),
        ];
        let cfg = FilterConfig {
            heat_threshold: 50,
            blacklist: vec!["广告".into()],
            ..Default::default()
        };
        let out = filter(&items, &cfg);
        assert_eq!(out.scanned, 3);
        assert_eq!(out.kept_after_hard_filter, 1);
        assert_eq!(out.cards[0].title, "hot item");
    }

    #[test]
    fn output_sorted_by_heat_desc() {
        let items = vec![
            raw("low", json!(60)),
            raw("high", json!(900)),
            raw("mid", json!(300)),
        ];
        let out = filter(&items, &FilterConfig::default());
        let heats: Vec<u64> = out.cards.iter().map(|c| c.metrics.heat_score).collect();
        assert_eq!(heats, vec![900, 300, 60]);
    }

    #[test]
    fn dedup_keeps_higher_heat_version() {
        let items = vec![
            raw("测试产品推荐", json!(100)),
            raw("测试产品推荐测评", json!(800)),
        ];
        let out = filter(&items, &FilterConfig::default());
        assert_eq!(out.kept_after_dedup, 1);
        assert_eq!(out.cards[0].title, "测试产品推荐测评");
        assert_eq!(out.cards[0].metrics.heat_score, 800);
    }

    #[test]
    fn max_output_cap_enforced() {
        let items: Vec<RawItem> = (0..30)
            .map(|i| raw(&format!("distinct topic number {i} entirely"), json!(100 + i)))
            .collect();
        let cfg = FilterConfig {
            max_output: 5,
            dedup_similarity: 0.99,
            ..Default::default()
        };
        let out = filter(&items, &cfg);
        assert_eq!(out.cards.len(), 5);
    }

    #[test]
    fn empty_input_is_fine() {
        let out = filter(&[], &FilterConfig::default());
        assert_eq!(out.scanned, 0);
        assert!(out.cards.is_empty());
    }
}
