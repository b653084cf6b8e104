// tests/enrich_fallback.rs
// The degradation contract: whatever the remote side does, the caller gets a
// complete result with ≤3 trends and one authenticity label per card.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use trend_radar::config::RadarConfig;
use trend_radar::enrich::{enrich, MockReasoning, ReasoningClient};
use trend_radar::filter::{filter, FilterConfig};
use trend_radar::pipeline::{run_pipeline, PipelineInput};
use trend_radar::types::{RawItem, ReasoningPath};

fn raw(id: &str, title: &str, likes: u64) -> RawItem {
    RawItem {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        likes: json!(likes),
        ..Default::default()
    }
}

fn cards_from(items: &[RawItem]) -> Vec<trend_radar::types::NormalizedCard> {
    filter(
        items,
        &FilterConfig {
            heat_threshold: 0,
            ..Default::default()
        },
    )
    .cards
}

/// Client that always errors, simulating an unreachable endpoint.
struct DownReasoning;

#[async_trait]
impl ReasoningClient for DownReasoning {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("connect timeout")
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn unconfigured_remote_uses_local_path_end_to_end() {
    // Scenario: no reasoning endpoint at all.
    let items = vec![
        raw("a", "亲测好用的登山包 优点和缺点都说说", 800),
        raw("b", "年度好物推荐 优惠链接快来", 700),
        raw("c", "周末爬山随手拍", 600),
    ];
    let cfg = RadarConfig {
        filter: FilterConfig {
            heat_threshold: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let report = run_pipeline(PipelineInput::RawItems(items), &cfg, None, None, None)
        .await
        .unwrap();

    assert_eq!(report.meta.used_reasoning, ReasoningPath::Local);
    assert!(report.trends.len() <= 3);
    assert_eq!(report.cards.len(), 3);
    for card in &report.cards {
        assert!(card.authenticity.is_some(), "unlabeled card {}", card.id);
    }
    assert!(report
        .logs
        .iter()
        .any(|l| l.stage == "enrich" && l.message.contains("local")));
}

#[tokio::test]
async fn remote_outage_degrades_silently() {
    let items = vec![raw("a", "第一条", 100), raw("b", "完全另一回事", 90)];
    let cards = cards_from(&items);
    let out = enrich(&cards, "topic", Some(&DownReasoning)).await;
    assert_eq!(out.path(), ReasoningPath::Local);
    assert_eq!(out.result().authenticity.len(), 2);
}

#[tokio::test]
async fn malformed_remote_shapes_all_fall_back() {
    let items = vec![raw("a", "第一条", 100)];
    let cards = cards_from(&items);
    let bad_replies = [
        "plain prose, no json".to_string(),
        r#"{"trends": "not-an-array", "insight": "x", "authenticity": []}"#.to_string(),
        r#"{"trends": [], "insight": "", "authenticity": []}"#.to_string(),
        // Parses, but does not cover card "a".
        r#"{"trends": ["t"], "insight": "i", "authenticity": [{"id":"zzz","label":"real"}]}"#
            .to_string(),
        // Unknown label.
        r#"{"trends": ["t"], "insight": "i", "authenticity": [{"id":"a","label":"fake-ish"}]}"#
            .to_string(),
    ];
    for reply in bad_replies {
        let mock = MockReasoning { reply: reply.clone() };
        let out = enrich(&cards, "topic", Some(&mock)).await;
        assert_eq!(out.path(), ReasoningPath::Local, "reply accepted: {reply}");
        assert_eq!(out.result().authenticity.len(), 1);
    }
}

#[tokio::test]
async fn valid_remote_reply_is_used_verbatim() {
    let items = vec![raw("a", "第一条", 100), raw("b", "另一条", 90)];
    let cards = cards_from(&items);
    let reply = r#"Here it is:
{"authenticity":[{"id":"a","label":"real","rationale":"detail-rich"},
                 {"id":"b","label":"generic","rationale":"promo tone"}],
 "trends":["登山","装备"],
 "insight":"Two posts, one organic."}"#;
    let mock = MockReasoning {
        reply: reply.to_string(),
    };
    let out = enrich(&cards, "topic", Some(&mock)).await;
    assert_eq!(out.path(), ReasoningPath::Remote);
    let result = out.result();
    assert_eq!(result.trends, vec!["登山", "装备"]);
    assert_eq!(result.insight, "Two posts, one organic.");
    assert_eq!(
        result.authenticity.get("b").unwrap().rationale,
        "promo tone"
    );
}

#[tokio::test]
async fn cards_beyond_remote_bound_still_get_labels() {
    // More cards than the remote bound: the reply only covers the top slice,
    // the rest are labeled locally, and the path still counts as remote.
    let items: Vec<RawItem> = (0..15)
        .map(|i| raw(&format!("id{i}"), &format!("互不相同的话题{i}内容"), 1000 - i))
        .collect();
    let cards = filter(
        &items,
        &FilterConfig {
            heat_threshold: 0,
            dedup_similarity: 0.95,
            ..Default::default()
        },
    )
    .cards;
    assert_eq!(cards.len(), 15);

    let entries: Vec<String> = cards
        .iter()
        .take(12)
        .map(|c| format!(r#"{{"id":"{}","label":"unclear"}}"#, c.id))
        .collect();
    let reply = format!(
        r#"{{"authenticity":[{}],"trends":["t"],"insight":"i"}}"#,
        entries.join(",")
    );
    let mock = MockReasoning { reply };
    let out = enrich(&cards, "topic", Some(&mock)).await;
    assert_eq!(out.path(), ReasoningPath::Remote);
    assert_eq!(out.result().authenticity.len(), 15);
}
