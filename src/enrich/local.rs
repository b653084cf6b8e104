//! Deterministic local enrichment.
//!
//! This is the fallback the pipeline lands on whenever remote reasoning is
//! unconfigured, unreachable, or returns something malformed. It must produce
//! the same shaped result as the remote path from nothing but the cards:
//! trend keywords by weighted frequency, authenticity labels by signal-keyword
//! counting, and a templated narrative.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::filter::similarity;
use crate::types::{Authenticity, AuthenticityLabel, NormalizedCard};

use super::{EnrichmentResult, MAX_TRENDS};

const TAG_TOKEN_WEIGHT: u64 = 3;
const TEXT_TOKEN_WEIGHT: u64 = 1;
const EXCLAMATION_LIMIT: usize = 3;

/// Phrases that read like campaign copy.
static MARKETING_SIGNALS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "推荐", "好物", "安利", "必买", "必入", "链接", "优惠", "折扣", "促销", "广告",
        "合作", "赞助", "抽奖", "福利", "下单", "sponsored", "giveaway", "promo",
        "discount", "buy now", "limited time", "link in bio",
    ]
});

/// Phrases that read like a first-hand account.
static REALISM_SIGNALS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "踩雷", "后悔", "真实", "亲测", "实测", "优点", "缺点", "对比", "体验", "吐槽",
        "避雷", "个人感受", "honest", "tried it", "pros", "cons", "in my experience",
        "after a month",
    ]
});

/// Function words excluded from trend extraction.
static STOP_WORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "的", "了", "是", "在", "我", "有", "和", "就", "不", "人", "都", "一个", "也",
        "很", "到", "说", "要", "去", "你", "会", "着", "没有", "这个", "那个", "the",
        "and", "for", "with", "that", "this", "you", "are", "was", "have", "not",
        "but", "all", "its", "can",
    ]
});

/// Full local path: trends + per-card labels + narrative.
pub fn local_enrichment(cards: &[NormalizedCard], keyword: &str) -> EnrichmentResult {
    let trends = extract_trends(cards);
    let authenticity: HashMap<String, Authenticity> = cards
        .iter()
        .map(|c| (c.id.clone(), label_card(c)))
        .collect();
    let insight = narrative(cards, keyword, &authenticity, &trends);
    EnrichmentResult {
        trends,
        insight,
        authenticity,
    }
}

/// Trend keywords by weighted frequency: whole tags count triple, character
/// bigrams from title + content count single. Stop words are dropped. Ties
/// break lexicographically so the output is stable across runs.
pub fn extract_trends(cards: &[NormalizedCard]) -> Vec<String> {
    let mut weights: HashMap<String, u64> = HashMap::new();

    for card in cards {
        for tag in &card.tags {
            let token = tag.trim().to_lowercase();
            if token.is_empty() || is_stop_word(&token) {
                continue;
            }
            *weights.entry(token).or_default() += TAG_TOKEN_WEIGHT;
        }
        let text = format!("{} {}", card.title, card.content);
        for gram in similarity::bigrams(&text) {
            if is_stop_word(&gram) || gram.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            *weights.entry(gram).or_default() += TEXT_TOKEN_WEIGHT;
        }
    }

    let mut ranked: Vec<(String, u64)> = weights.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(MAX_TRENDS).map(|(t, _)| t).collect()
}

/// Signal-keyword labeling. Marketing copy is checked first: two marketing
/// signals, or an exclamation-mark pileup, outweigh realism cues.
pub fn label_card(card: &NormalizedCard) -> Authenticity {
    let text = format!("{} {}", card.title, card.content).to_lowercase();
    let marketing = count_signals(&text, &MARKETING_SIGNALS);
    let realism = count_signals(&text, &REALISM_SIGNALS);
    let exclamations = text.chars().filter(|c| *c == '!' || *c == '！').count();

    if marketing >= 2 || exclamations >= EXCLAMATION_LIMIT {
        Authenticity {
            label: AuthenticityLabel::Generic,
            rationale: format!(
                "{marketing} marketing signal(s), {exclamations} exclamation mark(s)"
            ),
        }
    } else if realism >= 2 {
        Authenticity {
            label: AuthenticityLabel::Real,
            rationale: format!("{realism} first-hand signal(s)"),
        }
    } else {
        Authenticity {
            label: AuthenticityLabel::Unclear,
            rationale: "no decisive signals".to_string(),
        }
    }
}

fn count_signals(text: &str, signals: &[&str]) -> usize {
    signals.iter().filter(|s| text.contains(*s)).count()
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.iter().any(|w| *w == token)
}

fn narrative(
    cards: &[NormalizedCard],
    keyword: &str,
    labels: &HashMap<String, Authenticity>,
    trends: &[String],
) -> String {
    if cards.is_empty() {
        return format!("No posts about \"{keyword}\" survived filtering this run.");
    }

    let mut real = 0usize;
    let mut generic = 0usize;
    let mut unclear = 0usize;
    for auth in labels.values() {
        match auth.label {
            AuthenticityLabel::Real => real += 1,
            AuthenticityLabel::Generic => generic += 1,
            AuthenticityLabel::Unclear => unclear += 1,
        }
    }

    let mut out = format!(
        "Reviewed {} post(s) about \"{keyword}\": {real} read like first-hand \
experiences, {generic} like marketing copy, {unclear} unclear.",
        cards.len()
    );
    if !trends.is_empty() {
        out.push_str(&format!(" Recurring angles: {}.", trends.join(", ")));
    }
    if let Some(top) = cards.first() {
        out.push_str(&format!(
            " Highest-heat post: \"{}\" (heat {}).",
            top.title, top.metrics.heat_score
        ));
    }
    out
}
