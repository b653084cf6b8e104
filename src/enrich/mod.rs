//! Enrichment stage: one bounded remote reasoning call with a deterministic
//! local fallback.
//!
//! The remote service is treated as opaque and untrusted. Its reply is parsed
//! defensively (first well-formed JSON block, wherever it sits in the text)
//! and validated strictly; any structural deviation is handled exactly like a
//! network failure — the local path runs instead. Callers can never observe a
//! partially-valid remote result, and this stage never fails.

pub mod local;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Authenticity, AuthenticityLabel, NormalizedCard, ReasoningPath};

/// Upper bound on cards sent remotely; caps payload size and spend.
pub const MAX_REMOTE_CARDS: usize = 12;
pub const MAX_TRENDS: usize = 3;

/// Remote reasoning endpoint configuration. `api_key = "ENV"` is resolved from
/// the environment by the config loader before this struct reaches the stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

/// Shared shape of both enrichment paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// At most [`MAX_TRENDS`] entries.
    pub trends: Vec<String>,
    pub insight: String,
    /// Exactly one entry per input card id.
    pub authenticity: HashMap<String, Authenticity>,
}

/// Which path produced the result. Remote unavailability is an expected
/// branch, not an error, hence a tagged union instead of `Result`.
#[derive(Debug, Clone)]
pub enum Enrichment {
    Remote(EnrichmentResult),
    Local(EnrichmentResult),
}

impl Enrichment {
    pub fn path(&self) -> ReasoningPath {
        match self {
            Enrichment::Remote(_) => ReasoningPath::Remote,
            Enrichment::Local(_) => ReasoningPath::Local,
        }
    }

    pub fn result(&self) -> &EnrichmentResult {
        match self {
            Enrichment::Remote(r) | Enrichment::Local(r) => r,
        }
    }

    pub fn into_result(self) -> EnrichmentResult {
        match self {
            Enrichment::Remote(r) | Enrichment::Local(r) => r,
        }
    }
}

/// Remote reasoning capability. Implementations do one request/response
/// exchange; everything defensive happens on this side of the trait.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Production client speaking the chat-completions dialect.
pub struct HttpReasoning {
    http: reqwest::Client,
    cfg: RemoteConfig,
}

impl HttpReasoning {
    pub fn new(cfg: RemoteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("trend-radar/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building reasoning client")?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl ReasoningClient for HttpReasoning {
    async fn complete(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You label social posts. Reply with a single JSON object: \
{\"authenticity\":[{\"id\":...,\"label\":\"real|generic|unclear\",\"rationale\":...}],\
\"trends\":[...],\"insight\":...}. No prose outside the JSON.";
        let req = Req {
            model: &self.cfg.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 900,
        };

        let resp = self
            .http
            .post(&self.cfg.endpoint)
            .bearer_auth(&self.cfg.api_key)
            .json(&req)
            .send()
            .await
            .context("reasoning request")?;
        if !resp.status().is_success() {
            anyhow::bail!("reasoning status {}", resp.status());
        }
        let body: Resp = resp.json().await.context("reasoning response json")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("reasoning response had no choices")
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Canned client for tests and offline runs.
pub struct MockReasoning {
    pub reply: String,
}

#[async_trait]
impl ReasoningClient for MockReasoning {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Enrich the top cards. `client = None` means remote reasoning is not
/// configured; the local path runs directly. Any remote failure or malformed
/// reply also lands on the local path. Never fails.
pub async fn enrich(
    cards: &[NormalizedCard],
    keyword: &str,
    client: Option<&dyn ReasoningClient>,
) -> Enrichment {
    let Some(client) = client else {
        tracing::debug!("remote reasoning not configured, using local path");
        return Enrichment::Local(local::local_enrichment(cards, keyword));
    };

    let bounded = &cards[..cards.len().min(MAX_REMOTE_CARDS)];
    let prompt = build_prompt(bounded, keyword);

    match client.complete(&prompt).await {
        Ok(reply) => match parse_remote_reply(&reply, bounded) {
            Some(mut result) => {
                // The prompt was bounded; cards past the bound still need a
                // label to keep the one-entry-per-card invariant.
                for c in &cards[bounded.len()..] {
                    result
                        .authenticity
                        .entry(c.id.clone())
                        .or_insert_with(|| local::label_card(c));
                }
                tracing::info!(provider = client.name(), "remote enrichment accepted");
                Enrichment::Remote(result)
            }
            None => {
                tracing::warn!(
                    provider = client.name(),
                    "remote reply failed validation, using local path"
                );
                Enrichment::Local(local::local_enrichment(cards, keyword))
            }
        },
        Err(e) => {
            tracing::warn!(provider = client.name(), error = %e, "remote call failed, using local path");
            Enrichment::Local(local::local_enrichment(cards, keyword))
        }
    }
}

fn build_prompt(cards: &[NormalizedCard], keyword: &str) -> String {
    #[derive(Serialize)]
    struct PromptCard<'a> {
        id: &'a str,
        title: &'a str,
        content: String,
        heat_score: u64,
        tags: &'a [String],
    }

    let compact: Vec<PromptCard<'_>> = cards
        .iter()
        .map(|c| PromptCard {
            id: &c.id,
            title: &c.title,
            content: c.content.chars().take(300).collect(),
            heat_score: c.metrics.heat_score,
            tags: &c.tags,
        })
        .collect();

    format!(
        "Topic: {keyword}\nPosts:\n{}",
        serde_json::to_string(&compact).unwrap_or_else(|_| "[]".to_string())
    )
}

/// Strict validation of the remote reply. Returns `None` unless the first
/// JSON block parses AND carries string trends, a non-empty insight, and a
/// known authenticity label for every input card — the bar that makes the
/// one-entry-per-card invariant unconditional.
fn parse_remote_reply(reply: &str, cards: &[NormalizedCard]) -> Option<EnrichmentResult> {
    let block = first_json_block(reply)?;
    let value: Value = serde_json::from_str(block).ok()?;

    let trends: Vec<String> = value
        .get("trends")?
        .as_array()?
        .iter()
        .map(|t| t.as_str().map(|s| s.trim().to_string()))
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .filter(|t| !t.is_empty())
        .take(MAX_TRENDS)
        .collect();

    let insight = value.get("insight")?.as_str()?.trim().to_string();
    if insight.is_empty() {
        return None;
    }

    let mut authenticity = HashMap::new();
    for entry in value.get("authenticity")?.as_array()? {
        let id = entry.get("id")?.as_str()?.to_string();
        let label = AuthenticityLabel::parse(entry.get("label")?.as_str()?)?;
        let rationale = entry
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();
        authenticity.insert(id, Authenticity { label, rationale });
    }
    if cards.iter().any(|c| !authenticity.contains_key(&c.id)) {
        return None;
    }

    Some(EnrichmentResult {
        trends,
        insight,
        authenticity,
    })
}

/// First balanced `{...}` block in the text; tolerates code fences and chatter
/// around the JSON. Quote- and escape-aware.
fn first_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
