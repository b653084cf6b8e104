//! Permissive feed parsing.
//!
//! Real-world feeds are too messy for strict XML deserialization to be worth
//! it here: truncated documents, stray entities, namespaced tags, CDATA soup.
//! This parser scans for loosely tag-delimited fields and extracts whatever it
//! can; byte-for-byte format compliance is a non-goal. A payload that yields
//! zero items is not an error.

use once_cell::sync::OnceCell;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::types::RawItem;

const MAX_CONTENT_CHARS: usize = 500;

/// Minimal structural sanity check: does this look like a feed at all?
/// Used by the fetcher to classify an otherwise-successful response.
pub fn has_feed_root(body: &str) -> bool {
    let head: String = body.chars().take(2048).collect::<String>().to_lowercase();
    head.contains("<rss") || head.contains("<feed") || head.contains("<channel")
}

/// Extract items from a feed payload, best effort. Unrecognized or partial
/// entries are skipped silently; an entry needs at least a title or a link.
pub fn parse_items(body: &str) -> Vec<RawItem> {
    static RE_ITEM: OnceCell<Regex> = OnceCell::new();
    let re_item = RE_ITEM
        .get_or_init(|| Regex::new(r"(?is)<(?:item|entry)[\s>].*?</(?:item|entry)\s*>").unwrap());

    let mut out = Vec::new();
    for m in re_item.find_iter(body) {
        let block = m.as_str();
        let title = field(block, re_title());
        let link = link_field(block);
        if title.is_none() && link.is_none() {
            continue;
        }
        let content = field(block, re_desc()).map(|c| truncate_chars(&c, MAX_CONTENT_CHARS));
        let author = field(block, re_author());
        let created_at = field(block, re_date()).map(|d| normalize_date(&d));

        out.push(RawItem {
            // The permalink doubles as a stable external identifier.
            id: link.clone(),
            url: link,
            title,
            content,
            author,
            created_at,
            ..Default::default()
        });
    }
    out
}

fn re_title() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap())
}

fn re_desc() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(?:description|summary|content(?::encoded)?)[^>]*>(.*?)</(?:description|summary|content(?::encoded)?)\s*>",
        )
        .unwrap()
    })
}

fn re_author() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:author|dc:creator)[^>]*>(.*?)</(?:author|dc:creator)\s*>").unwrap()
    })
}

fn re_date() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(?:pubDate|published|updated|dc:date)[^>]*>(.*?)</(?:pubDate|published|updated|dc:date)\s*>",
        )
        .unwrap()
    })
}

fn field(block: &str, re: &Regex) -> Option<String> {
    let raw = re.captures(block)?.get(1)?.as_str();
    let cleaned = clean_text(raw);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// `<link>` carries its URL as text in RSS and as an `href` attribute in Atom;
/// accept either.
fn link_field(block: &str) -> Option<String> {
    static RE_TEXT: OnceCell<Regex> = OnceCell::new();
    static RE_HREF: OnceCell<Regex> = OnceCell::new();
    let re_text = RE_TEXT.get_or_init(|| Regex::new(r"(?is)<link[^>]*>(.*?)</link\s*>").unwrap());
    let re_href = RE_HREF
        .get_or_init(|| Regex::new(r#"(?is)<link[^>]*href\s*=\s*["']([^"']+)["']"#).unwrap());

    if let Some(caps) = re_text.captures(block) {
        let cleaned = clean_text(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }
    re_href
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Strip CDATA wrappers and markup, decode entities, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    static RE_CDATA: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_cdata =
        RE_CDATA.get_or_init(|| Regex::new(r"(?is)<!\[CDATA\[(.*?)\]\]>").unwrap());
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let mut out = re_cdata.replace_all(s, "$1").to_string();
    out = html_escape::decode_html_entities(&out).to_string();
    out = re_tags.replace_all(&out, " ").to_string();
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Re-emit parseable dates as RFC3339; keep anything else verbatim.
fn normalize_date(s: &str) -> String {
    let trimmed = s.trim();
    let parsed = OffsetDateTime::parse(trimmed, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(trimmed, &Rfc3339));
    match parsed.ok().and_then(|dt| dt.format(&Rfc3339).ok()) {
        Some(iso) => iso,
        None => trimmed.to_string(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
