//! Locale-tolerant engagement-counter parsing.
//!
//! Upstream exports mix plain integers, decimal shorthand with CJK magnitude
//! suffixes ("1.2万", "3千"), latin abbreviations ("2w", "15k"), thousands
//! separators, and outright junk. `parse_counter` maps all of that to a
//! non-negative integer and never fails.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

/// Parse one counter value (string | number | null) into a non-negative
/// integer. Unparseable input yields 0.
pub fn parse_counter(v: &Value) -> u64 {
    match v {
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(0.0);
            if !f.is_finite() || f < 0.0 {
                0
            } else {
                f.round() as u64
            }
        }
        Value::String(s) => parse_counter_str(s),
        _ => 0,
    }
}

/// String form of [`parse_counter`]. Matching priority:
/// 1. decimal + 万/萬 suffix  → value × 10 000
/// 2. decimal + 千/k suffix   → value × 1 000
/// 3. decimal + w suffix      → value × 10 000
/// 4. first plain decimal anywhere in the string
///
/// `k`/`K` ride along with 千 because they denote the same magnitude; the
/// single-letter ×10 000 class is `w` alone.
pub fn parse_counter_str(s: &str) -> u64 {
    static RE_WAN: OnceCell<Regex> = OnceCell::new();
    static RE_QIAN: OnceCell<Regex> = OnceCell::new();
    static RE_W: OnceCell<Regex> = OnceCell::new();
    static RE_PLAIN: OnceCell<Regex> = OnceCell::new();

    let s = s.replace([',', '，'], "");
    if s.trim().is_empty() {
        return 0;
    }

    let re_wan =
        RE_WAN.get_or_init(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*[万萬]").unwrap());
    let re_qian =
        RE_QIAN.get_or_init(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*[千kK]").unwrap());
    let re_w = RE_W.get_or_init(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*[wW]").unwrap());
    let re_plain = RE_PLAIN.get_or_init(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").unwrap());

    for (re, mult) in [(re_wan, 10_000.0), (re_qian, 1_000.0), (re_w, 10_000.0)] {
        if let Some(caps) = re.captures(&s) {
            if let Ok(v) = caps[1].parse::<f64>() {
                return scale(v, mult);
            }
        }
    }

    if let Some(m) = re_plain.find(&s) {
        if let Ok(v) = m.as_str().parse::<f64>() {
            return scale(v, 1.0);
        }
    }

    0
}

fn scale(v: f64, mult: f64) -> u64 {
    let out = v * mult;
    if !out.is_finite() || out < 0.0 {
        0
    } else {
        out.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_pass_through() {
        assert_eq!(parse_counter(&json!(42)), 42);
        assert_eq!(parse_counter(&json!(3.7)), 4);
        assert_eq!(parse_counter(&json!(-5)), 0);
    }

    #[test]
    fn null_and_junk_are_zero() {
        assert_eq!(parse_counter(&Value::Null), 0);
        assert_eq!(parse_counter(&json!(true)), 0);
        assert_eq!(parse_counter(&json!("")), 0);
        assert_eq!(parse_counter(&json!("no digits here")), 0);
    }

    #[test]
    fn cjk_magnitude_suffixes() {
        assert_eq!(parse_counter_str("1.2万"), 12_000);
        assert_eq!(parse_counter_str("3萬"), 30_000);
        assert_eq!(parse_counter_str("3.5千"), 3_500);
    }

    #[test]
    fn latin_abbreviations() {
        assert_eq!(parse_counter_str("2w"), 20_000);
        assert_eq!(parse_counter_str("15k"), 15_000);
        assert_eq!(parse_counter_str("1.5K"), 1_500);
    }

    #[test]
    fn thousands_separators_stripped() {
        assert_eq!(parse_counter_str("12,345"), 12_345);
        assert_eq!(parse_counter_str("1，234"), 1_234);
    }

    #[test]
    fn first_plain_number_wins() {
        assert_eq!(parse_counter_str("约 1500 次赞"), 1_500);
        assert_eq!(parse_counter_str("likes: 88 shares: 9"), 88);
    }

    #[test]
    fn suffix_beats_plain_number() {
        // A leading plain number must not shadow a suffixed one later on.
        assert_eq!(parse_counter_str("第2名 1.2万"), 12_000);
    }

    #[test]
    fn reparse_is_idempotent_without_suffix() {
        for s in ["0", "17", "1500", "12345"] {
            let once = parse_counter_str(s);
            let twice = parse_counter_str(&once.to_string());
            assert_eq!(once, twice);
        }
    }
}
