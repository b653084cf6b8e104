// src/config.rs
// Radar configuration: sources, filter thresholds, fetcher knobs, and the
// optional remote reasoning block. TOML or JSON, with env-var path override.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::enrich::{RemoteConfig, MAX_REMOTE_CARDS};
use crate::fetch::FetcherConfig;
use crate::filter::FilterConfig;
use crate::types::Source;

pub const ENV_CONFIG_PATH: &str = "RADAR_CONFIG_PATH";
pub const ENV_REASONING_API_KEY: &str = "RADAR_REASONING_API_KEY";
const DEFAULT_TOML_PATH: &str = "config/radar.toml";
const DEFAULT_JSON_PATH: &str = "config/radar.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarConfig {
    /// Topic the run is about; feeds the enrichment prompt and narrative.
    #[serde(default = "default_keyword")]
    pub keyword: String,
    /// How many top cards the enrichment stage sees.
    #[serde(default = "default_enrich_top")]
    pub enrich_top: usize,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Absent block means remote reasoning is off and the local path runs.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

fn default_keyword() -> String {
    "trending".to_string()
}
fn default_enrich_top() -> usize {
    MAX_REMOTE_CARDS
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            enrich_top: default_enrich_top(),
            filter: FilterConfig::default(),
            fetcher: FetcherConfig::default(),
            remote: None,
            sources: Vec::new(),
        }
    }
}

impl RadarConfig {
    /// Load from an explicit path. TOML or JSON, decided by extension with a
    /// fallback attempt in the other format.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, &ext)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $RADAR_CONFIG_PATH
    /// 2) config/radar.toml
    /// 3) config/radar.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Ok(Self::default())
    }

    /// Clamp out-of-range values instead of failing, and resolve the remote
    /// api key's `"ENV"` indirection. A remote block whose key cannot be
    /// resolved is dropped: the pipeline then runs the local path rather than
    /// carrying a config it can never use.
    pub fn sanitize(&mut self) {
        self.enrich_top = self.enrich_top.clamp(1, MAX_REMOTE_CARDS);
        self.filter.dedup_similarity = self.filter.dedup_similarity.clamp(0.0, 1.0);
        self.filter.max_output = self.filter.max_output.max(1);
        self.fetcher.concurrency = self.fetcher.concurrency.max(1);
        self.fetcher.timeout_secs = self.fetcher.timeout_secs.max(1);
        for source in &mut self.sources {
            source.weight = source.weight.clamp(0.0, 2.0);
            source.reliability_score = source.reliability_score.clamp(0.0, 1.0);
        }

        if let Some(remote) = self.remote.take() {
            self.remote = resolve_remote(remote);
        }
    }
}

fn resolve_remote(mut remote: RemoteConfig) -> Option<RemoteConfig> {
    if remote.endpoint.trim().is_empty() || remote.model.trim().is_empty() {
        tracing::warn!("remote block incomplete, remote reasoning disabled");
        return None;
    }
    if remote.api_key.trim().eq_ignore_ascii_case("env") {
        match std::env::var(ENV_REASONING_API_KEY) {
            Ok(key) if !key.trim().is_empty() => remote.api_key = key,
            _ => {
                tracing::warn!(
                    "{} not set, remote reasoning disabled",
                    ENV_REASONING_API_KEY
                );
                return None;
            }
        }
    }
    if remote.api_key.trim().is_empty() {
        tracing::warn!("empty reasoning api key, remote reasoning disabled");
        return None;
    }
    Some(remote)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<RadarConfig> {
    let try_toml_first = hint_ext == "toml" || !s.trim_start().starts_with('{');
    if try_toml_first {
        if let Ok(cfg) = toml::from_str(s) {
            return Ok(cfg);
        }
    }
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }
    if !try_toml_first {
        if let Ok(cfg) = toml::from_str(s) {
            return Ok(cfg);
        }
    }
    Err(anyhow!("unsupported config format"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML_CFG: &str = r#"
keyword = "护肤"

[filter]
heat_threshold = 80
blacklist = ["广告"]

[fetcher]
concurrency = 3
proxy_base_url = "https://proxy.test"

[[sources]]
id = "s1"
name = "Feed One"
endpoint = "https://feeds.test/one.xml"
strategy = "direct"
weight = 5.0
reliability_score = 1.7
"#;

    #[test]
    fn toml_config_parses_and_sanitizes() {
        let mut f = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        f.write_all(TOML_CFG.as_bytes()).unwrap();
        let cfg = RadarConfig::load_from(f.path()).unwrap();
        assert_eq!(cfg.keyword, "护肤");
        assert_eq!(cfg.filter.heat_threshold, 80);
        assert_eq!(cfg.fetcher.concurrency, 3);
        assert_eq!(cfg.sources.len(), 1);
        // Out-of-range values clamp instead of failing.
        assert!((cfg.sources[0].weight - 2.0).abs() < 1e-9);
        assert!((cfg.sources[0].reliability_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn json_config_parses() {
        let json = r#"{"keyword":"咖啡","filter":{"max_output":0}}"#;
        let mut f = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        f.write_all(json.as_bytes()).unwrap();
        let cfg = RadarConfig::load_from(f.path()).unwrap();
        assert_eq!(cfg.keyword, "咖啡");
        assert_eq!(cfg.filter.max_output, 1); // clamped up from 0
    }

    #[serial_test::serial]
    #[test]
    fn env_indirect_api_key_resolves_or_disables() {
        std::env::remove_var(ENV_REASONING_API_KEY);
        let mut cfg = RadarConfig {
            remote: Some(RemoteConfig {
                endpoint: "https://llm.test/v1".into(),
                api_key: "ENV".into(),
                model: "m".into(),
            }),
            ..Default::default()
        };
        cfg.sanitize();
        assert!(cfg.remote.is_none()); // unresolved key disables remote

        std::env::set_var(ENV_REASONING_API_KEY, "sk-test");
        let mut cfg2 = RadarConfig {
            remote: Some(RemoteConfig {
                endpoint: "https://llm.test/v1".into(),
                api_key: "ENV".into(),
                model: "m".into(),
            }),
            ..Default::default()
        };
        cfg2.sanitize();
        assert_eq!(cfg2.remote.unwrap().api_key, "sk-test");
        std::env::remove_var(ENV_REASONING_API_KEY);
    }

    #[serial_test::serial]
    #[test]
    fn missing_files_fall_back_to_defaults() {
        std::env::remove_var(ENV_CONFIG_PATH);
        let old = std::env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_current_dir(tmp.path()).unwrap();

        let cfg = RadarConfig::load_default().unwrap();
        assert!(cfg.sources.is_empty());
        assert_eq!(cfg.enrich_top, MAX_REMOTE_CARDS);

        std::env::set_current_dir(&old).unwrap();
    }
}
