//! TOML configuration parsing.
//!
//! ```toml
//! [db]
//! path = "./data/peakwatch.sqlite"
//!
//! [source]
//! base_url = "https://api.twitter.com/1.1"
//! token_env = "PEAKWATCH_BEARER_TOKEN"
//!
//! [resolver]
//! tolerance_secs = 5
//!
//! [analysis]
//! interval_secs = 60
//! peak_ratio = 0.25
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Wait between retries of a throttled or failed request.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_lang")]
    pub lang: Option<String>,
    /// Upper bound on records fetched by one pull.
    #[serde(default = "default_max_records")]
    pub max_records: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            page_size: default_page_size(),
            cooldown_secs: default_cooldown_secs(),
            timeout_secs: default_timeout_secs(),
            lang: default_lang(),
            max_records: default_max_records(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.twitter.com/1.1".to_string()
}
fn default_token_env() -> String {
    "PEAKWATCH_BEARER_TOKEN".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_cooldown_secs() -> u64 {
    180
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_lang() -> Option<String> {
    Some("en".to_string())
}
fn default_max_records() -> u64 {
    100_000_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_probe_batch")]
    pub probe_batch: u32,
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: i64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_batch: default_probe_batch(),
            tolerance_secs: default_tolerance_secs(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_probe_batch() -> u32 {
    10
}
fn default_tolerance_secs() -> i64 {
    5
}
fn default_max_iterations() -> u32 {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: i64,
    /// Hysteresis threshold as a fraction of the series maximum.
    #[serde(default = "default_peak_ratio")]
    pub peak_ratio: f64,
    /// Co-occurrence window for keyword ranking, in candidate terms.
    #[serde(default = "default_keyword_window")]
    pub keyword_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            peak_ratio: default_peak_ratio(),
            keyword_window: default_keyword_window(),
        }
    }
}

fn default_interval_secs() -> i64 {
    60
}
fn default_peak_ratio() -> f64 {
    0.25
}
fn default_keyword_window() -> usize {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.page_size == 0 || config.source.page_size > 100 {
        anyhow::bail!("source.page_size must be in 1..=100");
    }
    if config.source.max_records == 0 {
        anyhow::bail!("source.max_records must be > 0");
    }
    if config.resolver.probe_batch == 0 {
        anyhow::bail!("resolver.probe_batch must be > 0");
    }
    if config.resolver.tolerance_secs < 0 {
        anyhow::bail!("resolver.tolerance_secs must be >= 0");
    }
    if config.resolver.max_iterations == 0 {
        anyhow::bail!("resolver.max_iterations must be > 0");
    }
    if config.analysis.interval_secs <= 0 {
        anyhow::bail!("analysis.interval_secs must be > 0");
    }
    if !(config.analysis.peak_ratio > 0.0 && config.analysis.peak_ratio < 1.0) {
        anyhow::bail!("analysis.peak_ratio must be in (0.0, 1.0)");
    }
    if config.analysis.keyword_window < 2 {
        anyhow::bail!("analysis.keyword_window must be >= 2");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"./data/pw.sqlite\"\n").unwrap();
        assert_eq!(cfg.source.page_size, 100);
        assert_eq!(cfg.source.cooldown_secs, 180);
        assert_eq!(cfg.source.lang.as_deref(), Some("en"));
        assert_eq!(cfg.resolver.probe_batch, 10);
        assert_eq!(cfg.resolver.tolerance_secs, 5);
        assert_eq!(cfg.analysis.interval_secs, 60);
        assert!((cfg.analysis.peak_ratio - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = parse(include_str!("../config/peakwatch.example.toml")).unwrap();
        assert_eq!(cfg.source.max_records, 100_000_000);
        assert_eq!(cfg.analysis.keyword_window, 2);
    }

    #[test]
    fn test_rejects_oversized_page() {
        let err = parse("[db]\npath = \"x\"\n[source]\npage_size = 500\n").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let err = parse("[db]\npath = \"x\"\n[analysis]\npeak_ratio = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("peak_ratio"));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = parse("[db]\npath = \"x\"\n[analysis]\ninterval_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }
}
