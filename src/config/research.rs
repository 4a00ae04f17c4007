// src/config/research.rs
//! Domain settings for the research pipeline, loaded from TOML. Every field has a default.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::analyze::curation::MAX_HEADLINES;

pub const DEFAULT_RESEARCH_CONFIG_PATH: &str = "config/research.toml";
pub const ENV_RESEARCH_CONFIG_PATH: &str = "RESEARCH_CONFIG_PATH";
pub const ENV_RESEARCH_STORAGE_DIR: &str = "RESEARCH_STORAGE_DIR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub news: NewsSettings,
    pub curation: CurationSettings,
    pub article: ArticleSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    /// Recency window in days.
    pub period_days: u32,
    /// Cap per query.
    pub max_results: usize,
    pub language: String,
    pub country: String,
    pub base_url: String,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            period_days: 7,
            max_results: 25,
            language: "en".into(),
            country: "US".into(),
            base_url: "https://news.google.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurationSettings {
    pub max_headlines: usize,
}

impl Default for CurationSettings {
    fn default() -> Self {
        Self { max_headlines: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArticleSettings {
    pub timeout_secs: u64,
    pub max_chars: usize,
}

impl Default for ArticleSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_chars: 20_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

impl ResearchConfig {
    /// Uses RESEARCH_CONFIG_PATH or "config/research.toml"; a missing default file yields defaults.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var(ENV_RESEARCH_CONFIG_PATH).ok();
        let path = explicit
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESEARCH_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => anyhow::bail!(
                "Failed to read research config at {}: {}",
                path.display(),
                e
            ),
        };

        if let Ok(dir) = std::env::var(ENV_RESEARCH_STORAGE_DIR) {
            if !dir.trim().is_empty() {
                cfg.storage.dir = PathBuf::from(dir);
            }
        }
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: ResearchConfig = toml::from_str(s)?;
        // harden: zero caps would silently disable the pipeline
        if cfg.news.max_results == 0 {
            cfg.news.max_results = NewsSettings::default().max_results;
        }
        if cfg.news.period_days == 0 {
            cfg.news.period_days = NewsSettings::default().period_days;
        }
        if cfg.curation.max_headlines == 0 {
            cfg.curation.max_headlines = CurationSettings::default().max_headlines;
        }
        cfg.curation.max_headlines = cfg.curation.max_headlines.min(MAX_HEADLINES);
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ResearchConfig::from_toml_str(
            r#"
[news]
max_results = 5

[storage]
dir = "/tmp/research"
"#,
        )
        .unwrap();
        assert_eq!(cfg.news.max_results, 5);
        assert_eq!(cfg.news.period_days, 7);
        assert_eq!(cfg.curation.max_headlines, 10);
        assert_eq!(cfg.article.max_chars, 20_000);
        assert_eq!(cfg.storage.dir, PathBuf::from("/tmp/research"));
    }

    #[test]
    fn zero_caps_fall_back() {
        let cfg = ResearchConfig::from_toml_str("[curation]\nmax_headlines = 0\n").unwrap();
        assert_eq!(cfg.curation.max_headlines, 10);
    }

    #[test]
    fn headline_cap_is_clamped_to_ten() {
        let cfg = ResearchConfig::from_toml_str("[curation]\nmax_headlines = 20\n").unwrap();
        assert_eq!(cfg.curation.max_headlines, MAX_HEADLINES);
    }
}
