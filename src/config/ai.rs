// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

fn default_daily_limit() -> u32 {
    200
}

/// One chat-completions endpoint + model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    /// "openai" | "perplexity" (case-insensitive)
    pub provider: String,
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY / PERPLEXITY_API_KEY (by provider)
    pub api_key: String,
    /// Overrides the provider's default endpoint root (e.g. for a proxy).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ModelProfile {
    pub fn endpoint_root(&self) -> String {
        if let Some(b) = &self.base_url {
            return b.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "perplexity" => "https://api.perplexity.ai".to_string(),
            _ => "https://api.openai.com/v1".to_string(),
        }
    }

    fn resolve(&mut self) -> anyhow::Result<()> {
        self.provider = self.provider.to_lowercase();
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                "perplexity" => env::var("PERPLEXITY_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing PERPLEXITY_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                self.temperature = None;
            }
        }
        Ok(())
    }
}

/// Two model roles: `knowledge` answers open research questions (online model),
/// `reasoning` curates headlines, structures metrics and writes digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    pub knowledge: ModelProfile,
    pub reasoning: ModelProfile,
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Uses AI_CONFIG_PATH or defaults to "config/ai.json".
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        Self::load_from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load AI config at {path}: {e}"))
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;
        if cfg.enabled {
            cfg.knowledge.resolve()?;
            cfg.reasoning.resolve()?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: &str = r#"{
        "enabled": true,
        "knowledge": {"provider": "Perplexity", "model": "sonar", "api_key": "pk-1"},
        "reasoning": {"provider": "openai", "model": "gpt-4o", "api_key": "sk-1",
                      "temperature": 9.0, "max_tokens": 1500}
    }"#;

    #[test]
    fn parses_profiles_and_sanitizes() {
        let cfg = AiConfig::from_json_str(CFG).unwrap();
        assert_eq!(cfg.daily_limit, 200);
        assert_eq!(cfg.knowledge.provider, "perplexity");
        assert_eq!(cfg.knowledge.endpoint_root(), "https://api.perplexity.ai");
        assert_eq!(cfg.reasoning.endpoint_root(), "https://api.openai.com/v1");
        assert_eq!(cfg.reasoning.temperature, None);
        assert_eq!(cfg.reasoning.max_tokens, Some(1500));
    }

    #[serial_test::serial]
    #[test]
    fn env_key_must_exist_when_enabled() {
        env::remove_var("OPENAI_API_KEY");
        let raw = CFG.replace("sk-1", "ENV");
        assert!(AiConfig::from_json_str(&raw).is_err());

        env::set_var("OPENAI_API_KEY", "sk-from-env");
        let cfg = AiConfig::from_json_str(&raw).unwrap();
        assert_eq!(cfg.reasoning.api_key, "sk-from-env");
        env::remove_var("OPENAI_API_KEY");
    }
}
