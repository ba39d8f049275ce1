// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";

fn default_provider() -> String {
    "claude".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_size() -> usize {
    64
}

/// `[summarizer]` table of the notifier config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "claude" is supported (case-insensitive).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from ANTHROPIC_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of memoized summaries kept in memory.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            api_key: default_api_key(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            cache_size: default_cache_size(),
        }
    }
}

impl SummarizerConfig {
    /// Normalize the provider name and resolve an "ENV" api key.
    /// Only fails when summaries are enabled and no key can be found.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match env::var(ENV_API_KEY) {
                Ok(k) => k,
                Err(_) if !self.enabled => String::new(),
                Err(_) => anyhow::bail!("Missing {ENV_API_KEY} env var"),
            };
        }

        if self.enabled && self.provider != "claude" {
            anyhow::bail!("Unsupported summarizer provider in config: {}", self.provider);
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_key_resolved_when_enabled() {
        env::set_var(ENV_API_KEY, "sk-test");
        let cfg = SummarizerConfig {
            enabled: true,
            provider: "Claude".into(),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.provider, "claude");
        env::remove_var(ENV_API_KEY);
    }

    #[serial_test::serial]
    #[test]
    fn missing_key_only_fatal_when_enabled() {
        env::remove_var(ENV_API_KEY);
        assert!(SummarizerConfig::default().resolve().is_ok());
        let enabled = SummarizerConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(enabled.resolve().is_err());
    }
}
