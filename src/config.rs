use crate::auth::AuthMode;
use crate::error::{Error, Result};
use crate::util::{non_empty_trimmed, parse_bool_flag};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_THINKING_BUDGET_TOKENS: u32 = 10_000;
const DEFAULT_THINKING_EFFORT: &str = "high";

/// Extended-thinking request settings. `budget_tokens` only applies to the
/// manual mode; `effort` is the hint passed alongside adaptive thinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingSettings {
    pub enabled: bool,
    pub budget_tokens: u32,
    pub effort: String,
}

impl Default for ThinkingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            budget_tokens: DEFAULT_THINKING_BUDGET_TOKENS,
            effort: DEFAULT_THINKING_EFFORT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub auth_mode: AuthMode,
    pub model: String,
    /// Base API URL, always normalized to end with a trailing slash so that
    /// `messages` and `models` can be joined onto it.
    pub base_url: String,
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub thinking: ThinkingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_mode: AuthMode::ApiKey,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 1.0,
            thinking: ThinkingSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let base_url = normalize_base_url(
            &std::env::var("ANTHROPIC_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        );
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .and_then(|v| non_empty_trimmed(&v).map(str::to_string));
        let model =
            std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let anthropic_version = std::env::var("ANTHROPIC_VERSION")
            .unwrap_or_else(|_| DEFAULT_ANTHROPIC_VERSION.to_string());
        let auth_mode = std::env::var("PARLANCE_AUTH_MODE")
            .ok()
            .and_then(|v| AuthMode::parse(&v))
            .unwrap_or(AuthMode::ApiKey);
        let max_tokens = std::env::var("PARLANCE_MAX_TOKENS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let temperature = std::env::var("PARLANCE_TEMPERATURE")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(1.0);

        let mut thinking = ThinkingSettings::default();
        if let Some(enabled) = std::env::var("PARLANCE_THINKING").ok().and_then(parse_bool_flag) {
            thinking.enabled = enabled;
        }
        if let Some(budget) = std::env::var("PARLANCE_THINKING_BUDGET")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            thinking.budget_tokens = budget;
        }
        if let Some(effort) = std::env::var("PARLANCE_THINKING_EFFORT")
            .ok()
            .and_then(|v| non_empty_trimmed(&v).map(str::to_string))
        {
            thinking.effort = effort;
        }

        Ok(Self {
            api_key,
            auth_mode,
            model,
            base_url,
            anthropic_version,
            max_tokens,
            temperature,
            thinking,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "invalid ANTHROPIC_API_URL '{}': expected http:// or https:// URL",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".to_string()));
        }
        if self.max_tokens < 2 {
            return Err(Error::Config(
                "max_tokens must leave room for at least one thinking token".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Temperature must land in [0.0, 1.0]; anything else falls back to 1.0.
pub fn valid_temperature(value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gains_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://api.anthropic.com/v1"),
            "https://api.anthropic.com/v1/"
        );
        assert_eq!(
            normalize_base_url("https://api.anthropic.com/v1/"),
            "https://api.anthropic.com/v1/"
        );
    }

    #[test]
    fn test_valid_temperature_falls_back_out_of_range() {
        assert_eq!(valid_temperature(0.3), 0.3);
        assert_eq!(valid_temperature(1.0), 1.0);
        assert_eq!(valid_temperature(-0.1), 1.0);
        assert_eq!(valid_temperature(2.5), 1.0);
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = Config {
            base_url: "ftp://example.com/".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_reads_environment() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("ANTHROPIC_API_URL", "http://localhost:8000/v1");
        std::env::set_var("ANTHROPIC_MODEL", "claude-test-model");
        std::env::set_var("PARLANCE_THINKING", "on");
        std::env::set_var("PARLANCE_THINKING_BUDGET", "2048");

        let config = Config::load().expect("config should load");
        assert_eq!(config.base_url, "http://localhost:8000/v1/");
        assert_eq!(config.model, "claude-test-model");
        assert!(config.thinking.enabled);
        assert_eq!(config.thinking.budget_tokens, 2048);

        std::env::remove_var("ANTHROPIC_API_URL");
        std::env::remove_var("ANTHROPIC_MODEL");
        std::env::remove_var("PARLANCE_THINKING");
        std::env::remove_var("PARLANCE_THINKING_BUDGET");
    }

    #[test]
    fn test_load_ignores_blank_env_values() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("ANTHROPIC_API_KEY", "   ");
        std::env::set_var("PARLANCE_THINKING_EFFORT", "  ");

        let config = Config::load().expect("config should load");
        assert_eq!(config.api_key, None);
        assert_eq!(config.thinking.effort, "high");

        std::env::set_var("ANTHROPIC_API_KEY", "  sk-test-key  ");
        std::env::set_var("PARLANCE_THINKING_EFFORT", " low ");

        let config = Config::load().expect("config should load");
        assert_eq!(config.api_key.as_deref(), Some("sk-test-key"));
        assert_eq!(config.thinking.effort, "low");

        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("PARLANCE_THINKING_EFFORT");
    }
}
