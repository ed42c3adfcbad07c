use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{ProviderId, RetryPolicy};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub llm: LlmConfig,
}

/// Provider credentials and call defaults. Each configured key registers one provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub openai_compatible_base_url: Option<String>,
    pub openai_compatible_api_key: Option<String>,
    pub default_provider: ProviderId,
    pub default_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
    pub detailed_timeout: Duration,
    pub quick_timeout: Duration,
    pub batch_concurrency: usize,
}

pub const MAX_BATCH_CONCURRENCY: usize = 10;

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            llm: LlmConfig::from_lookup(|key| std::env::var(key).ok())?,
        })
    }
}

impl LlmConfig {
    /// Reads every LLM setting through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let default_provider = match get("DEFAULT_LLM_PROVIDER") {
            Some(name) => ProviderId::from_str(&name)
                .with_context(|| format!("DEFAULT_LLM_PROVIDER '{name}' is not a known provider"))?,
            None => ProviderId::Claude,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "LLM_MAX_ATTEMPTS", defaults.max_attempts)?.max(1),
            initial_backoff_ms: parse_or(&get, "LLM_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms)?,
            ..defaults
        };

        let temperature: f32 = parse_or(&get, "DEFAULT_TEMPERATURE", 0.3)?;
        let batch_concurrency: usize = parse_or(&get, "BATCH_CONCURRENCY", 5)?;

        Ok(LlmConfig {
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            google_api_key: get("GOOGLE_API_KEY"),
            openai_compatible_base_url: get("OPENAI_COMPATIBLE_BASE_URL"),
            openai_compatible_api_key: get("OPENAI_COMPATIBLE_API_KEY"),
            default_provider,
            default_model: get("DEFAULT_MODEL_NAME"),
            temperature: temperature.clamp(0.0, 1.0),
            max_tokens: parse_or(&get, "DEFAULT_MAX_TOKENS", 4096)?,
            retry,
            detailed_timeout: Duration::from_secs(parse_or(&get, "LLM_DETAILED_TIMEOUT_SECS", 60)?),
            quick_timeout: Duration::from_secs(parse_or(&get, "LLM_QUICK_TIMEOUT_SECS", 20)?),
            batch_concurrency: batch_concurrency.clamp(1, MAX_BATCH_CONCURRENCY),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<LlmConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LlmConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.default_provider, ProviderId::Claude);
        assert_eq!(config.default_model, None);
        assert!((config.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.detailed_timeout, Duration::from_secs(60));
        assert_eq!(config.quick_timeout, Duration::from_secs(20));
        assert_eq!(config.batch_concurrency, 5);
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_blank_values_are_treated_as_unset() {
        let config = config_from(&[("OPENAI_API_KEY", "  "), ("DEFAULT_MODEL_NAME", "")]).unwrap();
        assert!(config.openai_api_key.is_none());
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = config_from(&[("DEFAULT_TEMPERATURE", "1.8"), ("BATCH_CONCURRENCY", "64")]).unwrap();
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.batch_concurrency, MAX_BATCH_CONCURRENCY);

        let config = config_from(&[("BATCH_CONCURRENCY", "0")]).unwrap();
        assert_eq!(config.batch_concurrency, 1);
    }

    #[test]
    fn test_unknown_default_provider_fails_startup() {
        let err = config_from(&[("DEFAULT_LLM_PROVIDER", "claud")]).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_LLM_PROVIDER"));
    }

    #[test]
    fn test_malformed_number_fails_startup() {
        let err = config_from(&[("LLM_MAX_ATTEMPTS", "three")]).unwrap_err();
        assert!(err.to_string().contains("LLM_MAX_ATTEMPTS"));
    }
}
