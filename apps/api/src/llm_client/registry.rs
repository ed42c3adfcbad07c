//! Provider registry: built once at startup from configuration, read-only afterwards.
//!
//! Resolution order for the provider is explicit request, then the user's stored
//! preference, then the system default. An identity that is unknown, or known but
//! without credentials, is rejected before any network traffic.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::anthropic::AnthropicAdapter;
use super::gemini::GeminiAdapter;
use super::openai::OpenAiAdapter;
use super::{
    GenerationDefaults, LlmAdapter, LlmClient, LlmError, PriceTable, ProviderId, Rates,
    RetryPolicy,
};
use crate::config::LlmConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-user provider settings, read from the account before resolving.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLlmPreference {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Provider name → the user's own API key for that provider.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl UserLlmPreference {
    fn api_key_for(&self, provider: ProviderId) -> Option<&str> {
        self.api_keys
            .get(provider.as_str())
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }
}

/// Row of `GET /api/v1/providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub provider: ProviderId,
    pub default_model: String,
    pub rates: Option<Rates>,
    pub is_default: bool,
}

#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn LlmAdapter>>,
    default_provider: ProviderId,
    default_model: Option<String>,
    pricing: Arc<PriceTable>,
    retry: RetryPolicy,
    defaults: GenerationDefaults,
    http: Client,
    compatible_base_url: Option<String>,
}

impl ProviderRegistry {
    /// Empty registry with built-in pricing and default call policy.
    pub fn new(default_provider: ProviderId, http: Client) -> Self {
        Self {
            adapters: HashMap::new(),
            default_provider,
            default_model: None,
            pricing: Arc::new(PriceTable::builtin()),
            retry: RetryPolicy::default(),
            defaults: GenerationDefaults::default(),
            http,
            compatible_base_url: None,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let mut registry = Self::new(config.default_provider, http.clone())
            .with_default_model(config.default_model.clone())
            .with_retry(config.retry)
            .with_defaults(GenerationDefaults {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                timeout: config.detailed_timeout,
            });

        if let Some(key) = &config.anthropic_api_key {
            registry = registry.with_adapter(Arc::new(AnthropicAdapter::new(http.clone(), key.clone())));
        }
        if let Some(key) = &config.openai_api_key {
            registry = registry.with_adapter(Arc::new(OpenAiAdapter::openai(http.clone(), key.clone())));
        }
        if let Some(key) = &config.google_api_key {
            registry = registry.with_adapter(Arc::new(GeminiAdapter::new(http.clone(), key.clone())));
        }
        if let Some(base_url) = &config.openai_compatible_base_url {
            registry.compatible_base_url = Some(base_url.clone());
            registry = registry.with_adapter(Arc::new(OpenAiAdapter::compatible(
                http.clone(),
                base_url,
                config.openai_compatible_api_key.clone(),
            )));
        }

        if !registry.is_registered(registry.default_provider) {
            warn!(
                provider = %registry.default_provider,
                "Default LLM provider has no credentials; requests must name a provider or carry a user key"
            );
        }

        info!(
            providers = ?registry.registered(),
            default_provider = %registry.default_provider,
            "LLM provider registry initialized"
        );
        Ok(registry)
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn LlmAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    pub fn is_registered(&self, provider: ProviderId) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Registered providers in declaration order.
    pub fn registered(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|p| self.is_registered(*p))
            .collect()
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.registered()
            .into_iter()
            .map(|provider| {
                let default_model = self.default_model_for(provider);
                ProviderInfo {
                    provider,
                    rates: self.pricing.rates(provider, &default_model).ok(),
                    default_model,
                    is_default: provider == self.default_provider,
                }
            })
            .collect()
    }

    fn default_model_for(&self, provider: ProviderId) -> String {
        match (&self.default_model, provider == self.default_provider) {
            (Some(model), true) => model.clone(),
            _ => self
                .adapters
                .get(&provider)
                .map(|a| a.default_model().to_string())
                .unwrap_or_else(|| provider.default_model().to_string()),
        }
    }

    /// Resolves an `LlmClient` for one request.
    ///
    /// `provider` and `model` are the explicit per-request overrides. Blank strings
    /// count as absent. A stored user key for the chosen provider takes precedence
    /// over the system credential.
    pub fn resolve(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        preference: Option<&UserLlmPreference>,
    ) -> Result<LlmClient, LlmError> {
        let explicit = non_blank(provider);
        let preferred = preference.and_then(|p| non_blank(p.provider.as_deref()));

        let provider = match explicit.or(preferred) {
            Some(name) => ProviderId::from_str(name)?,
            None => self.default_provider,
        };

        let adapter = match preference.and_then(|p| p.api_key_for(provider)) {
            Some(key) => self.user_adapter(provider, key)?,
            None => self.adapters.get(&provider).cloned().ok_or_else(|| {
                LlmError::UnsupportedProvider(format!("{provider} (not registered)"))
            })?,
        };

        // The preference's model only applies when the preference also chose the provider.
        let preferred_model = preference
            .filter(|_| explicit.is_none() && preferred.is_some())
            .and_then(|p| non_blank(p.model.as_deref()));

        let model = match non_blank(model).or(preferred_model) {
            Some(m) => m.to_string(),
            None => match (&self.default_model, provider == self.default_provider) {
                (Some(m), true) => m.clone(),
                _ => adapter.default_model().to_string(),
            },
        };
        let (model, _) = provider.validate_model(&model);

        debug!(provider = %provider, model = %model, "Resolved LLM client");

        Ok(LlmClient::new(
            adapter,
            model,
            self.pricing.clone(),
            self.retry,
            self.defaults,
        ))
    }

    /// Builds a one-off adapter billed to the user's own account.
    fn user_adapter(&self, provider: ProviderId, key: &str) -> Result<Arc<dyn LlmAdapter>, LlmError> {
        let http = self.http.clone();
        let key = key.to_string();
        let adapter: Arc<dyn LlmAdapter> = match provider {
            ProviderId::Claude => Arc::new(AnthropicAdapter::new(http, key)),
            ProviderId::OpenAi => Arc::new(OpenAiAdapter::openai(http, key)),
            ProviderId::Gemini => Arc::new(GeminiAdapter::new(http, key)),
            ProviderId::OpenAiCompatible => {
                let base_url = self.compatible_base_url.as_deref().ok_or_else(|| {
                    LlmError::Configuration(
                        "openai_compatible requires OPENAI_COMPATIBLE_BASE_URL".to_string(),
                    )
                })?;
                Arc::new(OpenAiAdapter::compatible(http, base_url, Some(key)))
            }
        };
        debug!(provider = %provider, "Using user-supplied API key");
        Ok(adapter)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
