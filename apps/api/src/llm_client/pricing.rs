//! Cost estimation: static per-provider, per-model price table (USD per million tokens).
//!
//! Built once at startup and shared read-only. Estimates keep full precision;
//! `format_cost` is for presentation only.

use std::collections::HashMap;

use serde::Serialize;

use super::{LlmError, ProviderId};

/// Rates in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rates {
    pub input: f64,
    pub output: f64,
}

impl Rates {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

#[derive(Debug, Clone)]
struct ProviderPricing {
    default_model: String,
    models: HashMap<String, Rates>,
}

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    providers: HashMap<ProviderId, ProviderPricing>,
}

/// Decimal places used when presenting a cost (e.g. `$0.0220`).
pub const COST_DECIMALS: i32 = 4;

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a provider's pricing. `default_model` must be in `models`.
    pub fn with_provider(
        mut self,
        provider: ProviderId,
        default_model: &str,
        models: &[(&str, Rates)],
    ) -> Self {
        self.providers.insert(
            provider,
            ProviderPricing {
                default_model: default_model.to_string(),
                models: models
                    .iter()
                    .map(|(name, rates)| (name.to_string(), *rates))
                    .collect(),
            },
        );
        self
    }

    /// Published list prices at the time of writing.
    pub fn builtin() -> Self {
        Self::new()
            .with_provider(
                ProviderId::Claude,
                ProviderId::Claude.default_model(),
                &[
                    ("claude-sonnet-4-20250514", Rates::new(3.0, 15.0)),
                    ("claude-sonnet-4-5", Rates::new(3.0, 15.0)),
                    ("claude-3-5-sonnet-20241022", Rates::new(3.0, 15.0)),
                    ("claude-3-5-haiku-20241022", Rates::new(0.8, 4.0)),
                    ("claude-opus-4-20250514", Rates::new(15.0, 75.0)),
                ],
            )
            .with_provider(
                ProviderId::OpenAi,
                ProviderId::OpenAi.default_model(),
                &[
                    ("gpt-5-mini-2025-08-07", Rates::new(0.25, 2.0)),
                    ("gpt-5", Rates::new(1.25, 10.0)),
                    ("gpt-4o", Rates::new(2.5, 10.0)),
                    ("gpt-4o-mini", Rates::new(0.15, 0.6)),
                    ("gpt-4-turbo", Rates::new(10.0, 30.0)),
                    ("gpt-4-turbo-preview", Rates::new(10.0, 30.0)),
                ],
            )
            .with_provider(
                ProviderId::Gemini,
                ProviderId::Gemini.default_model(),
                &[
                    ("gemini-2.5-flash", Rates::new(0.3, 2.5)),
                    ("gemini-2.5-pro", Rates::new(1.25, 10.0)),
                    ("gemini-2.0-flash", Rates::new(0.1, 0.4)),
                ],
            )
            // Self-hosted / custom deployments are not billed per token.
            .with_provider(
                ProviderId::OpenAiCompatible,
                ProviderId::OpenAiCompatible.default_model(),
                &[(ProviderId::OpenAiCompatible.default_model(), Rates::new(0.0, 0.0))],
            )
    }

    /// Rates for `(provider, model)`. Unknown models fall back to the provider's
    /// default-model rates; a provider with no table at all is a deployment bug.
    pub fn rates(&self, provider: ProviderId, model: &str) -> Result<Rates, LlmError> {
        let pricing = self.providers.get(&provider).ok_or_else(|| {
            LlmError::Configuration(format!("no price table registered for provider {provider}"))
        })?;

        if let Some(rates) = pricing.models.get(model) {
            return Ok(*rates);
        }

        pricing
            .models
            .get(&pricing.default_model)
            .copied()
            .ok_or_else(|| {
                LlmError::Configuration(format!(
                    "price table for {provider} has no entry for its default model {}",
                    pricing.default_model
                ))
            })
    }

    pub fn estimate(
        &self,
        provider: ProviderId,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<f64, LlmError> {
        let rates = self.rates(provider, model)?;
        Ok(input_tokens as f64 * rates.input / 1_000_000.0
            + output_tokens as f64 * rates.output / 1_000_000.0)
    }
}

/// `0.022` → `"$0.0220"`.
pub fn format_cost(cost: f64) -> String {
    format!("${:.*}", COST_DECIMALS as usize, cost)
}
