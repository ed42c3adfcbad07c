//! Provider identity: the closed set of generative-text backends SkillFit can talk to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::LlmError;

/// Tag selecting which adapter and which pricing table a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Claude,
        ProviderId::OpenAi,
        ProviderId::Gemini,
        ProviderId::OpenAiCompatible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAiCompatible => "openai_compatible",
        }
    }

    /// Model used when neither the request nor the user preference names one.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude-sonnet-4-20250514",
            ProviderId::OpenAi => "gpt-5-mini-2025-08-07",
            ProviderId::Gemini => "gemini-2.5-flash",
            ProviderId::OpenAiCompatible => "gpt-3.5-turbo",
        }
    }

    /// Model-name prefixes this provider serves. Empty means "anything goes".
    pub fn model_prefixes(&self) -> &'static [&'static str] {
        match self {
            ProviderId::Claude => &["claude-"],
            ProviderId::OpenAi => &["gpt-", "o1-", "o3-"],
            ProviderId::Gemini => &["gemini-"],
            ProviderId::OpenAiCompatible => &[],
        }
    }

    /// Returns `(model, was_corrected)`. A model that belongs to another provider
    /// (e.g. `gpt-4o` requested against Claude) is swapped for this provider's default.
    pub fn validate_model(&self, model: &str) -> (String, bool) {
        let prefixes = self.model_prefixes();
        if prefixes.is_empty() {
            return (model.to_string(), false);
        }

        let model_lower = model.to_lowercase();
        if prefixes.iter().any(|p| model_lower.starts_with(p)) {
            return (model.to_string(), false);
        }

        warn!(
            provider = self.as_str(),
            requested_model = model,
            corrected_model = self.default_model(),
            "Model mismatch detected, using provider default"
        );
        (self.default_model().to_string(), true)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Ok(ProviderId::Claude),
            "openai" => Ok(ProviderId::OpenAi),
            "gemini" => Ok(ProviderId::Gemini),
            "openai_compatible" => Ok(ProviderId::OpenAiCompatible),
            _ => Err(LlmError::UnsupportedProvider(s.to_string())),
        }
    }
}
