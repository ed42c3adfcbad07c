/// LLM Client: the single point of entry for every generative-text call in SkillFit.
///
/// ARCHITECTURAL RULE: No other module may call a provider API directly.
/// Matching, extraction and batch scoring all go through `LlmClient`, which is
/// resolved per request from the `ProviderRegistry` built once at startup.
///
/// Layers:
/// - `LlmAdapter`: one per provider, speaks that provider's wire format.
/// - `LlmClient`: adapter + resolved model + retry policy + pricing.
/// - `structured`: turns free-form model output into a schema-checked JSON object.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod pricing;
pub mod prompts;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod structured;

#[cfg(test)]
pub mod testing;

pub use pricing::{PriceTable, Rates};
pub use provider::ProviderId;
pub use registry::{ProviderRegistry, UserLlmPreference};
pub use retry::RetryPolicy;
pub use structured::{FieldKind, ResponseSchema};

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed for {provider}: {message}")]
    Authentication { provider: ProviderId, message: String },

    #[error("rate limited by {provider}: {message}")]
    RateLimited { provider: ProviderId, message: String },

    #[error("request to {provider} timed out")]
    Timeout { provider: ProviderId },

    #[error("{provider} unavailable (status {status}): {message}")]
    Unavailable {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    #[error("network error talking to {provider}: {message}")]
    Network { provider: ProviderId, message: String },

    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: ProviderId, message: String },

    #[error("could not parse a JSON object from model output: {0}")]
    UnparseableResponse(String),

    #[error("model output failed schema validation: {0}")]
    SchemaValidation(String),

    #[error("unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("LLM configuration error: {0}")]
    Configuration(String),
}

/// Flat, serialisable failure classification. Batch callers attribute failures with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    Timeout,
    Unavailable,
    Network,
    Api,
    MalformedResponse,
    UnparseableResponse,
    SchemaValidation,
    UnsupportedProvider,
    Configuration,
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Authentication { .. } => ErrorKind::Authentication,
            LlmError::RateLimited { .. } => ErrorKind::RateLimit,
            LlmError::Timeout { .. } => ErrorKind::Timeout,
            LlmError::Unavailable { .. } => ErrorKind::Unavailable,
            LlmError::Network { .. } => ErrorKind::Network,
            LlmError::Api { .. } => ErrorKind::Api,
            LlmError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            LlmError::UnparseableResponse(_) => ErrorKind::UnparseableResponse,
            LlmError::SchemaValidation(_) => ErrorKind::SchemaValidation,
            LlmError::UnsupportedProvider(_) => ErrorKind::UnsupportedProvider,
            LlmError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Transient failures may succeed if re-queued later; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimit | ErrorKind::Timeout | ErrorKind::Unavailable | ErrorKind::Network
        )
    }
}

/// Maps a non-success HTTP status from any provider onto the error taxonomy.
pub(crate) fn classify_status(provider: ProviderId, status: u16, body: &str) -> LlmError {
    let message = provider_error_message(body);
    match status {
        401 | 403 => LlmError::Authentication { provider, message },
        429 => LlmError::RateLimited { provider, message },
        408 => LlmError::Timeout { provider },
        s if s >= 500 => LlmError::Unavailable {
            provider,
            status,
            message,
        },
        _ => LlmError::Api {
            provider,
            status,
            message,
        },
    }
}

/// All supported providers wrap errors as `{"error": {"message": "..."}}`.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

pub(crate) fn transport_error(provider: ProviderId, err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout { provider }
    } else {
        LlmError::Network {
            provider,
            message: err.to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / response types
// ────────────────────────────────────────────────────────────────────────────

/// Caller-facing request. Unset fields fall back to the client's defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    /// Shape the reply must conform to. Required by `generate_structured`.
    pub schema: Option<ResponseSchema>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-attempt wall-clock limit.
    pub timeout: Option<Duration>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Clamped to [0, 1].
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully-resolved request handed to an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// What an adapter returns: the reply text plus whatever usage the backend reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub text: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// True when counts were approximated locally rather than reported by the backend.
    pub estimated: bool,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub text: String,
    pub usage: TokenUsage,
    pub provider: ProviderId,
    pub model: String,
    /// USD, full precision. Round only when presenting.
    pub cost_estimate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredGeneration {
    pub payload: Map<String, Value>,
    pub result: GenerationResult,
}

/// Rough token count (~4 characters per token) for backends that omit usage.
pub fn approximate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

fn resolve_usage(request: &AdapterRequest, raw: &RawResponse) -> TokenUsage {
    match (raw.input_tokens, raw.output_tokens) {
        (Some(input_tokens), Some(output_tokens)) => TokenUsage {
            input_tokens,
            output_tokens,
            estimated: false,
        },
        (input, output) => {
            let prompt_tokens = approximate_tokens(&request.prompt)
                + request.system.as_deref().map(approximate_tokens).unwrap_or(0);
            TokenUsage {
                input_tokens: input.unwrap_or(prompt_tokens),
                output_tokens: output.unwrap_or_else(|| approximate_tokens(&raw.text)),
                estimated: true,
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Adapter trait
// ────────────────────────────────────────────────────────────────────────────

/// One implementation per provider. Adapters are stateless apart from credentials
/// and must not retry; retry policy lives in `LlmClient`.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn default_model(&self) -> &str {
        self.provider().default_model()
    }

    async fn generate_text(&self, request: &AdapterRequest) -> Result<RawResponse, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Defaults applied to fields a `GenerationRequest` leaves unset.
#[derive(Debug, Clone, Copy)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A provider adapter bound to a model, a retry budget and a price table.
/// Cheap to clone; produced by `ProviderRegistry::resolve`.
#[derive(Clone)]
pub struct LlmClient {
    adapter: Arc<dyn LlmAdapter>,
    model: String,
    pricing: Arc<PriceTable>,
    retry: RetryPolicy,
    defaults: GenerationDefaults,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider())
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    pub fn new(
        adapter: Arc<dyn LlmAdapter>,
        model: String,
        pricing: Arc<PriceTable>,
        retry: RetryPolicy,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            adapter,
            model,
            pricing,
            retry,
            defaults,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.adapter.provider()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn price_per_million_tokens(&self, model: &str) -> Result<Rates, LlmError> {
        self.pricing.rates(self.provider(), model)
    }

    fn prepare(&self, request: &GenerationRequest) -> AdapterRequest {
        let model = match request.model.as_deref() {
            Some(m) => self.provider().validate_model(m).0,
            None => self.model.clone(),
        };
        AdapterRequest {
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            model,
            temperature: request
                .temperature
                .unwrap_or(self.defaults.temperature)
                .clamp(0.0, 1.0),
            max_tokens: request.max_tokens.unwrap_or(self.defaults.max_tokens),
        }
    }

    /// Calls the provider, retrying transient failures per the retry policy, and
    /// attaches token usage and a cost estimate to the reply.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, LlmError> {
        let provider = self.provider();
        let prepared = self.prepare(request);
        let timeout = request.timeout.unwrap_or(self.defaults.timeout);

        debug!(
            provider = %provider,
            model = %prepared.model,
            max_tokens = prepared.max_tokens,
            "Dispatching LLM call"
        );

        let adapter = &self.adapter;
        let raw = self
            .retry
            .run(provider, |_attempt| {
                let req = &prepared;
                async move {
                    match tokio::time::timeout(timeout, adapter.generate_text(req)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(LlmError::Timeout { provider }),
                    }
                }
            })
            .await?;

        let usage = resolve_usage(&prepared, &raw);
        let cost_estimate = self.pricing.estimate(
            provider,
            &prepared.model,
            usage.input_tokens,
            usage.output_tokens,
        )?;

        info!(
            provider = %provider,
            model = %prepared.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            tokens_estimated = usage.estimated,
            cost = %pricing::format_cost(cost_estimate),
            "LLM call succeeded"
        );

        Ok(GenerationResult {
            text: raw.text,
            usage,
            provider,
            model: prepared.model,
            cost_estimate,
        })
    }

    /// Generates and extracts a JSON object conforming to `request.schema`.
    /// Requests without a system prompt get `JSON_ONLY_SYSTEM`.
    pub async fn generate_structured(
        &self,
        request: &GenerationRequest,
    ) -> Result<StructuredGeneration, LlmError> {
        let schema = request.schema.as_ref().ok_or_else(|| {
            LlmError::Configuration("structured generation requires a response schema".into())
        })?;
        let result = match request.system {
            Some(_) => self.generate(request).await?,
            None => {
                self.generate(&request.clone().with_system(prompts::JSON_ONLY_SYSTEM))
                    .await?
            }
        };
        let payload = structured::extract(&result.text, schema)?;
        Ok(StructuredGeneration { payload, result })
    }

    /// Structured generation deserialised into a caller type.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        request: &GenerationRequest,
    ) -> Result<(T, GenerationResult), LlmError> {
        let structured = self.generate_structured(request).await?;
        let value = serde_json::from_value(Value::Object(structured.payload))
            .map_err(|e| LlmError::SchemaValidation(e.to_string()))?;
        Ok((value, structured.result))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{mock_client, MockAdapter, MockReply};
    use super::*;

    #[test]
    fn test_classify_status_maps_auth_rate_limit_and_server_errors() {
        let body = r#"{"error": {"type": "authentication_error", "message": "invalid x-api-key"}}"#;
        match classify_status(ProviderId::Claude, 401, body) {
            LlmError::Authentication { message, .. } => assert_eq!(message, "invalid x-api-key"),
            other => panic!("expected Authentication, got {other:?}"),
        }
        assert_eq!(
            classify_status(ProviderId::OpenAi, 429, "slow down").kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify_status(ProviderId::Gemini, 503, "").kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            classify_status(ProviderId::Claude, 529, "overloaded").kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(
            classify_status(ProviderId::OpenAi, 400, "bad request").kind(),
            ErrorKind::Api
        );
    }

    #[test]
    fn test_transient_classification() {
        let provider = ProviderId::Claude;
        assert!(LlmError::Timeout { provider }.is_transient());
        assert!(LlmError::RateLimited {
            provider,
            message: String::new()
        }
        .is_transient());
        assert!(!LlmError::Authentication {
            provider,
            message: String::new()
        }
        .is_transient());
        assert!(!LlmError::SchemaValidation("x".into()).is_transient());
        assert!(!LlmError::UnsupportedProvider("x".into()).is_transient());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::UnparseableResponse).unwrap(),
            "\"unparseable_response\""
        );
    }

    #[test]
    fn test_approximate_tokens_rounds_up() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("abc"), 1);
        assert_eq!(approximate_tokens("abcdefgh"), 2);
        assert_eq!(approximate_tokens("abcdefghi"), 3);
    }

    #[test]
    fn test_request_temperature_is_clamped() {
        assert_eq!(GenerationRequest::new("p").with_temperature(1.7).temperature, Some(1.0));
        assert_eq!(GenerationRequest::new("p").with_temperature(-0.2).temperature, Some(0.0));
    }

    #[test]
    fn test_client_debug_shows_provider_and_model() {
        let client = mock_client(Arc::new(MockAdapter::new(ProviderId::Gemini, vec![])));
        let debug = format!("{client:?}");
        assert!(debug.contains("Gemini"));
        assert!(debug.contains(client.model()));
    }

    #[test]
    fn test_price_per_million_tokens_for_known_and_unknown_models() {
        let client = mock_client(Arc::new(MockAdapter::new(ProviderId::OpenAi, vec![])));
        assert_eq!(
            client.price_per_million_tokens("gpt-4o-mini").unwrap(),
            Rates::new(0.15, 0.6)
        );
        // unlisted models are billed at the provider default's rates
        assert_eq!(
            client.price_per_million_tokens("gpt-4.1-nano").unwrap(),
            Rates::new(0.25, 2.0)
        );
    }

    #[tokio::test]
    async fn test_generate_structured_defaults_to_json_only_system() {
        let adapter = Arc::new(MockAdapter::new(
            ProviderId::Claude,
            vec![MockReply::text(r#"{"title": "x"}"#)],
        ));
        let client = mock_client(adapter.clone());
        let request = GenerationRequest::new("p").with_schema(ResponseSchema::new().string("title"));

        client.generate_structured(&request).await.unwrap();
        assert_eq!(
            adapter.requests()[0].system.as_deref(),
            Some(prompts::JSON_ONLY_SYSTEM)
        );
    }

    #[tokio::test]
    async fn test_generate_prefers_backend_reported_usage() {
        let adapter = Arc::new(MockAdapter::new(
            ProviderId::Claude,
            vec![MockReply::text_with_usage("hello", 1_000, 500)],
        ));
        let client = mock_client(adapter.clone());

        let result = client.generate(&GenerationRequest::new("hi")).await.unwrap();
        assert_eq!(result.usage.input_tokens, 1_000);
        assert_eq!(result.usage.output_tokens, 500);
        assert!(!result.usage.estimated);
        // claude-sonnet-4: $3 in / $15 out per million
        let expected = 1_000.0 * 3.0 / 1_000_000.0 + 500.0 * 15.0 / 1_000_000.0;
        assert!((result.cost_estimate - expected).abs() < 1e-12);
        assert_eq!(result.model, "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn test_generate_estimates_usage_when_backend_omits_it() {
        let adapter = Arc::new(MockAdapter::new(
            ProviderId::Gemini,
            vec![MockReply::text("abcdefgh")],
        ));
        let client = mock_client(adapter);

        let result = client
            .generate(&GenerationRequest::new("abcd").with_system("abcd"))
            .await
            .unwrap();
        assert!(result.usage.estimated);
        assert_eq!(result.usage.input_tokens, 2);
        assert_eq!(result.usage.output_tokens, 2);
    }

    #[tokio::test]
    async fn test_generate_applies_defaults_and_model_override() {
        let adapter = Arc::new(MockAdapter::new(
            ProviderId::OpenAi,
            vec![MockReply::text("ok")],
        ));
        let client = mock_client(adapter.clone());

        let mut request = GenerationRequest::new("p").with_max_tokens(500);
        request.model = Some("gpt-4o".to_string());
        client.generate(&request).await.unwrap();

        let seen = adapter.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "gpt-4o");
        assert_eq!(seen[0].max_tokens, 500);
        assert!((seen[0].temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_generate_structured_requires_schema() {
        let adapter = Arc::new(MockAdapter::new(ProviderId::Claude, vec![]));
        let client = mock_client(adapter.clone());

        let err = client
            .generate_structured(&GenerationRequest::new("p"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(adapter.calls(), 0, "no provider call without a schema");
    }

    #[tokio::test]
    async fn test_generate_structured_rejects_unparseable_reply() {
        let adapter = Arc::new(MockAdapter::new(
            ProviderId::Claude,
            vec![MockReply::text("I'm sorry, I can't score this resume.")],
        ));
        let client = mock_client(adapter);
        let schema = ResponseSchema::new().number("match_score", 0.0, 100.0);

        let err = client
            .generate_structured(&GenerationRequest::new("p").with_schema(schema))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnparseableResponse);
    }

    #[tokio::test]
    async fn test_generate_json_deserializes_payload() {
        #[derive(Deserialize)]
        struct Score {
            match_score: f64,
        }

        let adapter = Arc::new(MockAdapter::new(
            ProviderId::Claude,
            vec![MockReply::text(r#"{"match_score": 140, "note": "extra"}"#)],
        ));
        let client = mock_client(adapter);
        let schema = ResponseSchema::new().number("match_score", 0.0, 100.0);

        let (score, _) = client
            .generate_json::<Score>(&GenerationRequest::new("p").with_schema(schema))
            .await
            .unwrap();
        assert_eq!(score.match_score, 100.0);
    }
}
