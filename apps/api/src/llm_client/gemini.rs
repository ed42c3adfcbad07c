//! Google Gemini `generateContent` adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    classify_status, transport_error, AdapterRequest, LlmAdapter, LlmError, ProviderId,
    RawResponse,
};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Clone)]
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, GEMINI_API_URL)
    }

    pub fn with_base_url(client: Client, api_key: String, base_url: &str) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LlmAdapter for GeminiAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn generate_text(&self, request: &AdapterRequest) -> Result<RawResponse, LlmError> {
        let provider = self.provider();
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(provider, e))?;

        if !status.is_success() {
            return Err(classify_status(provider, status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
                provider,
                message: format!("unexpected response body: {e}"),
            })?;

        // Safety-blocked prompts come back 200 with no candidate text.
        let reply = parsed.text().ok_or_else(|| LlmError::MalformedResponse {
            provider,
            message: "response contained no candidate text".to_string(),
        })?;

        debug!(model = %request.model, "Gemini reply received");

        let usage = parsed.usage_metadata.as_ref();
        Ok(RawResponse {
            text: reply,
            input_tokens: usage.and_then(|u| u.prompt_token_count),
            output_tokens: usage.and_then(|u| u.candidates_token_count),
        })
    }
}
