//! Anthropic Messages API adapter (`claude`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    classify_status, transport_error, AdapterRequest, LlmAdapter, LlmError, ProviderId,
    RawResponse,
};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    /// Concatenates every text block; tool-use and other block types are skipped.
    fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.concat())
        }
    }
}

#[derive(Clone)]
pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, ANTHROPIC_API_URL)
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
impl LlmAdapter for AnthropicAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn generate_text(&self, request: &AdapterRequest) -> Result<RawResponse, LlmError> {
        let provider = self.provider();
        let body = AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
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

        let parsed: AnthropicResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
                provider,
                message: format!("unexpected response body: {e}"),
            })?;

        let reply = parsed.text().ok_or_else(|| LlmError::MalformedResponse {
            provider,
            message: "response contained no text content".to_string(),
        })?;

        debug!(model = %request.model, "Anthropic reply received");

        Ok(RawResponse {
            text: reply,
            input_tokens: parsed.usage.as_ref().map(|u| u.input_tokens),
            output_tokens: parsed.usage.as_ref().map(|u| u.output_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::ErrorKind;

    fn request() -> AdapterRequest {
        AdapterRequest {
            prompt: "Score this resume".to_string(),
            system: Some("JSON only".to_string()),
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.2,
            max_tokens: 3000,
        }
    }

    #[tokio::test]
    async fn test_generate_text_sends_messages_request_and_reads_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "claude-sonnet-4-20250514",
                "max_tokens": 3000,
                "system": "JSON only",
                "messages": [{"role": "user", "content": "Score this resume"}]
            })))
            .with_status(200)
            .with_body(
                r#"{"content": [{"type": "text", "text": "{\"match_score\": 80}"}],
                    "usage": {"input_tokens": 120, "output_tokens": 15}}"#,
            )
            .create_async()
            .await;

        let adapter =
            AnthropicAdapter::with_base_url(Client::new(), "sk-ant-test".into(), &server.url());
        let raw = adapter.generate_text(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(raw.text, r#"{"match_score": 80}"#);
        assert_eq!(raw.input_tokens, Some(120));
        assert_eq!(raw.output_tokens, Some(15));
    }

    #[tokio::test]
    async fn test_invalid_key_maps_to_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"type": "error", "error": {"type": "authentication_error", "message": "invalid x-api-key"}}"#)
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_base_url(Client::new(), "bad".into(), &server.url());
        let err = adapter.generate_text(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_body(r#"{"error": {"message": "rate limited"}}"#)
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_base_url(Client::new(), "k".into(), &server.url());
        let err = adapter.generate_text(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_reply_without_text_block_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content": [], "usage": {"input_tokens": 1, "output_tokens": 0}}"#)
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_base_url(Client::new(), "k".into(), &server.url());
        let err = adapter.generate_text(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_base_url(Client::new(), "k".into(), &server.url());
        let err = adapter.generate_text(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }
}
