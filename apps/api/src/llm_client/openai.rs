//! OpenAI Chat Completions adapter. Also serves any OpenAI-compatible endpoint
//! (vLLM, Ollama, LM Studio, hosted gateways) via a custom base URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    classify_status, transport_error, AdapterRequest, LlmAdapter, LlmError, ProviderId,
    RawResponse,
};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Reasoning-era models reject `max_tokens` and take `max_completion_tokens` instead.
pub fn uses_completion_tokens(model: &str) -> bool {
    let model = model.to_lowercase();
    ["gpt-5", "o1-", "o3-"].iter().any(|p| model.contains(p))
}

#[derive(Clone)]
pub struct OpenAiAdapter {
    provider: ProviderId,
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn openai(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, Some(api_key), OPENAI_API_URL)
    }

    /// Any endpoint speaking the OpenAI protocol. Local deployments often need no key.
    pub fn compatible(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            provider: ProviderId::OpenAiCompatible,
            ..Self::with_base_url(client, api_key, base_url)
        }
    }

    pub fn with_base_url(client: Client, api_key: Option<String>, base_url: &str) -> Self {
        Self {
            provider: ProviderId::OpenAi,
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn generate_text(&self, request: &AdapterRequest) -> Result<RawResponse, LlmError> {
        let provider = self.provider;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let completion_tokens =
            provider == ProviderId::OpenAi && uses_completion_tokens(&request.model);
        let body = ChatCompletionRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: (!completion_tokens).then_some(request.max_tokens),
            max_completion_tokens: completion_tokens.then_some(request.max_tokens),
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
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

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
                provider,
                message: format!("unexpected response body: {e}"),
            })?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse {
                provider,
                message: "response contained no message content".to_string(),
            })?;

        debug!(provider = %provider, model = %request.model, "Chat completion received");

        Ok(RawResponse {
            text: reply,
            input_tokens: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
            output_tokens: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }
}
