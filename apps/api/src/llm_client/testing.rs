//! Test doubles for provider adapters. Compiled only under `cfg(test)`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    AdapterRequest, ErrorKind, GenerationDefaults, LlmAdapter, LlmClient, LlmError, PriceTable,
    ProviderId, RawResponse, RetryPolicy,
};

#[derive(Debug, Clone)]
pub enum MockReply {
    Text {
        text: String,
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
    },
    Delayed(Duration, String),
    Fail(ErrorKind),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text {
            text: text.into(),
            input_tokens: None,
            output_tokens: None,
        }
    }

    pub fn text_with_usage(text: impl Into<String>, input: u32, output: u32) -> Self {
        MockReply::Text {
            text: text.into(),
            input_tokens: Some(input),
            output_tokens: Some(output),
        }
    }

    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        MockReply::Delayed(delay, text.into())
    }

    pub fn rate_limited() -> Self {
        MockReply::Fail(ErrorKind::RateLimit)
    }

    pub fn auth_failure() -> Self {
        MockReply::Fail(ErrorKind::Authentication)
    }
}

fn error_for(provider: ProviderId, kind: ErrorKind) -> LlmError {
    let message = format!("mock {kind:?}");
    match kind {
        ErrorKind::Authentication => LlmError::Authentication { provider, message },
        ErrorKind::RateLimit => LlmError::RateLimited { provider, message },
        ErrorKind::Timeout => LlmError::Timeout { provider },
        ErrorKind::Unavailable => LlmError::Unavailable {
            provider,
            status: 503,
            message,
        },
        ErrorKind::Network => LlmError::Network { provider, message },
        ErrorKind::Api => LlmError::Api {
            provider,
            status: 400,
            message,
        },
        ErrorKind::MalformedResponse => LlmError::MalformedResponse { provider, message },
        ErrorKind::UnparseableResponse => LlmError::UnparseableResponse(message),
        ErrorKind::SchemaValidation => LlmError::SchemaValidation(message),
        ErrorKind::UnsupportedProvider => LlmError::UnsupportedProvider(message),
        ErrorKind::Configuration => LlmError::Configuration(message),
    }
}

type Responder = Box<dyn Fn(&AdapterRequest) -> MockReply + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<MockReply>>),
    Responder(Responder),
}

/// Scripted adapter: replays queued replies in order, or answers via a closure.
/// Counts calls and records every request it sees.
pub struct MockAdapter {
    provider: ProviderId,
    script: Script,
    calls: AtomicU32,
    requests: Mutex<Vec<AdapterRequest>>,
}

impl MockAdapter {
    pub fn new(provider: ProviderId, replies: Vec<MockReply>) -> Self {
        Self {
            provider,
            script: Script::Queue(Mutex::new(replies.into())),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder(
        provider: ProviderId,
        responder: impl Fn(&AdapterRequest) -> MockReply + Send + Sync + 'static,
    ) -> Self {
        Self {
            provider,
            script: Script::Responder(Box::new(responder)),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AdapterRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmAdapter for MockAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn generate_text(&self, request: &AdapterRequest) -> Result<RawResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = match &self.script {
            Script::Queue(queue) => queue.lock().unwrap().pop_front(),
            Script::Responder(responder) => Some(responder(request)),
        };

        match reply {
            Some(MockReply::Text {
                text,
                input_tokens,
                output_tokens,
            }) => Ok(RawResponse {
                text,
                input_tokens,
                output_tokens,
            }),
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(RawResponse {
                    text,
                    ..Default::default()
                })
            }
            Some(MockReply::Fail(kind)) => Err(error_for(self.provider, kind)),
            None => Err(LlmError::MalformedResponse {
                provider: self.provider,
                message: "mock script exhausted".into(),
            }),
        }
    }
}

/// Client over a mock adapter with the built-in price table and default policy.
pub fn mock_client(adapter: Arc<MockAdapter>) -> LlmClient {
    let model = adapter.default_model().to_string();
    LlmClient::new(
        adapter,
        model,
        Arc::new(PriceTable::builtin()),
        RetryPolicy::default(),
        GenerationDefaults::default(),
    )
}
