use serde_json::Value;
use sqlx::FromRow;

/// The LLM columns of `users`. Never serialised back to clients: `llm_api_keys`
/// holds the user's own provider credentials.
#[derive(Debug, Clone, FromRow)]
pub struct UserLlmSettingsRow {
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_keys: Option<Value>,
}
