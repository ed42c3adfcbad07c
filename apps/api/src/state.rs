use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::ProviderRegistry;
use crate::matching::matcher::Matcher;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Built once at startup; handlers resolve a client per request.
    pub registry: Arc<ProviderRegistry>,
    /// Prompting, timeouts and the ATS analyzer for match requests.
    pub matcher: Arc<Matcher>,
    pub config: Config,
}
