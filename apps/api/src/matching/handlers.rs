//! Axum route handlers for the Matching API.

use std::future::Future;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::pricing::format_cost;
use crate::llm_client::registry::ProviderInfo;
use crate::llm_client::{
    GenerationResult, LlmClient, ProviderId, Rates, ResponseSchema, TokenUsage,
};
use crate::matching::batch::{batch_match, BatchItem, BatchOutcome, MatchPair};
use crate::matching::extraction::{
    extract_job_skills, extract_structured, parse_resume, JobSkills, ParsedResume,
};
use crate::matching::matcher::{MatchOptions, MatchOutcome};
use crate::matching::store::{fetch_user_preference, get_match, insert_match, MatchKeys};
use crate::models::match_record::MatchRow;
use crate::state::AppState;

pub const MAX_BATCH_ITEMS: usize = 50;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub user_id: Option<Uuid>,
    pub resume_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub resume_text: String,
    pub job_text: String,
    #[serde(default = "default_true")]
    pub detailed: bool,
    #[serde(default)]
    pub include_ats: bool,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    /// Set when the match was persisted (requires `user_id`).
    pub match_id: Option<Uuid>,
    pub cost_display: String,
    /// Per-million-token rates the cost was computed with.
    pub rates: Option<Rates>,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

#[derive(Debug, Deserialize)]
pub struct BatchResume {
    pub resume_id: Option<Uuid>,
    pub resume_text: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    pub user_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub job_text: String,
    pub resumes: Vec<BatchResume>,
    #[serde(default)]
    pub detailed: bool,
    #[serde(default)]
    pub include_ats: bool,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PersistedMatch {
    pub index: usize,
    pub match_id: Uuid,
}

/// A scored item whose match record could not be written.
#[derive(Debug, Serialize)]
pub struct PersistFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchMatchResponse {
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    pub persisted: Vec<PersistedMatch>,
    pub persist_failures: Vec<PersistFailure>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub user_id: Option<Uuid>,
    pub text: String,
    pub schema: ResponseSchema,
    pub instruction: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextExtractRequest {
    pub user_id: Option<Uuid>,
    pub text: String,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}

/// Provider, model, token usage and cost attached to every extraction response.
#[derive(Debug, Serialize)]
pub struct CallSummary {
    pub provider: ProviderId,
    pub model: String,
    pub usage: TokenUsage,
    pub cost_estimate: f64,
    pub cost_display: String,
    pub rates: Option<Rates>,
}

impl CallSummary {
    fn new(llm: &LlmClient, result: GenerationResult) -> Self {
        Self {
            rates: llm.price_per_million_tokens(&result.model).ok(),
            provider: result.provider,
            model: result.model,
            usage: result.usage,
            cost_display: format_cost(result.cost_estimate),
            cost_estimate: result.cost_estimate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub payload: Map<String, Value>,
    #[serde(flatten)]
    pub call: CallSummary,
}

#[derive(Debug, Serialize)]
pub struct ResumeExtractResponse {
    pub resume: ParsedResume,
    #[serde(flatten)]
    pub call: CallSummary,
}

#[derive(Debug, Serialize)]
pub struct JobExtractResponse {
    pub skills: JobSkills,
    #[serde(flatten)]
    pub call: CallSummary,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub default_provider: ProviderId,
    pub providers: Vec<ProviderInfo>,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Resolves the LLM client for a request: explicit override, then the user's
/// stored preference, then the system default.
async fn resolve_llm(
    state: &AppState,
    user_id: Option<Uuid>,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<LlmClient, AppError> {
    let preference = match user_id {
        Some(id) => Some(
            fetch_user_preference(&state.db, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?,
        ),
        None => None,
    };

    Ok(state.registry.resolve(provider, model, preference.as_ref())?)
}

/// Writes each scored batch item independently. A failed insert is reported for
/// that item and never discards the other results.
async fn persist_results<F, Fut>(
    results: &[BatchItem],
    keys_for: impl Fn(usize) -> MatchKeys,
    mut insert: F,
) -> (Vec<PersistedMatch>, Vec<PersistFailure>)
where
    F: FnMut(MatchKeys, MatchOutcome) -> Fut,
    Fut: Future<Output = Result<Uuid, sqlx::Error>>,
{
    let mut persisted = Vec::new();
    let mut failures = Vec::new();

    for item in results {
        match insert(keys_for(item.index), item.outcome.clone()).await {
            Ok(match_id) => persisted.push(PersistedMatch {
                index: item.index,
                match_id,
            }),
            Err(e) => {
                error!(index = item.index, "Failed to persist batch match: {e}");
                failures.push(PersistFailure {
                    index: item.index,
                    message: "match record could not be saved".to_string(),
                });
            }
        }
    }

    (persisted, failures)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/providers
///
/// Registered providers with their default model and list price.
pub async fn handle_list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        default_provider: state.registry.default_provider(),
        providers: state.registry.providers(),
    })
}

/// POST /api/v1/matches
///
/// Scores one resume against one job. Persisted when `user_id` is supplied.
pub async fn handle_match(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    require_text("resume_text", &request.resume_text)?;
    require_text("job_text", &request.job_text)?;

    let llm = resolve_llm(
        &state,
        request.user_id,
        request.llm_provider.as_deref(),
        request.llm_model.as_deref(),
    )
    .await?;

    let options = MatchOptions {
        detailed: request.detailed,
        include_ats: request.include_ats,
    };
    let outcome = state
        .matcher
        .match_resume(&llm, &request.resume_text, &request.job_text, options)
        .await?;

    let match_id = match request.user_id {
        Some(user_id) => {
            let keys = MatchKeys {
                user_id,
                resume_id: request.resume_id,
                job_id: request.job_id,
            };
            Some(insert_match(&state.db, keys, &outcome).await?)
        }
        None => None,
    };

    Ok(Json(MatchResponse {
        match_id,
        cost_display: format_cost(outcome.cost_estimate),
        rates: llm.price_per_million_tokens(&outcome.model).ok(),
        outcome,
    }))
}

/// POST /api/v1/matches/batch
///
/// Many resumes against one job. Always returns partial results: provider failures
/// are listed per item and never fail the whole request.
pub async fn handle_batch_match(
    State(state): State<AppState>,
    Json(request): Json<BatchMatchRequest>,
) -> Result<Json<BatchMatchResponse>, AppError> {
    require_text("job_text", &request.job_text)?;
    if request.resumes.is_empty() {
        return Err(AppError::Validation("resumes cannot be empty".to_string()));
    }
    if request.resumes.len() > MAX_BATCH_ITEMS {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH_ITEMS} resumes per batch"
        )));
    }
    for (i, resume) in request.resumes.iter().enumerate() {
        require_text(&format!("resumes[{i}].resume_text"), &resume.resume_text)?;
    }

    let llm = resolve_llm(
        &state,
        request.user_id,
        request.llm_provider.as_deref(),
        request.llm_model.as_deref(),
    )
    .await?;

    let pairs: Vec<MatchPair> = request
        .resumes
        .iter()
        .enumerate()
        .map(|(i, resume)| MatchPair {
            label: resume
                .resume_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| format!("resume-{i}")),
            resume_text: resume.resume_text.clone(),
            job_text: request.job_text.clone(),
        })
        .collect();

    let options = MatchOptions {
        detailed: request.detailed,
        include_ats: request.include_ats,
    };
    let outcome = batch_match(
        &state.matcher,
        &llm,
        &pairs,
        options,
        state.config.llm.batch_concurrency,
    )
    .await;

    let (persisted, persist_failures) = match request.user_id {
        Some(user_id) => {
            let keys_for = |index: usize| MatchKeys {
                user_id,
                resume_id: request.resumes[index].resume_id,
                job_id: request.job_id,
            };
            let db = state.db.clone();
            persist_results(&outcome.results, keys_for, move |keys, item| {
                let db = db.clone();
                async move { insert_match(&db, keys, &item).await }
            })
            .await
        }
        None => (Vec::new(), Vec::new()),
    };

    Ok(Json(BatchMatchResponse {
        outcome,
        persisted,
        persist_failures,
    }))
}

/// GET /api/v1/matches/:id
pub async fn handle_get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchRow>, AppError> {
    let row = get_match(&state.db, match_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Match {match_id} not found")))?;
    Ok(Json(row))
}

/// POST /api/v1/extract
///
/// Extracts a caller-defined set of fields from free text.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    require_text("text", &request.text)?;
    if request.schema.is_empty() {
        return Err(AppError::Validation(
            "schema must declare at least one field".to_string(),
        ));
    }

    let llm = resolve_llm(
        &state,
        request.user_id,
        request.llm_provider.as_deref(),
        request.llm_model.as_deref(),
    )
    .await?;

    let structured = extract_structured(
        &llm,
        &request.text,
        &request.schema,
        request.instruction.as_deref(),
    )
    .await?;

    Ok(Json(ExtractResponse {
        payload: structured.payload,
        call: CallSummary::new(&llm, structured.result),
    }))
}

/// POST /api/v1/extract/resume
pub async fn handle_extract_resume(
    State(state): State<AppState>,
    Json(request): Json<TextExtractRequest>,
) -> Result<Json<ResumeExtractResponse>, AppError> {
    require_text("text", &request.text)?;
    let llm = resolve_llm(
        &state,
        request.user_id,
        request.llm_provider.as_deref(),
        request.llm_model.as_deref(),
    )
    .await?;

    let (resume, result) = parse_resume(&llm, &request.text).await?;
    Ok(Json(ResumeExtractResponse {
        resume,
        call: CallSummary::new(&llm, result),
    }))
}

/// POST /api/v1/extract/job
pub async fn handle_extract_job(
    State(state): State<AppState>,
    Json(request): Json<TextExtractRequest>,
) -> Result<Json<JobExtractResponse>, AppError> {
    require_text("text", &request.text)?;
    let llm = resolve_llm(
        &state,
        request.user_id,
        request.llm_provider.as_deref(),
        request.llm_model.as_deref(),
    )
    .await?;

    let (skills, result) = extract_job_skills(&llm, &request.text).await?;
    Ok(Json(JobExtractResponse {
        skills,
        call: CallSummary::new(&llm, result),
    }))
}
