//! Persistence for match records and lookup of per-user LLM settings.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::llm_client::UserLlmPreference;
use crate::matching::matcher::MatchOutcome;
use crate::models::match_record::MatchRow;
use crate::models::user::UserLlmSettingsRow;

/// Identifiers a match record is filed under.
#[derive(Debug, Clone, Copy)]
pub struct MatchKeys {
    pub user_id: Uuid,
    pub resume_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
}

/// Returns `None` when the user does not exist.
pub async fn fetch_user_preference(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserLlmPreference>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserLlmSettingsRow>(
        "SELECT llm_provider, llm_model, llm_api_keys FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(preference_from_row))
}

/// Non-string key values are ignored.
pub fn preference_from_row(row: UserLlmSettingsRow) -> UserLlmPreference {
    let api_keys: HashMap<String, String> = match row.llm_api_keys {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(provider, key)| match key {
                Value::String(key) if !key.trim().is_empty() => Some((provider, key)),
                _ => None,
            })
            .collect(),
        _ => HashMap::new(),
    };

    UserLlmPreference {
        provider: row.llm_provider,
        model: row.llm_model,
        api_keys,
    }
}

pub async fn insert_match(
    pool: &PgPool,
    keys: MatchKeys,
    outcome: &MatchOutcome,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO matches
            (id, user_id, resume_id, job_id, match_score, missing_skills, recommendations,
             explanation, ats_score, llm_provider, llm_model, tokens_used, cost_estimate)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(id)
    .bind(keys.user_id)
    .bind(keys.resume_id)
    .bind(keys.job_id)
    .bind(outcome.match_score)
    .bind(Json(&outcome.missing_skills))
    .bind(Json(&outcome.recommendations))
    .bind(&outcome.explanation)
    .bind(outcome.ats_score)
    .bind(outcome.provider.as_str())
    .bind(&outcome.model)
    .bind(i32::try_from(outcome.tokens_used).unwrap_or(i32::MAX))
    .bind(outcome.cost_estimate)
    .execute(pool)
    .await?;

    info!(
        match_id = %id,
        user_id = %keys.user_id,
        match_score = outcome.match_score,
        "Match persisted"
    );
    Ok(id)
}

pub async fn get_match(pool: &PgPool, match_id: Uuid) -> Result<Option<MatchRow>, sqlx::Error> {
    sqlx::query_as::<_, MatchRow>("SELECT * FROM matches WHERE id = $1")
        .bind(match_id)
        .fetch_optional(pool)
        .await
}
