use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resume_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub match_score: f64,
    pub missing_skills: Value,
    pub recommendations: Value,
    pub explanation: Option<String>,
    pub ats_score: Option<f64>,
    pub llm_provider: String,
    pub llm_model: String,
    pub tokens_used: i32,
    pub cost_estimate: f64,
    pub created_at: DateTime<Utc>,
}
