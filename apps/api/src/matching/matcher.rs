//! Matcher: scores one resume against one job description through the LLM and
//! reshapes the reply into a `MatchOutcome`.
//!
//! The score is produced by the model; this module only builds the prompt, checks
//! the reply against the expected shape and attaches usage, cost and (optionally)
//! the deterministic ATS report.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::LlmConfig;
use crate::llm_client::{
    FieldKind, GenerationRequest, LlmClient, LlmError, ProviderId, ResponseSchema, TokenUsage,
};
use crate::matching::ats::{AtsAnalyzer, AtsReport};
use crate::matching::prompts::{render_match_prompt, MATCH_SYSTEM};

pub const DETAILED_MAX_TOKENS: u32 = 3000;
pub const QUICK_MAX_TOKENS: u32 = 500;
/// Low temperature keeps scores stable across repeated runs.
pub const MATCH_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    pub detailed: bool,
    pub include_ats: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            detailed: true,
            include_ats: false,
        }
    }
}

/// Models return either plain strings or `{action, priority, impact_estimate, reason}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recommendation {
    Structured {
        action: String,
        #[serde(default)]
        priority: Option<String>,
        #[serde(default)]
        impact_estimate: Option<f64>,
        #[serde(default)]
        reason: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    /// Always within [0, 100].
    pub match_score: f64,
    pub missing_skills: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub explanation: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ats_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ats: Option<AtsReport>,
    pub tokens_used: u32,
    pub usage: TokenUsage,
    /// USD, full precision.
    pub cost_estimate: f64,
    pub provider: ProviderId,
    pub model: String,
    pub detailed: bool,
}

#[derive(Debug, Deserialize)]
struct DetailedReply {
    match_score: f64,
    missing_skills: Vec<String>,
    recommendations: Vec<Recommendation>,
    explanation: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuickReply {
    match_score: f64,
    #[serde(default)]
    top_3_missing_skills: Vec<String>,
    #[serde(default)]
    one_sentence_summary: String,
}

pub fn detailed_schema() -> ResponseSchema {
    ResponseSchema::new()
        .number("match_score", 0.0, 100.0)
        .string_array("missing_skills")
        .array("recommendations")
        .string("explanation")
        .optional("strengths", FieldKind::StringArray)
        .optional("weaknesses", FieldKind::StringArray)
}

pub fn quick_schema() -> ResponseSchema {
    ResponseSchema::new()
        .number("match_score", 0.0, 100.0)
        .optional("top_3_missing_skills", FieldKind::StringArray)
        .optional("one_sentence_summary", FieldKind::String)
}

pub struct Matcher {
    ats: AtsAnalyzer,
    detailed_timeout: Duration,
    quick_timeout: Duration,
}

impl Matcher {
    pub fn new(ats: AtsAnalyzer, detailed_timeout: Duration, quick_timeout: Duration) -> Self {
        Self {
            ats,
            detailed_timeout,
            quick_timeout,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, regex::Error> {
        Ok(Self::new(
            AtsAnalyzer::new()?,
            config.detailed_timeout,
            config.quick_timeout,
        ))
    }

    /// Scores `resume_text` against `job_text`. Provider failures propagate unchanged;
    /// there is no heuristic fallback score.
    pub async fn match_resume(
        &self,
        llm: &LlmClient,
        resume_text: &str,
        job_text: &str,
        options: MatchOptions,
    ) -> Result<MatchOutcome, LlmError> {
        info!(
            provider = %llm.provider(),
            detailed = options.detailed,
            resume_length = resume_text.len(),
            job_length = job_text.len(),
            "Starting job match"
        );

        let (schema, max_tokens, timeout) = if options.detailed {
            (detailed_schema(), DETAILED_MAX_TOKENS, self.detailed_timeout)
        } else {
            (quick_schema(), QUICK_MAX_TOKENS, self.quick_timeout)
        };

        let request = GenerationRequest::new(render_match_prompt(
            options.detailed,
            resume_text,
            job_text,
        ))
        .with_system(MATCH_SYSTEM)
        .with_schema(schema)
        .with_temperature(MATCH_TEMPERATURE)
        .with_max_tokens(max_tokens)
        .with_timeout(timeout);

        let (reply, result) = if options.detailed {
            llm.generate_json::<DetailedReply>(&request).await?
        } else {
            let (quick, result) = llm.generate_json::<QuickReply>(&request).await?;
            (quick.into_detailed(), result)
        };

        let ats = options
            .include_ats
            .then(|| self.ats.analyze(resume_text, job_text));

        info!(
            match_score = reply.match_score,
            missing_skills = reply.missing_skills.len(),
            "Job match analysis completed"
        );

        Ok(MatchOutcome {
            match_score: reply.match_score,
            missing_skills: reply.missing_skills,
            recommendations: reply.recommendations,
            explanation: reply.explanation,
            strengths: reply.strengths,
            weaknesses: reply.weaknesses,
            ats_score: ats.as_ref().map(|a| a.ats_score),
            ats,
            tokens_used: result.usage.total(),
            usage: result.usage,
            cost_estimate: result.cost_estimate,
            provider: result.provider,
            model: result.model,
            detailed: options.detailed,
        })
    }
}

impl QuickReply {
    fn into_detailed(self) -> DetailedReply {
        DetailedReply {
            match_score: self.match_score,
            missing_skills: self.top_3_missing_skills,
            recommendations: Vec::new(),
            explanation: self.one_sentence_summary,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        }
    }
}
