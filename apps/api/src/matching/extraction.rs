//! Structured extraction from unstructured resume / job text.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::llm_client::prompts::{render, with_response_shape};
use crate::llm_client::{
    FieldKind, GenerationRequest, GenerationResult, LlmClient, LlmError, ResponseSchema,
    StructuredGeneration,
};
use crate::matching::prompts::{
    render_extraction_prompt, DEFAULT_EXTRACTION_INSTRUCTION, MATCH_SYSTEM,
    RESUME_ANALYSIS_PROMPT, SKILL_EXTRACTION_PROMPT,
};

const EXTRACTION_MAX_TOKENS: u32 = 2000;
const EXTRACTION_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceSummary {
    #[serde(default)]
    pub total_years: Option<f64>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResume {
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: ExperienceSummary,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSkills {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub preferred: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceLevel {
    #[serde(default)]
    pub minimum_years: Option<f64>,
    #[serde(default)]
    pub preferred_years: Option<f64>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSkills {
    pub technical_skills: TechnicalSkills,
    #[serde(default)]
    pub soft_skills: Vec<String>,
    #[serde(default)]
    pub domain_knowledge: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub experience_level: ExperienceLevel,
}

pub fn resume_schema() -> ResponseSchema {
    ResponseSchema::new()
        .string_array("skills")
        .optional("experience", FieldKind::Object)
        .optional("education", FieldKind::StringArray)
        .optional("keywords", FieldKind::StringArray)
        .optional("summary", FieldKind::String)
}

pub fn job_skills_schema() -> ResponseSchema {
    ResponseSchema::new()
        .object("technical_skills")
        .optional("soft_skills", FieldKind::StringArray)
        .optional("domain_knowledge", FieldKind::StringArray)
        .optional("certifications", FieldKind::StringArray)
        .optional("experience_level", FieldKind::Object)
}

/// Extracts a mapping conforming to `schema` from `text`. The reply is either a
/// schema-valid object or an error; never a defaulted payload.
pub async fn extract_structured(
    llm: &LlmClient,
    text: &str,
    schema: &ResponseSchema,
    instruction: Option<&str>,
) -> Result<StructuredGeneration, LlmError> {
    if schema.is_empty() {
        return Err(LlmError::Configuration(
            "extraction schema must declare at least one field".to_string(),
        ));
    }

    let instruction = instruction
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .unwrap_or(DEFAULT_EXTRACTION_INSTRUCTION);
    let prompt = render_extraction_prompt(instruction, text);

    let request = GenerationRequest::new(with_response_shape(&prompt, &schema.describe()))
        .with_system(MATCH_SYSTEM)
        .with_schema(schema.clone())
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);

    let structured = llm.generate_structured(&request).await?;
    info!(
        fields = structured.payload.len(),
        provider = %structured.result.provider,
        "Structured extraction completed"
    );
    Ok(structured)
}

pub async fn parse_resume(
    llm: &LlmClient,
    resume_text: &str,
) -> Result<(ParsedResume, GenerationResult), LlmError> {
    info!("Analyzing resume with LLM");
    let prompt = render(RESUME_ANALYSIS_PROMPT, &[("resume_text", resume_text)]);
    let request = GenerationRequest::new(prompt)
        .with_system(MATCH_SYSTEM)
        .with_schema(resume_schema())
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);
    llm.generate_json(&request).await
}

pub async fn extract_job_skills(
    llm: &LlmClient,
    job_text: &str,
) -> Result<(JobSkills, GenerationResult), LlmError> {
    info!("Extracting skills from job description");
    let prompt = render(SKILL_EXTRACTION_PROMPT, &[("job_text", job_text)]);
    let request = GenerationRequest::new(prompt)
        .with_system(MATCH_SYSTEM)
        .with_schema(job_skills_schema())
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);
    llm.generate_json(&request).await
}
