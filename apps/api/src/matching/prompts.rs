// Prompt templates for the matching pipeline.
// Placeholders are substituted in one pass by `llm_client::prompts::render`.

use crate::llm_client::prompts::render;

/// System prompt shared by every matching and extraction call.
pub const MATCH_SYSTEM: &str = "You are an expert recruiter and career advisor. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Detailed match. Replace `{resume_text}` and `{job_text}`.
pub const DETAILED_MATCH_PROMPT: &str = r#"Analyze how well this resume matches the job description.

Resume:
{resume_text}

Job Description:
{job_text}

Provide a comprehensive matching analysis:

1. Match Score (0-100), an overall compatibility score where:
   - 90-100: Exceptional match, candidate exceeds requirements
   - 75-89: Strong match, candidate meets most requirements
   - 60-74: Good match, candidate meets core requirements
   - 40-59: Partial match, relevant experience but gaps exist
   - 0-39: Poor match, significant gaps in qualifications

2. Missing Skills: specific skills, qualifications or experience named in the job
   description that are not evident in the resume.

3. Recommendations: 5-7 specific, actionable steps to improve fit for this role. For each:
   the action, a priority (High/Medium/Low), the estimated impact on the match score
   (+5 to +20 points) and the reason it helps.

4. Explanation: 2-3 paragraphs covering why you gave this score, what the candidate does
   well, what they need to improve and how competitive they would be.

5. Strengths: 3-5 key strengths for this role.

6. Weaknesses: 3-5 key gaps that might hurt the candidate's chances.

Return a JSON object with this EXACT shape:
{
    "match_score": <number 0-100>,
    "missing_skills": ["skill1", "skill2"],
    "recommendations": [
        {
            "action": "Specific action to take",
            "priority": "High|Medium|Low",
            "impact_estimate": <number 5-20>,
            "reason": "Why this will help"
        }
    ],
    "explanation": "Detailed explanation text",
    "strengths": ["strength1", "strength2"],
    "weaknesses": ["weakness1", "weakness2"]
}

Be honest and objective. Focus on factual analysis rather than encouragement."#;

/// Quick match. Replace `{resume_text}` and `{job_text}`.
pub const QUICK_MATCH_PROMPT: &str = r#"Quick analysis: score this resume (0-100) against the job description.

Resume: {resume_text}

Job: {job_text}

Respond with ONLY a JSON object:
{
    "match_score": <number>,
    "top_3_missing_skills": ["skill1", "skill2", "skill3"],
    "one_sentence_summary": "Brief summary of the match"
}"#;

/// Resume analysis. Replace `{resume_text}`.
pub const RESUME_ANALYSIS_PROMPT: &str = r#"Analyze the following resume and extract key information.

Resume:
{resume_text}

Extract:
1. Skills: all technical skills, soft skills and competencies
2. Experience: total years and key roles
3. Education: educational qualifications
4. Keywords: terms relevant for job matching
5. Summary: a brief professional summary (2-3 sentences)

Return a JSON object with this EXACT shape:
{
    "skills": ["skill1", "skill2"],
    "experience": {
        "total_years": <number>,
        "roles": ["role1", "role2"]
    },
    "education": ["degree1", "degree2"],
    "keywords": ["keyword1", "keyword2"],
    "summary": "Professional summary text"
}"#;

/// Job skill extraction. Replace `{job_text}`.
pub const SKILL_EXTRACTION_PROMPT: &str = r#"Extract all required and preferred skills from this job description.

Job Description:
{job_text}

Categorize into:
1. Technical Skills: programming languages, frameworks, tools, technologies
2. Soft Skills: communication, leadership, teamwork, etc.
3. Domain Knowledge: industry-specific knowledge and expertise
4. Certifications: required or preferred certifications
5. Experience Level: years of experience required

Return a JSON object with this EXACT shape:
{
    "technical_skills": {
        "required": ["skill1", "skill2"],
        "preferred": ["skill3", "skill4"]
    },
    "soft_skills": ["skill1", "skill2"],
    "domain_knowledge": ["knowledge1", "knowledge2"],
    "certifications": ["cert1", "cert2"],
    "experience_level": {
        "minimum_years": <number>,
        "preferred_years": <number>,
        "level": "entry|mid|senior"
    }
}"#;

/// Caller-defined extraction. Replace `{instruction}` and `{text}`; the schema
/// skeleton is appended with `llm_client::prompts::with_response_shape`.
pub const GENERIC_EXTRACTION_PROMPT: &str = r#"{instruction}

Text:
{text}"#;

pub const DEFAULT_EXTRACTION_INSTRUCTION: &str =
    "Extract the requested fields from the following text. Use only information present in the text.";

pub fn render_match_prompt(detailed: bool, resume_text: &str, job_text: &str) -> String {
    let template = if detailed {
        DETAILED_MATCH_PROMPT
    } else {
        QUICK_MATCH_PROMPT
    };
    render(
        template,
        &[("resume_text", resume_text), ("job_text", job_text)],
    )
}

pub fn render_extraction_prompt(instruction: &str, text: &str) -> String {
    render(
        GENERIC_EXTRACTION_PROMPT,
        &[("instruction", instruction), ("text", text)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_match_prompt_substitutes_both_texts() {
        let prompt = render_match_prompt(true, "5 years Python", "Needs Kubernetes");
        assert!(prompt.contains("5 years Python"));
        assert!(prompt.contains("Needs Kubernetes"));
        assert!(!prompt.contains("{resume_text}"));
        assert!(!prompt.contains("{job_text}"));
        assert!(prompt.contains("\"recommendations\""));
    }

    #[test]
    fn test_placeholder_inside_resume_is_not_expanded() {
        let prompt = render_match_prompt(true, "see {job_text}", "Needs Kubernetes");
        assert!(prompt.contains("see {job_text}"));
        assert_eq!(prompt.matches("Needs Kubernetes").count(), 1);
    }

    #[test]
    fn test_extraction_instruction_with_text_placeholder_inserts_text_once() {
        let prompt = render_extraction_prompt("Summarise {text} briefly.", "Staff Engineer, Berlin");
        assert!(prompt.starts_with("Summarise {text} briefly."));
        assert_eq!(prompt.matches("Staff Engineer, Berlin").count(), 1);
    }

    #[test]
    fn test_quick_prompt_asks_for_short_shape() {
        let prompt = render_match_prompt(false, "r", "j");
        assert!(prompt.contains("top_3_missing_skills"));
        assert!(!prompt.contains("strengths"));
    }
}
