//! ATS (applicant tracking system) compatibility heuristics.
//!
//! Deterministic and LLM-free. Weighted score:
//! keywords 50%, formatting 25%, sections 15%, contact details 10%.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "have", "this", "we", "you",
    "your", "our", "their", "they", "can", "been", "had", "but", "not", "or",
];

const MIN_KEYWORD_LEN: usize = 3;
const MAX_KEYWORDS: usize = 100;
const IMPORTANT_JOB_KEYWORDS: usize = 50;
const MISSING_CANDIDATES: usize = 30;
const REPORTED_KEYWORDS: usize = 20;
const KEYWORD_MATCH_TARGET: f64 = 60.0;

const SECTION_GROUPS: &[(&str, &[&str])] = &[
    (
        "experience",
        &["experience", "work experience", "employment history", "professional experience"],
    ),
    ("education", &["education", "academic background", "qualifications"]),
    ("skills", &["skills", "technical skills", "core competencies", "expertise"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsCategory {
    Keywords,
    Formatting,
    Sections,
    Contact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsRecommendation {
    pub category: AtsCategory,
    pub priority: Priority,
    pub issue: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordAnalysis {
    pub total_keywords: usize,
    pub matched_count: usize,
    pub match_percentage: f64,
    pub matched_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsReport {
    /// 0-100, one decimal place.
    pub ats_score: f64,
    pub keyword_analysis: KeywordAnalysis,
    pub formatting_score: f64,
    pub section_score: f64,
    pub contact_score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<AtsRecommendation>,
}

pub struct AtsAnalyzer {
    phrase_patterns: Vec<Regex>,
    word: Regex,
    skill_patterns: Vec<Regex>,
    table: Regex,
    special_bullet: Regex,
    email: Regex,
    phone_patterns: Vec<Regex>,
}

impl AtsAnalyzer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            phrase_patterns: compile(&[
                r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2}\b",
                r"\b\w+\.js\b",
                r"\b\w+\.py\b",
                r"\b[A-Z]{2,}\b",
            ])?,
            word: Regex::new(r"\b\w+\b")?,
            skill_patterns: compile(&[
                r"(?i)\b(python|java|javascript|typescript|ruby|go|rust|swift|kotlin|php|scala)\b",
                r"(?i)(?:^|\W)(c\+\+|c#)",
                r"(?i)\b(react|angular|vue|django|flask|spring|node\.?js|express|fastapi|rails)\b",
                r"(?i)\b(sql|mysql|postgresql|mongodb|redis|elasticsearch|dynamodb|oracle)\b",
                r"(?i)\b(aws|azure|gcp|docker|kubernetes|jenkins|terraform|ansible|git)\b",
                r"(?i)\b(jira|confluence|tableau|power\s?bi|excel|salesforce)\b",
                r"(?i)\b(agile|scrum|devops|ci/cd|microservices|rest\s?api|graphql)\b",
            ])?,
            table: Regex::new(r"\|.*\|")?,
            special_bullet: Regex::new(r"[▪▫■□●○◆◇★☆]")?,
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            phone_patterns: compile(&[
                r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b",
                r"\(\d{3}\)\s*\d{3}[-.\s]?\d{4}",
                r"\+\d{1,3}\s*\d{3,}",
            ])?,
        })
    }

    pub fn analyze(&self, resume_text: &str, job_text: &str) -> AtsReport {
        let keyword_analysis = self.analyze_keywords(resume_text, job_text);
        let (formatting_score, mut issues) = self.check_formatting(resume_text);
        let (section_score, missing_sections) = check_sections(resume_text);
        let contact_score = self.check_contact(resume_text);

        let ats_score = round1(
            keyword_analysis.match_percentage * 0.50
                + formatting_score * 0.25
                + section_score * 0.15
                + contact_score * 0.10,
        );

        let mut recommendations = Vec::new();
        if keyword_analysis.match_percentage < KEYWORD_MATCH_TARGET {
            let to_add: Vec<&str> = keyword_analysis
                .missing_keywords
                .iter()
                .take(10)
                .map(String::as_str)
                .collect();
            recommendations.push(AtsRecommendation {
                category: AtsCategory::Keywords,
                priority: Priority::High,
                issue: format!(
                    "Only {}/{} key terms matched",
                    keyword_analysis.matched_count, keyword_analysis.total_keywords
                ),
                suggestion: format!("Add these missing keywords: {}", to_add.join(", ")),
            });
        }
        if !issues.is_empty() {
            recommendations.push(AtsRecommendation {
                category: AtsCategory::Formatting,
                priority: Priority::Medium,
                issue: format!("Found {} ATS formatting issues", issues.len()),
                suggestion: "Use simple formatting: standard fonts, no tables, standard bullet points (•, -, *)"
                    .to_string(),
            });
        }
        if !missing_sections.is_empty() {
            recommendations.push(AtsRecommendation {
                category: AtsCategory::Sections,
                priority: Priority::High,
                issue: format!("Missing important sections: {}", missing_sections.join(", ")),
                suggestion: "Add missing sections to improve ATS parsing".to_string(),
            });
        }
        if contact_score < 100.0 {
            recommendations.push(AtsRecommendation {
                category: AtsCategory::Contact,
                priority: Priority::High,
                issue: "Missing contact information".to_string(),
                suggestion: "Include email and phone number at the top of resume".to_string(),
            });
        }

        issues.extend(missing_sections);
        debug!(ats_score, "ATS analysis completed");

        AtsReport {
            ats_score,
            keyword_analysis,
            formatting_score,
            section_score,
            contact_score,
            issues,
            recommendations,
        }
    }

    /// Keywords ordered by frequency, then by first appearance.
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut record = |keyword: String, position: usize| {
            let entry = counts.entry(keyword).or_insert((0, position));
            entry.0 += 1;
        };

        for pattern in &self.phrase_patterns {
            for m in pattern.find_iter(text) {
                record(m.as_str().to_lowercase(), m.start());
            }
        }
        for m in self.word.find_iter(&lower) {
            let word = m.as_str();
            if word.chars().count() >= MIN_KEYWORD_LEN
                && !STOP_WORDS.contains(&word)
                && !word.chars().all(|c| c.is_ascii_digit())
            {
                record(word.to_string(), m.start());
            }
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked
            .into_iter()
            .take(MAX_KEYWORDS)
            .map(|(keyword, _)| keyword)
            .collect()
    }

    /// Recognised technology and methodology names, lowercased and deduplicated.
    pub fn extract_skills(&self, text: &str) -> Vec<String> {
        let mut skills = BTreeSet::new();
        for pattern in &self.skill_patterns {
            for caps in pattern.captures_iter(text) {
                if let Some(skill) = caps.get(1) {
                    skills.insert(skill.as_str().to_lowercase());
                }
            }
        }
        skills.into_iter().collect()
    }

    fn analyze_keywords(&self, resume_text: &str, job_text: &str) -> KeywordAnalysis {
        let resume_lower = resume_text.to_lowercase();
        let important: Vec<String> = self
            .extract_keywords(job_text)
            .into_iter()
            .take(IMPORTANT_JOB_KEYWORDS)
            .collect();

        let matched: Vec<String> = important
            .iter()
            .filter(|kw| resume_lower.contains(kw.as_str()))
            .cloned()
            .collect();
        let missing: Vec<String> = important
            .iter()
            .take(MISSING_CANDIDATES)
            .filter(|kw| !resume_lower.contains(kw.as_str()))
            .cloned()
            .collect();

        let total = important.len();
        let match_percentage = if total == 0 {
            0.0
        } else {
            round1(matched.len() as f64 / total as f64 * 100.0)
        };

        let (matched_skills, missing_skills): (Vec<String>, Vec<String>) = self
            .extract_skills(job_text)
            .into_iter()
            .partition(|skill| resume_lower.contains(skill.as_str()));

        KeywordAnalysis {
            total_keywords: total,
            matched_count: matched.len(),
            match_percentage,
            matched_keywords: matched.into_iter().take(REPORTED_KEYWORDS).collect(),
            missing_keywords: missing.into_iter().take(REPORTED_KEYWORDS).collect(),
            matched_skills,
            missing_skills,
        }
    }

    fn check_formatting(&self, resume_text: &str) -> (f64, Vec<String>) {
        let mut issues = Vec::new();
        let mut score: f64 = 100.0;

        if self.table.is_match(resume_text) {
            issues.push("Contains tables (may not parse correctly)".to_string());
            score -= 20.0;
        }

        let bullets: BTreeSet<&str> = self
            .special_bullet
            .find_iter(resume_text)
            .map(|m| m.as_str())
            .collect();
        if !bullets.is_empty() {
            issues.push(format!(
                "Contains {} types of special bullet points",
                bullets.len()
            ));
            score -= 10.0;
        }

        if resume_text.matches('\t').count() > 20 {
            issues.push("Excessive tab characters detected".to_string());
            score -= 10.0;
        }

        let long_lines = resume_text
            .lines()
            .filter(|l| l.chars().count() > 200)
            .count();
        if long_lines > 5 {
            issues.push("Some lines are very long (possible column formatting)".to_string());
            score -= 15.0;
        }

        (score.max(0.0), issues)
    }

    fn check_contact(&self, resume_text: &str) -> f64 {
        let mut score = 0.0;
        if self.email.is_match(resume_text) {
            score += 50.0;
        }
        if self.phone_patterns.iter().any(|p| p.is_match(resume_text)) {
            score += 50.0;
        }
        score
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

fn check_sections(resume_text: &str) -> (f64, Vec<String>) {
    let lower = resume_text.to_lowercase();
    let missing: Vec<String> = SECTION_GROUPS
        .iter()
        .filter(|(_, variants)| !variants.iter().any(|v| lower.contains(v)))
        .map(|(name, _)| name.to_string())
        .collect();
    let found = SECTION_GROUPS.len() - missing.len();
    (found as f64 / SECTION_GROUPS.len() as f64 * 100.0, missing)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
