//! Job posting search. Hiring pages are a strong signal of which
//! technologies and initiatives a company is investing in.

use async_trait::async_trait;
use scout_core::actions::ActionCapability;
use scout_core::error::ActionError;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tracing::info;

use crate::brave::{BraveClient, base_params, str_field};
use crate::http::{domain, optional_str, required_str, truncate_chars};

const SEARCH_COUNT: u64 = 15;
const MAX_JOBS: usize = 10;
const MAX_EXCERPT_CHARS: usize = 300;

const JOB_INDICATORS: [&str; 14] = [
    "career",
    "job",
    "position",
    "hiring",
    "apply",
    "engineer",
    "manager",
    "director",
    "analyst",
    "developer",
    "specialist",
    "coordinator",
    "lead",
    "architect",
];

const TECH_KEYWORDS: [&str; 41] = [
    "aws",
    "azure",
    "gcp",
    "google cloud",
    "kubernetes",
    "docker",
    "python",
    "java",
    "javascript",
    "typescript",
    "react",
    "angular",
    "sql",
    "postgresql",
    "mongodb",
    "redis",
    "elasticsearch",
    "terraform",
    "ansible",
    "jenkins",
    "github",
    "gitlab",
    "salesforce",
    "servicenow",
    "sap",
    "oracle",
    "workday",
    "machine learning",
    "ai",
    "data science",
    "analytics",
    "security",
    "devops",
    "sre",
    "cloud",
    "microservices",
    "agile",
    "scrum",
    "jira",
    "confluence",
    "snowflake",
];

/// Seniority buckets, checked in order. First match wins.
const SENIORITY: [(&str, &[&str]); 5] = [
    ("senior", &["senior", "sr.", "sr ", "lead", "principal", "staff"]),
    ("director", &["director", "head of", "vp", "vice president"]),
    ("manager", &["manager", "mgr"]),
    ("junior", &["junior", "jr.", "jr ", "entry", "associate"]),
    ("intern", &["intern", "internship"]),
];

pub struct JobPostingsAction {
    brave: BraveClient,
}

impl JobPostingsAction {
    pub fn new(brave: BraveClient) -> Self {
        Self { brave }
    }
}

pub(crate) fn build_query(company: &str, keywords: Option<&str>) -> String {
    let mut query = format!("\"{company}\" careers OR jobs OR hiring");
    if let Some(keywords) = keywords {
        let terms: Vec<&str> = keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();
        if !terms.is_empty() {
            query.push_str(&format!(" {}", terms.join(" OR ")));
        }
    }
    query
}

fn looks_like_job(title: &str, url: &str) -> bool {
    let haystack = format!("{title} {url}").to_lowercase();
    JOB_INDICATORS.iter().any(|i| haystack.contains(i))
}

/// Technologies mentioned as whole words, so "ai" does not match "maintain".
pub(crate) fn technologies_in(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: Vec<String> = TECH_KEYWORDS
        .iter()
        .filter(|kw| contains_word(&lower, kw))
        .map(|kw| kw.to_string())
        .collect();
    found.sort();
    found
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

pub(crate) fn seniority(title: &str) -> &'static str {
    // Trailing space lets "sr " and "jr " match at the end of a title.
    let lower = format!("{} ", title.to_lowercase());
    SENIORITY
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(level, _)| *level)
        .unwrap_or("mid-level")
}

/// Job rows plus the sorted union of technologies they mention.
pub(crate) fn parse_jobs(body: &Value) -> (Vec<Value>, Vec<String>) {
    let mut signals = BTreeSet::new();
    let jobs = body
        .pointer("/web/results")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let title = str_field(item, "title");
                    let url = str_field(item, "url");
                    if !looks_like_job(&title, &url) {
                        return None;
                    }
                    let description = str_field(item, "description");
                    let technologies = technologies_in(&format!("{title} {description}"));
                    signals.extend(technologies.iter().cloned());
                    Some(json!({
                        "title": title,
                        "source": domain(&url),
                        "url": url,
                        "description_excerpt": truncate_chars(&description, MAX_EXCERPT_CHARS).0,
                        "technologies_mentioned": technologies,
                        "seniority": seniority(&title),
                    }))
                })
                .take(MAX_JOBS)
                .collect()
        })
        .unwrap_or_default();
    (jobs, signals.into_iter().collect())
}

#[async_trait]
impl ActionCapability for JobPostingsAction {
    fn name(&self) -> &str {
        "job_postings"
    }

    fn description(&self) -> &str {
        "Search a company's job postings. Hiring patterns reveal technology investments, \
         team growth and strategic initiatives. Returns titles, seniority and the \
         technologies mentioned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "company_name": {
                    "type": "string",
                    "description": "Company whose postings to search"
                },
                "keywords": {
                    "type": "string",
                    "description": "Optional comma-separated role or technology keywords, e.g. 'cloud, data engineer'"
                }
            },
            "required": ["company_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ActionError> {
        let company = required_str(&args, self.name(), "company_name")?;
        let keywords = optional_str(&args, "keywords");
        let query = build_query(company, keywords);

        let body = self
            .brave
            .search(self.name(), "web", &base_params(&query, SEARCH_COUNT))
            .await?;
        let (jobs, technology_signals) = parse_jobs(&body);
        info!(
            company,
            jobs = jobs.len(),
            technologies = technology_signals.len(),
            "Job postings search completed"
        );

        Ok(json!({
            "company_name": company,
            "total_found": jobs.len(),
            "jobs": jobs,
            "technology_signals": technology_signals,
        }))
    }
}
