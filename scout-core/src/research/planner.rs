//! Planner role: turns accumulated intelligence into the next cycle's
//! assignments and says whether research looks done.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::model::{
    Assignment, ConfidenceAssessment, DiscoveredInitiative, FindingCategory, Intelligence,
    Priority, ResearchInput,
};
use crate::brain::{Brain, ReasoningRole, Reply, parse_json};
use crate::error::RoleError;
use crate::retry::RetryPolicy;
use crate::types::Message;

const ROLE: &str = "planner";

/// Findings listed per category in the planner prompt.
const PROMPT_FINDINGS_PER_CATEGORY: usize = 8;

/// The planner's output for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub assignments: Vec<Assignment>,
    pub reasoning: String,
    /// Advisory; surfaced to observers, never researched automatically.
    #[serde(default)]
    pub discovered: Vec<DiscoveredInitiative>,
    /// The planner believes research is complete.
    pub done: bool,
}

impl Plan {
    pub fn new(assignments: Vec<Assignment>) -> Self {
        Self {
            assignments,
            ..Default::default()
        }
    }

    pub fn done(mut self) -> Self {
        self.done = true;
        self
    }
}

/// Planner role contract.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        input: &ResearchInput,
        intelligence: &Intelligence,
        assessment: &ConfidenceAssessment,
        cycle: u32,
    ) -> Result<Plan, RoleError>;
}

const PLANNER_SYSTEM_PROMPT: &str = r#"You plan research cycles for a sales intelligence team studying one company initiative.
Each cycle you read what is already known and decide which focused research paths to run next.

Categories: people (decision makers, org structure), initiative (scope, timeline, status),
technology (stack, planned changes, vendors), competitive (other vendors, RFPs),
financial (budget signals, fiscal timing), market (trends, regulation, position).

Plan at most 5 paths. Aim them at the weakest categories and open gaps. For a follow-up
question, aim the paths at that question. Reply with JSON only:
{
  "research_paths": [
    {
      "id": "path_1",
      "topic": "what to research",
      "priority": "high|medium|low",
      "category": "people|initiative|technology|competitive|financial|market",
      "instructions": "exactly what the worker should look for",
      "suggested_actions": ["web_search", "news_search", "sec_filings", "job_postings", "web_fetch"]
    }
  ],
  "discovered_initiatives": [{"name": "...", "description": "...", "evidence": ["..."]}],
  "should_continue": true|false,
  "reasoning": "why"
}"#;

#[derive(Debug, Deserialize)]
struct PlannerReply {
    #[serde(default)]
    research_paths: Vec<RawPath>,
    #[serde(default)]
    discovered_initiatives: Vec<RawInitiative>,
    should_continue: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    analysis: String,
}

#[derive(Debug, Deserialize)]
struct RawPath {
    #[serde(default)]
    id: String,
    topic: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    instructions: String,
    #[serde(default)]
    suggested_actions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawInitiative {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    evidence: Vec<String>,
}

fn parse_priority(s: &str) -> Priority {
    match s.trim().to_lowercase().as_str() {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

/// Validate the reply and give every path a cycle-unique id.
fn into_plan(reply: PlannerReply, cycle: u32) -> Result<Plan, RoleError> {
    let mut seen = HashSet::new();
    let mut assignments = Vec::with_capacity(reply.research_paths.len());

    for (index, raw) in reply.research_paths.into_iter().enumerate() {
        if raw.topic.trim().is_empty() {
            return Err(RoleError::Schema {
                role: ROLE,
                message: format!("research path {} has an empty topic", index + 1),
            });
        }
        let mut id = raw.id.trim().to_string();
        if id.is_empty() || seen.contains(&id) {
            id = format!("path_{}", index + 1);
            while seen.contains(&id) {
                id.push('_');
            }
        }
        seen.insert(id.clone());

        let instructions = if raw.instructions.trim().is_empty() {
            raw.topic.clone()
        } else {
            raw.instructions
        };
        assignments.push(Assignment {
            id,
            topic: raw.topic,
            instructions,
            category: FindingCategory::parse_loose(&raw.category),
            suggested_actions: raw.suggested_actions,
            priority: parse_priority(&raw.priority),
        });
    }

    let discovered = reply
        .discovered_initiatives
        .into_iter()
        .filter(|i| !i.name.trim().is_empty())
        .map(|i| DiscoveredInitiative {
            name: i.name,
            description: i.description,
            evidence: i.evidence,
            discovered_in_cycle: cycle,
        })
        .collect();

    let reasoning = if reply.reasoning.is_empty() {
        reply.analysis
    } else {
        reply.reasoning
    };

    Ok(Plan {
        assignments,
        reasoning,
        discovered,
        done: !reply.should_continue,
    })
}

fn plan_prompt(
    input: &ResearchInput,
    intelligence: &Intelligence,
    assessment: &ConfidenceAssessment,
    cycle: u32,
) -> String {
    let mut prompt = format!(
        "Company: {}\nInitiative: {}\n",
        input.company, input.initiative
    );
    if let Some(industry) = &input.industry {
        prompt.push_str(&format!("Industry: {industry}\n"));
    }
    prompt.push_str(&format!("Cycle: {cycle}\n"));
    if let Some(question) = &input.follow_up {
        prompt.push_str(&format!("Follow-up question to answer: {question}\n"));
    }

    prompt.push_str("\nConfidence by category:\n");
    for (category, level) in assessment.iter() {
        prompt.push_str(&format!("- {category}: {level}\n"));
    }

    if intelligence.active_count() == 0 {
        prompt.push_str("\nNo findings yet. This is the first look at the initiative.\n");
    } else {
        prompt.push_str("\nKnown findings:\n");
        for category in FindingCategory::ALL {
            let findings: Vec<_> = intelligence
                .active_in(category)
                .take(PROMPT_FINDINGS_PER_CATEGORY)
                .collect();
            if findings.is_empty() {
                continue;
            }
            prompt.push_str(&format!("[{category}]\n"));
            for finding in findings {
                prompt.push_str(&format!("- {}\n", finding.summary));
            }
        }
    }

    if !intelligence.contradictions.is_empty() {
        prompt.push_str("\nUnresolved contradictions:\n");
        for c in &intelligence.contradictions {
            prompt.push_str(&format!("- [{}] {}\n", c.category, c.annotation));
        }
    }
    if !intelligence.gaps.is_empty() {
        prompt.push_str("\nOpen gaps:\n");
        for gap in &intelligence.gaps {
            prompt.push_str(&format!("- {}\n", gap.description));
        }
    }
    if !intelligence.initiatives.is_empty() {
        prompt.push_str("\nAlready surfaced initiatives (do not repeat):\n");
        for initiative in &intelligence.initiatives {
            prompt.push_str(&format!("- {}\n", initiative.name));
        }
    }
    prompt
}

/// Planner backed by the reasoning capability.
pub struct LlmPlanner {
    brain: Arc<Brain>,
    retry: RetryPolicy,
}

impl LlmPlanner {
    pub fn new(brain: Arc<Brain>, retry: RetryPolicy) -> Self {
        Self { brain, retry }
    }

    async fn plan_once(&self, prompt: &str, cycle: u32) -> Result<Plan, RoleError> {
        let reply = self
            .brain
            .invoke(
                ReasoningRole::Planner,
                PLANNER_SYSTEM_PROMPT,
                &[Message::user(prompt)],
                &[],
            )
            .await
            .map_err(|source| RoleError::Capability { role: ROLE, source })?;

        let text = match reply {
            Reply::Final { text } => text,
            Reply::Actions { .. } => {
                return Err(RoleError::Schema {
                    role: ROLE,
                    message: "requested actions instead of returning a plan".into(),
                });
            }
        };
        let parsed: PlannerReply = parse_json(&text).map_err(|message| {
            warn!(cycle, error = %message, "Planner reply violated schema");
            RoleError::Schema {
                role: ROLE,
                message,
            }
        })?;
        into_plan(parsed, cycle)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        input: &ResearchInput,
        intelligence: &Intelligence,
        assessment: &ConfidenceAssessment,
        cycle: u32,
    ) -> Result<Plan, RoleError> {
        let prompt = plan_prompt(input, intelligence, assessment, cycle);
        let plan = self
            .retry
            .run("planner", || self.plan_once(&prompt, cycle))
            .await?;
        debug!(
            cycle,
            assignments = plan.assignments.len(),
            done = plan.done,
            "Plan received"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::LlmConfig;
    use crate::error::LlmError;
    use crate::research::model::{ConfidenceLevel, Finding, PathId};
    use serde_json::json;
    use std::time::Duration;

    fn planner(provider: Arc<MockLlmProvider>, retries: u32) -> LlmPlanner {
        LlmPlanner::new(
            Arc::new(Brain::new(provider, LlmConfig::default())),
            RetryPolicy::new(retries, Duration::from_millis(10)),
        )
    }

    fn input() -> ResearchInput {
        ResearchInput::new("Acme Corp", "Manufacturing", "cloud migration")
    }

    #[tokio::test]
    async fn test_plan_parses_paths() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(
            &format!(
                "```json\n{}\n```",
                json!({
                    "research_paths": [
                        {"id": "path_1", "topic": "CIO and cloud team", "priority": "high", "category": "people", "instructions": "Find the CIO"},
                        {"id": "path_2", "topic": "Cloud vendor selection", "priority": "low", "category": "technology", "suggested_actions": ["web_search"]}
                    ],
                    "discovered_initiatives": [{"name": "ERP consolidation", "description": "Moving to one ERP"}],
                    "should_continue": true,
                    "reasoning": "Nothing known yet"
                })
            ),
        ));
        let planner = planner(provider, 0);

        let plan = planner
            .plan(&input(), &Intelligence::default(), &ConfidenceAssessment::new(), 1)
            .await
            .unwrap();
        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.assignments[0].priority, Priority::High);
        assert_eq!(plan.assignments[0].category, Some(FindingCategory::People));
        assert_eq!(plan.assignments[1].instructions, "Cloud vendor selection");
        assert_eq!(plan.assignments[1].suggested_actions, vec!["web_search"]);
        assert_eq!(plan.discovered.len(), 1);
        assert_eq!(plan.discovered[0].discovered_in_cycle, 1);
        assert!(!plan.done);
        assert_eq!(plan.reasoning, "Nothing known yet");
    }

    #[tokio::test]
    async fn test_plan_done_signal() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::json_response(
            &json!({"research_paths": [], "should_continue": false, "reasoning": "Complete"}),
        ));
        let plan = planner(provider, 0)
            .plan(&input(), &Intelligence::default(), &ConfidenceAssessment::new(), 4)
            .await
            .unwrap();
        assert!(plan.done);
        assert!(plan.assignments.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_ids_are_renamed() {
        let reply: PlannerReply = serde_json::from_value(json!({
            "research_paths": [
                {"id": "a", "topic": "one"},
                {"id": "a", "topic": "two"},
                {"topic": "three"}
            ],
            "should_continue": true
        }))
        .unwrap();
        let plan = into_plan(reply, 2).unwrap();
        let ids: Vec<&str> = plan.assignments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "path_2", "path_3"]);
    }

    #[tokio::test]
    async fn test_schema_violation_retried_once_then_fails() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response("I think we should look at people."));
        provider.queue_response(MockLlmProvider::json_response(&json!({"research_paths": []})));
        let err = planner(provider.clone(), 1)
            .plan(&input(), &Intelligence::default(), &ConfidenceAssessment::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RoleError::Schema { role: "planner", .. }));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_capability_error_recovers_on_retry() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_error(LlmError::Connection {
            message: "reset".into(),
        });
        provider.queue_response(MockLlmProvider::json_response(
            &json!({"research_paths": [{"topic": "Budget"}], "should_continue": true}),
        ));
        let plan = planner(provider, 1)
            .plan(&input(), &Intelligence::default(), &ConfidenceAssessment::new(), 1)
            .await
            .unwrap();
        assert_eq!(plan.assignments[0].id, "path_1");
    }

    #[test]
    fn test_prompt_includes_state() {
        let mut intelligence = Intelligence::default();
        intelligence.findings.push(Finding::new(
            FindingCategory::Financial,
            "FY26 IT budget up 12%",
            PathId::new(1, "p"),
            1,
        ));
        let assessment =
            ConfidenceAssessment::new().with(FindingCategory::Financial, ConfidenceLevel::Low);
        let mut input = input();
        input.follow_up = Some("Who signs off?".into());

        let prompt = plan_prompt(&input, &intelligence, &assessment, 3);
        assert!(prompt.contains("Cycle: 3"));
        assert!(prompt.contains("- financial: low"));
        assert!(prompt.contains("FY26 IT budget up 12%"));
        assert!(prompt.contains("Follow-up question to answer: Who signs off?"));
    }
}
