//! Worker role: executes one assignment as a bounded conversation with the
//! reasoning capability, running actions within a call budget.
//!
//! The loop checks the path's stop signal before every reasoning call and
//! every action. Action failures are fed back into the conversation; only a
//! reasoning failure that outlives its retries makes the path `error`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{Assignment, Finding, FindingCategory, Intelligence, PathId, ResearchInput};
use super::session::{PathStatus, StopReason};
use super::signals::PathSignal;
use crate::actions::{ActionOutcome, ActionRegistry};
use crate::brain::{Brain, ReasoningRole, Reply, parse_json};
use crate::retry::RetryPolicy;
use crate::types::{ActionCall, ActionDefinition, Message};

/// Built-in action the reasoning capability uses to commit interim findings.
/// Not counted against the action budget.
pub const RECORD_FINDINGS: &str = "record_findings";

/// Everything a worker needs for one path. The intelligence snapshot is
/// shared read-only between sibling workers.
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub session_id: Uuid,
    pub cycle: u32,
    pub path_id: PathId,
    pub input: Arc<ResearchInput>,
    pub assignment: Assignment,
    pub intelligence: Arc<Intelligence>,
}

/// One action call and what came of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTrace {
    pub action: String,
    pub arguments: serde_json::Value,
    pub outcome: ActionOutcome,
    pub at: DateTime<Utc>,
}

/// What a worker hands back to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub path_id: PathId,
    pub status: PathStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub tangential_signals: Vec<String>,
    pub action_calls: u32,
    #[serde(default)]
    pub trace: Vec<ActionTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResult {
    pub fn completed(path_id: PathId, findings: Vec<Finding>) -> Self {
        Self {
            path_id,
            status: PathStatus::Completed,
            stop_reason: None,
            findings,
            tangential_signals: Vec::new(),
            action_calls: 0,
            trace: Vec::new(),
            error: None,
        }
    }

    pub fn failed(path_id: PathId, error: impl Into<String>) -> Self {
        Self {
            path_id,
            status: PathStatus::Error,
            stop_reason: Some(StopReason::Error),
            findings: Vec::new(),
            tangential_signals: Vec::new(),
            action_calls: 0,
            trace: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionTrace> {
        self.trace.iter().filter(|t| !t.outcome.is_success())
    }
}

/// Worker role contract.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, order: WorkOrder, action_budget: u32, stop: PathSignal)
    -> WorkerResult;
}

const WORKER_SYSTEM_PROMPT: &str = r#"You are a research worker gathering sales intelligence about one company.
You are given one focused assignment. Use the available actions to find specific, verifiable facts:
names and titles, dates, budgets, vendors, technologies, competitive signals.

Whenever you have solid facts, call record_findings to save them. When the assignment is
answered or the sources are exhausted, reply with JSON only:
{
  "findings": [
    {
      "category": "people|initiative|technology|competitive|financial|market",
      "summary": "one sentence",
      "details": "specifics",
      "source_url": "where it was found",
      "confidence": 0.0-1.0
    }
  ],
  "tangential_signals": ["related initiatives noticed along the way"],
  "search_exhausted": true|false
}"#;

const BUDGET_REACHED_PROMPT: &str = "The action budget for this assignment is used up. \
Reply now with your final findings in the JSON format, without requesting any actions.";

#[derive(Debug, Default, Deserialize)]
struct WorkerReport {
    #[serde(default)]
    findings: Vec<RawFinding>,
    #[serde(default)]
    tangential_signals: Vec<String>,
    #[serde(default)]
    search_exhausted: bool,
}

#[derive(Debug, Deserialize)]
struct RecordedFindings {
    #[serde(default)]
    findings: Vec<RawFinding>,
}

/// A finding as the reasoning capability writes it.
#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl RawFinding {
    fn into_finding(self, order: &WorkOrder) -> Option<Finding> {
        if self.summary.trim().is_empty() {
            return None;
        }
        let category = self
            .category
            .as_deref()
            .and_then(FindingCategory::parse_loose)
            .or(order.assignment.category)
            .unwrap_or(FindingCategory::Initiative);

        let mut content = self.extra;
        let source = self.source_url.or_else(|| match content.remove("source") {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        });
        if let Some(details) = self.details {
            content.insert("details".into(), serde_json::Value::String(details));
        }

        let mut finding = Finding::new(category, self.summary, order.path_id.clone(), order.cycle)
            .with_confidence(confidence_score(self.confidence.as_ref()))
            .with_content(serde_json::Value::Object(content));
        if let Some(source) = source.filter(|s| !s.trim().is_empty()) {
            finding = finding.with_source(source);
        }
        Some(finding)
    }
}

/// Accepts a number in 0..=1 or an ordinal word.
fn confidence_score(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
        Some(serde_json::Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "sufficient" | "very high" => 0.95,
            "high" => 0.8,
            "medium" => 0.5,
            "low" => 0.3,
            other => other.parse::<f64>().map(|v| v.clamp(0.0, 1.0)).unwrap_or(0.5),
        },
        _ => 0.5,
    }
}

fn record_findings_definition() -> ActionDefinition {
    ActionDefinition {
        name: RECORD_FINDINGS.to_string(),
        description: "Save findings gathered so far. Saved findings are kept even if the \
                      assignment is stopped early."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "findings": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string", "enum": FindingCategory::ALL.map(|c| c.as_str())},
                            "summary": {"type": "string"},
                            "details": {"type": "string"},
                            "source_url": {"type": "string"},
                            "confidence": {"type": "number"}
                        },
                        "required": ["category", "summary"]
                    }
                }
            },
            "required": ["findings"]
        }),
    }
}

fn task_prompt(order: &WorkOrder) -> String {
    let input = &order.input;
    let assignment = &order.assignment;
    let mut prompt = format!(
        "Research assignment\nCompany: {}\nInitiative: {}\n",
        input.company, input.initiative
    );
    if let Some(industry) = &input.industry {
        prompt.push_str(&format!("Industry: {industry}\n"));
    }
    if let Some(question) = &input.follow_up {
        prompt.push_str(&format!("Follow-up question: {question}\n"));
    }
    prompt.push_str(&format!("\nTopic: {}\n", assignment.topic));
    if let Some(category) = assignment.category {
        prompt.push_str(&format!("Target category: {category}\n"));
    }
    prompt.push_str(&format!("Instructions: {}\n", assignment.instructions));

    let known: Vec<&Finding> = match assignment.category {
        Some(category) => order.intelligence.active_in(category).take(10).collect(),
        None => order.intelligence.active().take(10).collect(),
    };
    if !known.is_empty() {
        prompt.push_str("\nAlready known (do not repeat):\n");
        for finding in known {
            prompt.push_str(&format!("- {}\n", finding.summary));
        }
    }
    prompt
}

/// Mutable state of one path while it runs.
struct PathRun {
    findings: Vec<Finding>,
    signals: Vec<String>,
    trace: Vec<ActionTrace>,
    action_calls: u32,
}

impl PathRun {
    fn finish(
        self,
        path_id: PathId,
        status: PathStatus,
        stop_reason: Option<StopReason>,
        error: Option<String>,
    ) -> WorkerResult {
        WorkerResult {
            path_id,
            status,
            stop_reason,
            findings: self.findings,
            tangential_signals: self.signals,
            action_calls: self.action_calls,
            trace: self.trace,
            error,
        }
    }
}

/// Worker backed by the reasoning capability and the action registry.
pub struct LlmWorker {
    brain: Arc<Brain>,
    actions: Arc<ActionRegistry>,
    retry: RetryPolicy,
}

impl LlmWorker {
    pub fn new(brain: Arc<Brain>, actions: Arc<ActionRegistry>, retry: RetryPolicy) -> Self {
        Self {
            brain,
            actions,
            retry,
        }
    }

    async fn reason(
        &self,
        conversation: &[Message],
        definitions: &[ActionDefinition],
    ) -> Result<Reply, crate::error::LlmError> {
        self.retry
            .run("worker reasoning", || {
                self.brain.invoke(
                    ReasoningRole::Worker,
                    WORKER_SYSTEM_PROMPT,
                    conversation,
                    definitions,
                )
            })
            .await
    }

    fn absorb_report(&self, text: &str, order: &WorkOrder, run: &mut PathRun) -> Option<bool> {
        match parse_json::<WorkerReport>(text) {
            Ok(report) => {
                run.findings.extend(
                    report
                        .findings
                        .into_iter()
                        .filter_map(|raw| raw.into_finding(order)),
                );
                run.signals.extend(
                    report
                        .tangential_signals
                        .into_iter()
                        .filter(|s| !s.trim().is_empty()),
                );
                Some(report.search_exhausted)
            }
            Err(e) => {
                warn!(path_id = %order.path_id, error = %e, "Unparseable worker report");
                None
            }
        }
    }

    fn record(&self, call: &ActionCall, order: &WorkOrder, run: &mut PathRun) -> String {
        match serde_json::from_value::<RecordedFindings>(call.arguments.clone()) {
            Ok(recorded) => {
                let before = run.findings.len();
                run.findings.extend(
                    recorded
                        .findings
                        .into_iter()
                        .filter_map(|raw| raw.into_finding(order)),
                );
                let added = run.findings.len() - before;
                debug!(path_id = %order.path_id, added, "Recorded interim findings");
                format!("Recorded {added} findings.")
            }
            Err(e) => format!("This action failed (invalid_arguments): {e}"),
        }
    }
}

#[async_trait]
impl Worker for LlmWorker {
    async fn execute(
        &self,
        order: WorkOrder,
        action_budget: u32,
        stop: PathSignal,
    ) -> WorkerResult {
        let path_id = order.path_id.clone();
        info!(
            session_id = %order.session_id,
            path_id = %path_id,
            topic = %order.assignment.topic,
            action_budget,
            "Path started"
        );

        let mut definitions = self
            .actions
            .definitions_for(&order.assignment.suggested_actions);
        definitions.push(record_findings_definition());

        let mut conversation = vec![Message::user(task_prompt(&order))];
        let mut run = PathRun {
            findings: Vec::new(),
            signals: Vec::new(),
            trace: Vec::new(),
            action_calls: 0,
        };
        let max_turns = action_budget.saturating_mul(2).saturating_add(2);

        for _turn in 0..max_turns {
            if stop.is_stopped() {
                return run.finish(path_id, PathStatus::Stopped, Some(StopReason::User), None);
            }

            let reply = match self.reason(&conversation, &definitions).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(path_id = %path_id, error = %e, "Reasoning failed after retries");
                    return run.finish(
                        path_id,
                        PathStatus::Error,
                        Some(StopReason::Error),
                        Some(e.to_string()),
                    );
                }
            };

            match reply {
                Reply::Final { text } => {
                    let exhausted = self.absorb_report(&text, &order, &mut run);
                    let status = match exhausted {
                        Some(false) => PathStatus::Completed,
                        _ => PathStatus::Exhausted,
                    };
                    info!(
                        path_id = %path_id,
                        %status,
                        findings = run.findings.len(),
                        action_calls = run.action_calls,
                        "Path finished"
                    );
                    return run.finish(path_id, status, None, None);
                }
                Reply::Actions { message, requests } => {
                    conversation.push(message);
                    for call in requests {
                        if call.name == RECORD_FINDINGS {
                            let feedback = self.record(&call, &order, &mut run);
                            conversation.push(Message::action_result(&call.id, feedback, false));
                            continue;
                        }
                        if run.action_calls >= action_budget {
                            conversation.push(Message::action_result(
                                &call.id,
                                "Not run: action budget exhausted.",
                                true,
                            ));
                            continue;
                        }
                        if stop.is_stopped() {
                            return run.finish(
                                path_id,
                                PathStatus::Stopped,
                                Some(StopReason::User),
                                None,
                            );
                        }

                        let outcome = self.actions.run(&call.name, call.arguments.clone()).await;
                        run.action_calls += 1;
                        conversation.push(Message::action_result(
                            &call.id,
                            outcome.to_feedback(),
                            !outcome.is_success(),
                        ));
                        run.trace.push(ActionTrace {
                            action: call.name,
                            arguments: call.arguments,
                            outcome,
                            at: Utc::now(),
                        });
                    }
                    if run.action_calls >= action_budget {
                        break;
                    }
                }
            }
        }

        // Budget or turn limit reached: ask once for a final report.
        if stop.is_stopped() {
            return run.finish(path_id, PathStatus::Stopped, Some(StopReason::User), None);
        }
        conversation.push(Message::user(BUDGET_REACHED_PROMPT));
        match self.reason(&conversation, &[]).await {
            Ok(Reply::Final { text }) => {
                self.absorb_report(&text, &order, &mut run);
            }
            Ok(Reply::Actions { .. }) => {
                warn!(path_id = %path_id, "Actions requested after budget was exhausted");
            }
            Err(e) => {
                warn!(path_id = %path_id, error = %e, "Final report failed, keeping recorded findings");
            }
        }
        info!(
            path_id = %path_id,
            findings = run.findings.len(),
            action_calls = run.action_calls,
            "Path exhausted its action budget"
        );
        run.finish(path_id, PathStatus::Exhausted, Some(StopReason::Budget), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionCapability, ActionFailureKind};
    use crate::brain::MockLlmProvider;
    use crate::config::LlmConfig;
    use crate::error::{ActionError, LlmError};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct SearchAction {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ActionCapability for SearchAction {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if args["query"] == "broken" {
                return Err(ActionError::Unreachable {
                    name: "web_search".into(),
                    message: "connection reset".into(),
                });
            }
            Ok(json!({"results": [{"title": "Acme moves to cloud", "url": "https://acme.com/news"}]}))
        }
    }

    fn order() -> WorkOrder {
        WorkOrder {
            session_id: Uuid::new_v4(),
            cycle: 1,
            path_id: PathId::new(1, "path_1"),
            input: Arc::new(ResearchInput::new(
                "Acme Corp",
                "Manufacturing",
                "cloud migration",
            )),
            assignment: Assignment::new("path_1", "Cloud vendors")
                .with_category(FindingCategory::Technology),
            intelligence: Arc::new(Intelligence::default()),
        }
    }

    fn worker(provider: Arc<MockLlmProvider>) -> (LlmWorker, Arc<SearchAction>) {
        let search = Arc::new(SearchAction {
            calls: AtomicU32::new(0),
        });
        let mut registry = ActionRegistry::new(Duration::from_secs(15));
        registry.register(search.clone()).unwrap();
        let brain = Arc::new(Brain::new(provider, LlmConfig::default()));
        (
            LlmWorker::new(
                brain,
                Arc::new(registry),
                RetryPolicy::new(3, Duration::from_secs(1)),
            ),
            search,
        )
    }

    fn report(findings: serde_json::Value, exhausted: bool) -> serde_json::Value {
        json!({"findings": findings, "tangential_signals": ["Acme is also consolidating its ERP platforms"], "search_exhausted": exhausted})
    }

    #[tokio::test]
    async fn test_search_then_report() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::action_response(
            "web_search",
            json!({"query": "Acme cloud"}),
        ));
        provider.queue_response(MockLlmProvider::json_response(&report(
            json!([{"category": "technology", "summary": "Acme selected AWS", "details": "Announced in Q3", "source_url": "https://acme.com/news", "confidence": 0.9}]),
            false,
        )));
        let (worker, search) = worker(provider.clone());

        let result = worker.execute(order(), 10, PathSignal::detached()).await;
        assert_eq!(result.status, PathStatus::Completed);
        assert_eq!(result.action_calls, 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.findings.len(), 1);
        let finding = &result.findings[0];
        assert_eq!(finding.category, FindingCategory::Technology);
        assert_eq!(finding.path_id, PathId::new(1, "path_1"));
        assert_eq!(finding.content["details"], "Announced in Q3");
        assert!((finding.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(result.tangential_signals.len(), 1);

        // Second request carries the action result.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_action_failure_is_fed_back() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::action_response(
            "web_search",
            json!({"query": "broken"}),
        ));
        provider.queue_response(MockLlmProvider::json_response(&report(json!([]), true)));
        let (worker, _) = worker(provider.clone());

        let result = worker.execute(order(), 10, PathSignal::detached()).await;
        assert_eq!(result.status, PathStatus::Exhausted);
        assert_eq!(result.stop_reason, None);
        assert_eq!(result.failed_actions().count(), 1);
        assert!(matches!(
            result.trace[0].outcome,
            ActionOutcome::Failure {
                kind: ActionFailureKind::Unreachable,
                ..
            }
        ));

        let requests = provider.requests();
        let last = requests[1].messages.last().unwrap();
        match &last.content {
            crate::types::Content::ActionResult {
                output, is_error, ..
            } => {
                assert!(is_error);
                assert!(output.starts_with("This action failed"));
            }
            other => panic!("expected action result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_budget_exhaustion_requests_final_report() {
        let provider = Arc::new(MockLlmProvider::new());
        for _ in 0..2 {
            provider.queue_response(MockLlmProvider::action_response(
                "web_search",
                json!({"query": "Acme"}),
            ));
        }
        provider.queue_response(MockLlmProvider::json_response(&report(
            json!([{"category": "market", "summary": "Market is growing"}]),
            false,
        )));
        let (worker, search) = worker(provider.clone());

        let result = worker.execute(order(), 2, PathSignal::detached()).await;
        assert_eq!(result.status, PathStatus::Exhausted);
        assert_eq!(result.stop_reason, Some(StopReason::Budget));
        assert_eq!(result.action_calls, 2);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.findings.len(), 1);

        // The final request offers no actions.
        let requests = provider.requests();
        assert!(requests.last().unwrap().actions.is_none());
    }

    #[tokio::test]
    async fn test_batch_beyond_budget_is_not_run() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::actions_response(&[
            ("web_search", json!({"query": "a"})),
            ("web_search", json!({"query": "b"})),
            ("web_search", json!({"query": "c"})),
        ]));
        provider.queue_response(MockLlmProvider::json_response(&report(json!([]), false)));
        let (worker, search) = worker(provider);

        let result = worker.execute(order(), 2, PathSignal::detached()).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.action_calls, 2);
        assert_eq!(result.stop_reason, Some(StopReason::Budget));
    }

    #[tokio::test]
    async fn test_record_findings_not_counted() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::action_response(
            RECORD_FINDINGS,
            json!({"findings": [{"category": "people", "summary": "CTO is Jane Doe", "source_url": "https://acme.com/team"}]}),
        ));
        provider.queue_response(MockLlmProvider::json_response(&report(json!([]), false)));
        let (worker, _) = worker(provider);

        let result = worker.execute(order(), 1, PathSignal::detached()).await;
        assert_eq!(result.status, PathStatus::Completed);
        assert_eq!(result.action_calls, 0);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].category, FindingCategory::People);
    }

    #[tokio::test]
    async fn test_stop_before_first_call() {
        let provider = Arc::new(MockLlmProvider::new());
        let (worker, search) = worker(provider.clone());
        let stop = PathSignal::detached();
        stop.stop();

        let result = worker.execute(order(), 10, stop).await;
        assert_eq!(result.status, PathStatus::Stopped);
        assert_eq!(result.stop_reason, Some(StopReason::User));
        assert!(result.findings.is_empty());
        assert!(provider.requests().is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    /// Stops its own path when executed, so the next action is skipped.
    struct StoppingAction {
        signal: PathSignal,
    }

    #[async_trait]
    impl ActionCapability for StoppingAction {
        fn name(&self) -> &str {
            "news_search"
        }
        fn description(&self) -> &str {
            "news"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<serde_json::Value, ActionError> {
            self.signal.stop();
            Ok(json!({"articles": []}))
        }
    }

    #[tokio::test]
    async fn test_stop_mid_batch_keeps_recorded_findings() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::actions_response(&[
            (
                RECORD_FINDINGS,
                json!({"findings": [{"category": "initiative", "summary": "Migration starts 2026"}]}),
            ),
            ("news_search", json!({"query": "Acme"})),
            ("web_search", json!({"query": "Acme"})),
        ]));
        let stop = PathSignal::detached();
        let search = Arc::new(SearchAction {
            calls: AtomicU32::new(0),
        });
        let mut registry = ActionRegistry::new(Duration::from_secs(15));
        registry.register(search.clone()).unwrap();
        registry
            .register(Arc::new(StoppingAction {
                signal: stop.clone(),
            }))
            .unwrap();
        let worker = LlmWorker::new(
            Arc::new(Brain::new(provider, LlmConfig::default())),
            Arc::new(registry),
            RetryPolicy::none(),
        );

        let result = worker.execute(order(), 10, stop).await;
        assert_eq!(result.status, PathStatus::Stopped);
        assert_eq!(result.stop_reason, Some(StopReason::User));
        assert_eq!(result.action_calls, 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].summary, "Migration starts 2026");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reasoning_retries_then_errors() {
        let provider = Arc::new(MockLlmProvider::new());
        for _ in 0..4 {
            provider.queue_error(LlmError::Connection {
                message: "reset".into(),
            });
        }
        let (worker, _) = worker(provider.clone());
        let start = tokio::time::Instant::now();

        let result = worker.execute(order(), 10, PathSignal::detached()).await;
        assert_eq!(result.status, PathStatus::Error);
        assert_eq!(result.stop_reason, Some(StopReason::Error));
        assert!(result.error.unwrap().contains("reset"));
        assert_eq!(provider.requests().len(), 4);
        // 1s + 2s + 4s of backoff
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reasoning_recovers_within_retries() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_error(LlmError::Timeout { timeout_secs: 30 });
        provider.queue_response(MockLlmProvider::json_response(&report(
            json!([{"category": "financial", "summary": "FY budget approved", "confidence": "high"}]),
            false,
        )));
        let (worker, _) = worker(provider);

        let result = worker.execute(order(), 10, PathSignal::detached()).await;
        assert_eq!(result.status, PathStatus::Completed);
        assert!((result.findings[0].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_category_falls_back_to_assignment() {
        let raw: RawFinding =
            serde_json::from_value(json!({"category": "weather", "summary": "x", "source": "https://a.com"}))
                .unwrap();
        let finding = raw.into_finding(&order()).unwrap();
        assert_eq!(finding.category, FindingCategory::Technology);
        assert_eq!(finding.source.as_deref(), Some("https://a.com"));
    }

    #[test]
    fn test_blank_summary_dropped() {
        let raw: RawFinding = serde_json::from_value(json!({"summary": "  "})).unwrap();
        assert!(raw.into_finding(&order()).is_none());
    }

    #[test]
    fn test_task_prompt_lists_known_findings() {
        let mut intelligence = Intelligence::default();
        intelligence.findings.push(Finding::new(
            FindingCategory::Technology,
            "Runs SAP on-prem",
            PathId::new(1, "x"),
            1,
        ));
        let mut order = order();
        order.intelligence = Arc::new(intelligence);
        order.input = Arc::new(ResearchInput {
            follow_up: Some("Which cloud?".into()),
            ..(*order.input).clone()
        });
        let prompt = task_prompt(&order);
        assert!(prompt.contains("Runs SAP on-prem"));
        assert!(prompt.contains("Follow-up question: Which cloud?"));
        assert!(prompt.contains("Industry: Manufacturing"));
    }
}
