//! Cycle engine: plans, fans out workers, merges, formats and decides
//! whether to go again.
//!
//! Each session runs on its own task. The task is the only writer of the
//! session's intelligence; workers get a read-only snapshot per cycle. The
//! handle talks to the task through stop signals, a follow-up queue and a
//! shared view that is replaced (never mutated in place) after each merge.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{EventBus, EventEnvelope, EventStream, ProgressEvent};
use super::model::{
    Assignment, ConfidenceAssessment, Intelligence, PathId, Portfolio, ResearchInput,
};
use super::output::{Dashboard, DashboardFormatter, Formatter};
use super::planner::{LlmPlanner, Plan, Planner};
use super::session::{
    CycleRecord, PathRecord, PathStatus, SessionRecord, SessionSnapshot, SessionStatus,
    StopReason, TerminalReason,
};
use super::signals::StopSignals;
use super::stop::{CycleObservation, StopDecision, StopPolicy, StopState};
use super::synthesis::{LlmMerger, MergeRequest, Merger, fallback_merge};
use super::worker::{LlmWorker, WorkOrder, Worker, WorkerResult};
use crate::actions::{ActionOutcome, ActionRegistry};
use crate::brain::Brain;
use crate::config::{EngineConfig, MAX_PARALLEL_PATHS, ScoutConfig};
use crate::error::SessionError;
use crate::persistence::{NullStore, SessionStore};
use crate::retry::RetryPolicy;

/// Runs research sessions. Cheap to clone; every session gets its own task.
#[derive(Clone)]
pub struct CycleEngine {
    planner: Arc<dyn Planner>,
    worker: Arc<dyn Worker>,
    merger: Arc<dyn Merger>,
    formatter: Arc<dyn Formatter>,
    store: Arc<dyn SessionStore>,
    portfolio: Option<Arc<Portfolio>>,
    config: EngineConfig,
    policy: StopPolicy,
    action_budget: u32,
    formatter_retry: RetryPolicy,
}

impl CycleEngine {
    pub fn new(
        planner: Arc<dyn Planner>,
        worker: Arc<dyn Worker>,
        merger: Arc<dyn Merger>,
        formatter: Arc<dyn Formatter>,
        config: &ScoutConfig,
    ) -> Self {
        Self {
            planner,
            worker,
            merger,
            formatter,
            store: Arc::new(NullStore),
            portfolio: None,
            policy: StopPolicy::from_config(&config.engine),
            config: config.engine.clone(),
            action_budget: config.worker.action_budget.max(1),
            formatter_retry: RetryPolicy::new(
                config.roles.formatter_retries,
                config.roles.retry_base_delay(),
            ),
        }
    }

    /// Wire every role to the reasoning capability.
    pub fn with_llm(brain: Arc<Brain>, actions: Arc<ActionRegistry>, config: &ScoutConfig) -> Self {
        let roles = &config.roles;
        let planner = LlmPlanner::new(
            brain.clone(),
            RetryPolicy::new(roles.planner_retries, roles.retry_base_delay()),
        );
        let worker = LlmWorker::new(
            brain.clone(),
            actions,
            RetryPolicy::new(
                config.worker.reasoning_retries,
                config.worker.retry_base_delay(),
            ),
        );
        let merger = LlmMerger::new(
            brain,
            RetryPolicy::new(roles.merger_retries, roles.retry_base_delay()),
        );
        Self::new(
            Arc::new(planner),
            Arc::new(worker),
            Arc::new(merger),
            Arc::new(DashboardFormatter::new()),
            config,
        )
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_portfolio(mut self, portfolio: Portfolio) -> Self {
        self.portfolio = Some(Arc::new(portfolio));
        self
    }

    fn max_parallel(&self) -> usize {
        self.config.max_parallel_paths.clamp(1, MAX_PARALLEL_PATHS)
    }

    /// Start a session on a new task and return its handle. Must be called
    /// from within a Tokio runtime.
    pub fn start_session(&self, input: ResearchInput) -> SessionHandle {
        let id = Uuid::new_v4();
        let record = SessionRecord::new(id, input.clone());
        let shared = Arc::new(Shared {
            id,
            bus: EventBus::new(id),
            signals: StopSignals::new(),
            view: Mutex::new(View {
                record: record.clone(),
                assessment: ConfidenceAssessment::new(),
                intelligence: Arc::new(Intelligence::default()),
                dashboard: None,
            }),
            runs_requested: AtomicU64::new(1),
        });
        let (follow_tx, follow_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = watch::channel(0u64);

        let run = SessionRun {
            record,
            input: Arc::new(input),
            intelligence: Arc::new(Intelligence::default()),
            assessment: ConfidenceAssessment::new(),
            cycle: 0,
            stop_state: StopState::default(),
        };
        let engine = self.clone();
        tokio::spawn(engine.drive(shared.clone(), run, follow_rx, finished_tx));

        SessionHandle {
            shared,
            follow_ups: follow_tx,
            finished: finished_rx,
        }
    }

    /// The session task: runs the loop, then idles waiting for follow-ups
    /// until the session is stopped, fails, or every handle is gone.
    async fn drive(
        self,
        shared: Arc<Shared>,
        mut run: SessionRun,
        mut follow_ups: mpsc::UnboundedReceiver<String>,
        finished: watch::Sender<u64>,
    ) {
        run.record.transition(SessionStatus::Running);
        shared.publish(&run);
        shared.bus.emit(ProgressEvent::SessionStarted {
            input: (*run.input).clone(),
        });
        info!(
            session_id = %shared.id,
            company = %run.input.company,
            initiative = %run.input.initiative,
            "Session started"
        );
        self.persist_session(&run.record).await;

        loop {
            let (reason, failure) = self.run_until_terminal(&shared, &mut run).await;
            self.finish(&shared, &mut run, reason, failure).await;
            finished.send_modify(|n| *n += 1);
            if reason.status().is_final() {
                break;
            }

            let question = tokio::select! {
                biased;
                _ = shared.signals.session_stopped() => break,
                question = follow_ups.recv() => match question {
                    Some(question) => question,
                    None => break,
                },
            };
            self.accept_follow_up(&shared, &mut run, question).await;
        }

        // Questions queued while the last run was ending never run.
        follow_ups.close();
        while let Ok(question) = follow_ups.try_recv() {
            shared.runs_requested.fetch_sub(1, Ordering::SeqCst);
            let status = run.record.status;
            warn!(session_id = %shared.id, question = %question, status = %status, "Follow-up rejected");
            shared.bus.emit(ProgressEvent::Error {
                message: format!("Follow-up rejected, session is {status}: {question}"),
                recoverable: false,
            });
        }

        debug!(session_id = %shared.id, "Session task finished");
        shared.bus.close();
    }

    async fn accept_follow_up(&self, shared: &Shared, run: &mut SessionRun, question: String) {
        info!(session_id = %shared.id, question = %question, "Follow-up accepted");
        run.record.reopen(&question);
        let mut input = (*run.input).clone();
        input.follow_up = Some(question.clone());
        run.input = Arc::new(input);
        run.stop_state.new_run();
        shared.publish(run);
        shared.bus.emit(ProgressEvent::FollowUpAccepted {
            question,
            next_cycle: run.cycle + 1,
        });
        self.persist_session(&run.record).await;
    }

    async fn finish(
        &self,
        shared: &Shared,
        run: &mut SessionRun,
        reason: TerminalReason,
        failure: Option<String>,
    ) {
        if let Some(message) = &failure {
            error!(session_id = %shared.id, reason = %reason, error = %message, "Session failed");
            shared.bus.emit(ProgressEvent::Error {
                message: message.clone(),
                recoverable: false,
            });
        }
        run.record.finish(reason, failure);
        shared.publish(run);
        shared.bus.emit(ProgressEvent::SessionComplete {
            status: run.record.status,
            reason,
            cycles: run.cycle,
        });
        info!(
            session_id = %shared.id,
            status = %run.record.status,
            reason = %reason,
            cycles = run.cycle,
            findings = run.intelligence.active_count(),
            "Session run complete"
        );
        self.persist_session(&run.record).await;
    }

    async fn run_until_terminal(
        &self,
        shared: &Arc<Shared>,
        run: &mut SessionRun,
    ) -> (TerminalReason, Option<String>) {
        loop {
            if shared.signals.is_session_stopped() {
                return (TerminalReason::UserRequested, None);
            }
            run.cycle += 1;
            run.record.cycle_count = run.cycle;
            shared.publish(run);
            shared.bus.emit(ProgressEvent::CycleStarted { cycle: run.cycle });
            info!(session_id = %shared.id, cycle = run.cycle, "Cycle started");

            let mut record = CycleRecord::start(shared.id, run.cycle);
            let outcome = self.run_cycle(shared, run, &mut record).await;
            record.end();
            self.persist(
                "cycle",
                self.store.record_cycle(&record),
            )
            .await;
            self.persist_session(&run.record).await;
            if let Some(terminal) = outcome {
                return terminal;
            }
        }
    }

    /// One cycle. `Some` ends the run.
    async fn run_cycle(
        &self,
        shared: &Arc<Shared>,
        run: &mut SessionRun,
        record: &mut CycleRecord,
    ) -> Option<(TerminalReason, Option<String>)> {
        let cycle = run.cycle;

        let plan = match self
            .planner
            .plan(&run.input, &run.intelligence, &run.assessment, cycle)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                record.degraded = true;
                let failure = SessionError::PlannerFailed {
                    cycle,
                    message: e.to_string(),
                };
                return Some((TerminalReason::PlannerFailed, Some(failure.to_string())));
            }
        };

        let (assignments, dropped) = self.cap_plan(&plan);
        record.assignments = assignments.clone();
        record.planner_reasoning = plan.reasoning.clone();
        record.planner_done = plan.done;
        record.truncated = dropped.len();
        shared.bus.emit(ProgressEvent::PlanCreated {
            cycle,
            assignments: assignments.clone(),
            reasoning: plan.reasoning.clone(),
            done: plan.done,
        });
        if !dropped.is_empty() {
            warn!(
                session_id = %shared.id,
                cycle,
                requested = plan.assignments.len(),
                kept = assignments.len(),
                "Plan truncated to path cap"
            );
            shared.bus.emit(ProgressEvent::PlanTruncated {
                cycle,
                requested: plan.assignments.len(),
                kept: assignments.len(),
                dropped,
            });
        }

        if shared.signals.is_session_stopped() {
            return Some((TerminalReason::UserRequested, None));
        }

        let results = self.dispatch(shared, run, &assignments).await;

        if shared.signals.is_session_stopped() {
            return Some((TerminalReason::UserRequested, None));
        }

        let failed = results
            .iter()
            .filter(|r| r.status == PathStatus::Error)
            .count();
        if !results.is_empty() && failed == results.len() {
            record.degraded = true;
            let failure = SessionError::AllWorkersFailed {
                cycle,
                count: failed,
            };
            return Some((TerminalReason::AllWorkersFailed, Some(failure.to_string())));
        }

        let contributing: Vec<WorkerResult> = results
            .iter()
            .filter(|r| r.status.contributes())
            .cloned()
            .collect();
        let unfilled: Vec<Assignment> = assignments
            .iter()
            .zip(&results)
            .filter(|(_, r)| !r.status.contributes() || r.findings.is_empty())
            .map(|(a, _)| a.clone())
            .collect();

        let request = MergeRequest {
            cycle,
            input: &run.input,
            results: &contributing,
            unfilled: &unfilled,
            proposed: &plan.discovered,
            prior: &run.intelligence,
            prior_assessment: &run.assessment,
            initiative_limit: self.config.max_discovered_initiatives,
        };
        let outcome = match self.merger.merge(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %shared.id, cycle, error = %e, "Merger failed, concatenating raw findings");
                shared.bus.emit(ProgressEvent::Error {
                    message: e.to_string(),
                    recoverable: true,
                });
                fallback_merge(request)
            }
        };

        run.intelligence = Arc::new(outcome.intelligence);
        run.assessment = outcome.assessment;
        record.assessment = Some(run.assessment.clone());
        record.new_findings = outcome.new_findings;
        record.unsynthesized = outcome.unsynthesized;
        shared.publish(run);

        shared.bus.emit(ProgressEvent::SynthesisComplete {
            cycle,
            new_findings: outcome.new_findings,
            unsynthesized: outcome.unsynthesized,
            assessment: run.assessment.clone(),
        });
        shared.bus.emit(ProgressEvent::IntelligenceUpdated {
            cycle,
            active_findings: run.intelligence.active_count(),
            contradictions: run.intelligence.contradictions.len(),
            assessment: run.assessment.clone(),
        });
        for initiative in outcome.discovered {
            info!(session_id = %shared.id, name = %initiative.name, "Initiative discovered");
            shared
                .bus
                .emit(ProgressEvent::InitiativeDiscovered { initiative });
        }
        self.persist(
            "findings",
            self.store
                .record_findings(shared.id, &run.intelligence.findings),
        )
        .await;

        if shared.signals.is_session_stopped() {
            return Some((TerminalReason::UserRequested, None));
        }

        let every = self.config.dashboard_every_n_cycles.max(1);
        let mut formatted = false;
        if cycle % every == 0 {
            self.format(shared, run, cycle).await;
            formatted = true;
        }

        let decision = self.policy.evaluate(
            &mut run.stop_state,
            &CycleObservation {
                cycle,
                planner_done: plan.done,
                assessment: &run.assessment,
                new_findings: outcome.new_findings,
                stop_requested: shared.signals.is_session_stopped(),
            },
        );
        debug!(session_id = %shared.id, cycle, ?decision, "Stop condition evaluated");
        match decision {
            StopDecision::Continue => None,
            StopDecision::Stop(reason) => {
                if !formatted && reason != TerminalReason::UserRequested {
                    self.format(shared, run, cycle).await;
                }
                Some((reason, None))
            }
        }
    }

    /// Keep at most the path cap, highest priority first (stable), and make
    /// assignment ids unique. Returns the kept assignments and the dropped
    /// topics.
    fn cap_plan(&self, plan: &Plan) -> (Vec<Assignment>, Vec<String>) {
        let mut ranked = plan.assignments.clone();
        ranked.sort_by_key(|a| a.priority);
        let dropped = ranked
            .split_off(ranked.len().min(MAX_PARALLEL_PATHS))
            .into_iter()
            .map(|a| a.topic)
            .collect();

        let mut seen = HashSet::new();
        for (index, assignment) in ranked.iter_mut().enumerate() {
            if assignment.id.trim().is_empty() || !seen.insert(assignment.id.clone()) {
                assignment.id = format!("path_{}", index + 1);
                while !seen.insert(assignment.id.clone()) {
                    assignment.id.push('_');
                }
            }
        }
        (ranked, dropped)
    }

    /// Run every assignment, at most `max_parallel` at a time. Results come
    /// back in assignment order.
    async fn dispatch(
        &self,
        shared: &Arc<Shared>,
        run: &SessionRun,
        assignments: &[Assignment],
    ) -> Vec<WorkerResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel()));
        let mut pending = FuturesUnordered::new();

        for (index, assignment) in assignments.iter().enumerate() {
            let path_id = PathId::new(run.cycle, &assignment.id);
            let signal = shared.signals.register_path(&path_id);
            let order = WorkOrder {
                session_id: shared.id,
                cycle: run.cycle,
                path_id: path_id.clone(),
                input: run.input.clone(),
                assignment: assignment.clone(),
                intelligence: run.intelligence.clone(),
            };
            let worker = self.worker.clone();
            let semaphore = semaphore.clone();
            let task_shared = shared.clone();
            let budget = self.action_budget;

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return WorkerResult::failed(order.path_id, "dispatch closed");
                };
                task_shared.bus.emit(ProgressEvent::PathStarted {
                    cycle: order.cycle,
                    path_id: order.path_id.clone(),
                    topic: order.assignment.topic.clone(),
                });
                worker.execute(order, budget, signal).await
            });
            pending.push(async move { (index, path_id, handle.await) });
        }

        let mut results: Vec<Option<WorkerResult>> = vec![None; assignments.len()];
        while let Some((index, path_id, joined)) = pending.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(path_id = %path_id, error = %e, "Worker task panicked");
                    WorkerResult::failed(path_id.clone(), format!("worker task failed: {e}"))
                }
            };
            shared.signals.release_path(&path_id);
            self.report_path(shared, run.cycle, &assignments[index], &result)
                .await;
            results[index] = Some(result);
        }
        shared.signals.finish_cycle(run.cycle);
        results.into_iter().flatten().collect()
    }

    async fn report_path(
        &self,
        shared: &Shared,
        cycle: u32,
        assignment: &Assignment,
        result: &WorkerResult,
    ) {
        for trace in result.failed_actions() {
            if let ActionOutcome::Failure { kind, message } = &trace.outcome {
                shared.bus.emit(ProgressEvent::ActionFailed {
                    cycle,
                    path_id: result.path_id.clone(),
                    action: trace.action.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }

        let findings = result.findings.len();
        let stopped = match (result.status, result.stop_reason) {
            (PathStatus::Stopped, reason) => Some(reason.unwrap_or(StopReason::User)),
            (PathStatus::Error, _) => Some(StopReason::Error),
            (PathStatus::Exhausted, Some(StopReason::Budget)) => Some(StopReason::Budget),
            _ => None,
        };
        match stopped {
            Some(reason) => {
                info!(
                    session_id = %shared.id,
                    path_id = %result.path_id,
                    ?reason,
                    findings,
                    "Path stopped"
                );
                shared.bus.emit(ProgressEvent::PathStopped {
                    cycle,
                    path_id: result.path_id.clone(),
                    reason,
                    findings,
                    message: result.error.clone(),
                });
            }
            None => {
                shared.bus.emit(ProgressEvent::PathCompleted {
                    cycle,
                    path_id: result.path_id.clone(),
                    status: result.status,
                    findings,
                    action_calls: result.action_calls,
                });
            }
        }

        let record = PathRecord {
            session_id: shared.id,
            cycle,
            path_id: result.path_id.clone(),
            assignment: assignment.clone(),
            status: result.status,
            action_calls: result.action_calls,
            finding_count: findings,
            stop_reason: result.stop_reason,
            error: result.error.clone(),
        };
        self.persist("path", self.store.record_path(&record)).await;
    }

    /// Formatter failures are logged; the previous dashboard stays current.
    async fn format(&self, shared: &Shared, run: &SessionRun, cycle: u32) {
        let portfolio = self.portfolio.as_deref();
        let formatted = self
            .formatter_retry
            .run("formatter", || {
                self.formatter
                    .format(&run.input, &run.intelligence, &run.assessment, portfolio)
            })
            .await;
        match formatted {
            Ok(dashboard) => {
                let dashboard = Arc::new(dashboard);
                shared.lock().dashboard = Some(dashboard.clone());
                shared.bus.emit(ProgressEvent::DashboardUpdated {
                    cycle,
                    dashboard: Box::new((*dashboard).clone()),
                });
            }
            Err(e) => {
                warn!(session_id = %shared.id, cycle, error = %e, "Formatter failed, keeping previous dashboard");
                shared.bus.emit(ProgressEvent::Error {
                    message: e.to_string(),
                    recoverable: true,
                });
            }
        }
    }

    async fn persist_session(&self, record: &SessionRecord) {
        self.persist("session", self.store.record_session(record))
            .await;
    }

    /// Persistence is best-effort: failures are logged and dropped.
    async fn persist(
        &self,
        what: &'static str,
        write: impl std::future::Future<Output = crate::error::Result<()>>,
    ) {
        if let Err(e) = write.await {
            warn!(record = what, error = %e, "Failed to persist record");
        }
    }
}

/// State owned by the session task.
struct SessionRun {
    record: SessionRecord,
    input: Arc<ResearchInput>,
    intelligence: Arc<Intelligence>,
    assessment: ConfidenceAssessment,
    cycle: u32,
    stop_state: StopState,
}

/// Read-only copies published for the handle.
struct View {
    record: SessionRecord,
    assessment: ConfidenceAssessment,
    intelligence: Arc<Intelligence>,
    dashboard: Option<Arc<Dashboard>>,
}

struct Shared {
    id: Uuid,
    bus: EventBus,
    signals: StopSignals,
    view: Mutex<View>,
    /// Runs asked for so far: the first one plus every accepted follow-up.
    runs_requested: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, View> {
        self.view.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, run: &SessionRun) {
        let mut view = self.lock();
        view.record = run.record.clone();
        view.assessment = run.assessment.clone();
        view.intelligence = run.intelligence.clone();
    }
}

/// Control surface and read access for one session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
    follow_ups: mpsc::UnboundedSender<String>,
    finished: watch::Receiver<u64>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Ask the session to stop. Returns `false` if it was already asked.
    pub fn stop(&self) -> bool {
        let first = self.shared.signals.stop_session();
        if first {
            info!(session_id = %self.shared.id, "Stop requested");
        }
        first
    }

    /// Ask one path to stop. Its partial findings still reach the merger.
    pub fn stop_path(&self, path_id: &PathId) {
        info!(session_id = %self.shared.id, path_id = %path_id, "Path stop requested");
        self.shared.signals.stop_path(path_id);
    }

    /// Queue a follow-up question. It runs once the current run completes.
    /// If that run ends the session instead, the question is reported back
    /// as an `Error` event.
    pub fn inject_follow_up(&self, question: impl Into<String>) -> Result<(), SessionError> {
        let status = self.status();
        if status.is_final() || self.shared.signals.is_session_stopped() {
            return Err(SessionError::Terminal {
                status: status.to_string(),
            });
        }
        self.shared.runs_requested.fetch_add(1, Ordering::SeqCst);
        self.follow_ups.send(question.into()).map_err(|_| {
            self.shared.runs_requested.fetch_sub(1, Ordering::SeqCst);
            SessionError::Closed
        })
    }

    /// Ordered progress events, starting from the first.
    pub fn subscribe(&self) -> EventStream {
        self.shared.bus.subscribe()
    }

    /// Every event emitted so far.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.shared.bus.history()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.lock().record.status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let view = self.shared.lock();
        SessionSnapshot {
            id: self.shared.id,
            status: view.record.status,
            cycle_count: view.record.cycle_count,
            terminal_reason: view.record.terminal_reason,
            error: view.record.error.clone(),
            assessment: view.assessment.clone(),
            active_findings: view.intelligence.active_count(),
        }
    }

    pub fn record(&self) -> SessionRecord {
        self.shared.lock().record.clone()
    }

    pub fn intelligence(&self) -> Arc<Intelligence> {
        self.shared.lock().intelligence.clone()
    }

    pub fn assessment(&self) -> ConfidenceAssessment {
        self.shared.lock().assessment.clone()
    }

    pub fn dashboard(&self) -> Option<Arc<Dashboard>> {
        self.shared.lock().dashboard.clone()
    }

    pub fn active_paths(&self) -> Vec<PathId> {
        self.shared.signals.active_paths()
    }

    /// Resolves when every run requested so far has finished, or the
    /// session task has ended.
    pub async fn wait(&self) -> SessionSnapshot {
        let target = self.shared.runs_requested.load(Ordering::SeqCst);
        let mut finished = self.finished.clone();
        // An error means the task is gone, which is also done.
        let _ = finished.wait_for(|n| *n >= target).await;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::model::Priority;
    use crate::research::synthesis::HeuristicMerger;

    struct NoPlanner;

    #[async_trait::async_trait]
    impl Planner for NoPlanner {
        async fn plan(
            &self,
            _input: &ResearchInput,
            _intelligence: &Intelligence,
            _assessment: &ConfidenceAssessment,
            _cycle: u32,
        ) -> Result<Plan, crate::error::RoleError> {
            Ok(Plan::new(Vec::new()))
        }
    }

    struct NoWorker;

    #[async_trait::async_trait]
    impl Worker for NoWorker {
        async fn execute(
            &self,
            order: WorkOrder,
            _action_budget: u32,
            _stop: crate::research::signals::PathSignal,
        ) -> WorkerResult {
            WorkerResult::completed(order.path_id, Vec::new())
        }
    }

    fn engine() -> CycleEngine {
        CycleEngine::new(
            Arc::new(NoPlanner),
            Arc::new(NoWorker),
            Arc::new(HeuristicMerger::new()),
            Arc::new(DashboardFormatter::new()),
            &ScoutConfig::default(),
        )
    }

    #[test]
    fn test_cap_plan_keeps_highest_priority_in_order() {
        let plan = Plan::new(vec![
            Assignment::new("a", "A").with_priority(Priority::Low),
            Assignment::new("b", "B"),
            Assignment::new("c", "C").with_priority(Priority::High),
            Assignment::new("d", "D"),
            Assignment::new("e", "E").with_priority(Priority::Low),
            Assignment::new("f", "F").with_priority(Priority::High),
            Assignment::new("g", "G"),
        ]);
        let (kept, dropped) = engine().cap_plan(&plan);
        let ids: Vec<&str> = kept.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "f", "b", "d", "g"]);
        assert_eq!(dropped, vec!["A".to_string(), "E".to_string()]);
    }

    #[test]
    fn test_cap_plan_makes_ids_unique() {
        let plan = Plan::new(vec![
            Assignment::new("x", "One"),
            Assignment::new("x", "Two"),
            Assignment::new("", "Three"),
        ]);
        let (kept, dropped) = engine().cap_plan(&plan);
        assert!(dropped.is_empty());
        let ids: HashSet<&str> = kept.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_plans_end_in_diminishing_returns() {
        let handle = engine().start_session(ResearchInput::new("Acme Corp", "", "cloud"));
        let snapshot = handle.wait().await;
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(
            snapshot.terminal_reason,
            Some(TerminalReason::DiminishingReturns)
        );
        assert_eq!(snapshot.cycle_count, 2);
        assert!(handle.dashboard().is_some());
    }
}
