//! Session, cycle and path records.
//!
//! These are the durable shapes handed to the persistence boundary and the
//! read-only views exposed through the session handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Assignment, ConfidenceAssessment, PathId, ResearchInput};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        }
    }

    /// Stopped and failed sessions never run again. Completed sessions can
    /// still take a follow-up.
    pub fn is_final(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run of the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    PlannerSatisfied,
    DiminishingReturns,
    MaxCycles,
    UserRequested,
    AllWorkersFailed,
    PlannerFailed,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::PlannerSatisfied => "planner_satisfied",
            TerminalReason::DiminishingReturns => "diminishing_returns",
            TerminalReason::MaxCycles => "max_cycles",
            TerminalReason::UserRequested => "user_requested",
            TerminalReason::AllWorkersFailed => "all_workers_failed",
            TerminalReason::PlannerFailed => "planner_failed",
        }
    }

    /// The session status this reason leaves behind.
    pub fn status(&self) -> SessionStatus {
        match self {
            TerminalReason::PlannerSatisfied
            | TerminalReason::DiminishingReturns
            | TerminalReason::MaxCycles => SessionStatus::Completed,
            TerminalReason::UserRequested => SessionStatus::Stopped,
            TerminalReason::AllWorkersFailed | TerminalReason::PlannerFailed => {
                SessionStatus::Failed
            }
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStatus {
    Active,
    Completed,
    Stopped,
    Exhausted,
    Error,
}

impl PathStatus {
    /// Whether the path's findings may be merged.
    pub fn contributes(&self) -> bool {
        !matches!(self, PathStatus::Error | PathStatus::Active)
    }
}

impl std::fmt::Display for PathStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PathStatus::Active => "active",
            PathStatus::Completed => "completed",
            PathStatus::Stopped => "stopped",
            PathStatus::Exhausted => "exhausted",
            PathStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Why a path stopped before completing normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    User,
    Budget,
    Error,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::User => "user",
            StopReason::Budget => "budget",
            StopReason::Error => "error",
        };
        f.write_str(s)
    }
}

/// Durable record of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub input: ResearchInput,
    pub status: SessionStatus,
    pub cycle_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<TerminalReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub follow_ups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: Uuid, input: ResearchInput) -> Self {
        let now = Utc::now();
        Self {
            id,
            input,
            status: SessionStatus::Pending,
            cycle_count: 0,
            terminal_reason: None,
            error: None,
            follow_ups: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record the end of a run.
    pub fn finish(&mut self, reason: TerminalReason, error: Option<String>) {
        self.terminal_reason = Some(reason);
        self.error = error;
        self.transition(reason.status());
    }

    /// Reopen a completed session for a follow-up.
    pub fn reopen(&mut self, question: &str) {
        self.follow_ups.push(question.to_string());
        self.terminal_reason = None;
        self.transition(SessionStatus::Running);
    }
}

/// Durable record of one cycle. Immutable once `ended_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub session_id: Uuid,
    pub number: u32,
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub planner_reasoning: String,
    pub planner_done: bool,
    /// Assignments dropped by the five-path cap.
    #[serde(default)]
    pub truncated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<ConfidenceAssessment>,
    /// New non-duplicate findings merged in this cycle.
    #[serde(default)]
    pub new_findings: usize,
    #[serde(default)]
    pub unsynthesized: bool,
    #[serde(default)]
    pub degraded: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CycleRecord {
    pub fn start(session_id: Uuid, number: u32) -> Self {
        Self {
            session_id,
            number,
            assignments: Vec::new(),
            planner_reasoning: String::new(),
            planner_done: false,
            truncated: 0,
            assessment: None,
            new_findings: 0,
            unsynthesized: false,
            degraded: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn end(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }
}

/// Durable record of one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub session_id: Uuid,
    pub cycle: u32,
    pub path_id: PathId,
    pub assignment: Assignment,
    pub status: PathStatus,
    pub action_calls: u32,
    pub finding_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of a session for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: SessionStatus,
    pub cycle_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<TerminalReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub assessment: ConfidenceAssessment,
    pub active_findings: usize,
}
