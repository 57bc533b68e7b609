//! Company research: a repeating Planner → Workers → Merger → Formatter
//! cycle that builds up sales intelligence about one initiative.
//!
//! [`CycleEngine`] runs sessions; [`SessionHandle`] controls one and exposes
//! its progress events, intelligence and dashboard.

pub mod contradiction;
pub mod engine;
pub mod events;
pub mod model;
pub mod output;
pub mod planner;
pub mod session;
pub mod signals;
pub mod stop;
pub mod synthesis;
pub mod worker;

pub use contradiction::ContradictionDetector;
pub use engine::{CycleEngine, SessionHandle};
pub use events::{EventBus, EventEnvelope, EventStream, ProgressEvent};
pub use model::{
    Assignment, ConfidenceAssessment, ConfidenceLevel, Contradiction, ContradictionKind,
    DiscoveredInitiative, Finding, FindingCategory, FindingStatus, Gap, Intelligence, PathId,
    Portfolio, PortfolioItem, Priority, ResearchInput,
};
pub use output::{Dashboard, DashboardFormatter, Formatter};
pub use planner::{LlmPlanner, Plan, Planner};
pub use session::{
    CycleRecord, PathRecord, PathStatus, SessionRecord, SessionSnapshot, SessionStatus,
    StopReason, TerminalReason,
};
pub use signals::{PathSignal, StopSignals};
pub use stop::{StopDecision, StopPolicy};
pub use synthesis::{HeuristicMerger, LlmMerger, MergeOutcome, MergeRequest, Merger};
pub use worker::{LlmWorker, WorkOrder, Worker, WorkerResult};
