//! Progress events and the per-session event bus.
//!
//! Every event is stamped with the session id, a per-session sequence number
//! and a timestamp. Each subscriber gets the full ordered sequence: history
//! first, then live events, over its own unbounded channel so a slow
//! observer never loses events or holds up the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

use super::model::{Assignment, ConfidenceAssessment, DiscoveredInitiative, PathId, ResearchInput};
use super::output::Dashboard;
use super::session::{PathStatus, SessionStatus, StopReason, TerminalReason};
use crate::actions::ActionFailureKind;

/// Events emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    SessionStarted {
        input: ResearchInput,
    },
    CycleStarted {
        cycle: u32,
    },
    PlanCreated {
        cycle: u32,
        assignments: Vec<Assignment>,
        reasoning: String,
        done: bool,
    },
    /// The planner asked for more paths than the cap allows.
    PlanTruncated {
        cycle: u32,
        requested: usize,
        kept: usize,
        dropped: Vec<String>,
    },
    PathStarted {
        cycle: u32,
        path_id: PathId,
        topic: String,
    },
    PathCompleted {
        cycle: u32,
        path_id: PathId,
        status: PathStatus,
        findings: usize,
        action_calls: u32,
    },
    PathStopped {
        cycle: u32,
        path_id: PathId,
        reason: StopReason,
        findings: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    ActionFailed {
        cycle: u32,
        path_id: PathId,
        action: String,
        kind: ActionFailureKind,
        message: String,
    },
    SynthesisComplete {
        cycle: u32,
        new_findings: usize,
        unsynthesized: bool,
        assessment: ConfidenceAssessment,
    },
    IntelligenceUpdated {
        cycle: u32,
        active_findings: usize,
        contradictions: usize,
        assessment: ConfidenceAssessment,
    },
    DashboardUpdated {
        cycle: u32,
        dashboard: Box<Dashboard>,
    },
    InitiativeDiscovered {
        initiative: DiscoveredInitiative,
    },
    FollowUpAccepted {
        question: String,
        next_cycle: u32,
    },
    SessionComplete {
        status: SessionStatus,
        reason: TerminalReason,
        cycles: u32,
    },
    Error {
        message: String,
        recoverable: bool,
    },
}

impl ProgressEvent {
    /// Short event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::SessionStarted { .. } => "session_started",
            ProgressEvent::CycleStarted { .. } => "cycle_started",
            ProgressEvent::PlanCreated { .. } => "plan_created",
            ProgressEvent::PlanTruncated { .. } => "plan_truncated",
            ProgressEvent::PathStarted { .. } => "path_started",
            ProgressEvent::PathCompleted { .. } => "path_completed",
            ProgressEvent::PathStopped { .. } => "path_stopped",
            ProgressEvent::ActionFailed { .. } => "action_failed",
            ProgressEvent::SynthesisComplete { .. } => "synthesis_complete",
            ProgressEvent::IntelligenceUpdated { .. } => "intelligence_updated",
            ProgressEvent::DashboardUpdated { .. } => "dashboard_updated",
            ProgressEvent::InitiativeDiscovered { .. } => "initiative_discovered",
            ProgressEvent::FollowUpAccepted { .. } => "follow_up_accepted",
            ProgressEvent::SessionComplete { .. } => "session_complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn is_session_complete(&self) -> bool {
        matches!(self, ProgressEvent::SessionComplete { .. })
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub session_id: Uuid,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// An ordered stream of one session's events.
pub type EventStream = UnboundedReceiverStream<EventEnvelope>;

struct BusInner {
    next_seq: u64,
    history: Vec<EventEnvelope>,
    subscribers: Vec<mpsc::UnboundedSender<EventEnvelope>>,
    closed: bool,
}

/// Single ordered event sink per session with broadcast fan-out.
pub struct EventBus {
    session_id: Uuid,
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            inner: Mutex::new(BusInner {
                next_seq: 1,
                history: Vec::new(),
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stamp and deliver an event. Returns its sequence number.
    pub fn emit(&self, event: ProgressEvent) -> u64 {
        let mut inner = self.lock();
        let envelope = EventEnvelope {
            session_id: self.session_id,
            seq: inner.next_seq,
            timestamp: Utc::now(),
            event,
        };
        inner.next_seq += 1;
        debug!(
            session_id = %self.session_id,
            seq = envelope.seq,
            event = envelope.event.kind(),
            "Progress event"
        );
        inner
            .subscribers
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        let seq = envelope.seq;
        inner.history.push(envelope);
        seq
    }

    /// Subscribe. The stream replays every event emitted so far, then
    /// follows live events until the bus is closed.
    pub fn subscribe(&self) -> EventStream {
        let mut inner = self.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        for envelope in &inner.history {
            // The receiver is alive here, so this cannot fail.
            let _ = tx.send(envelope.clone());
        }
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        UnboundedReceiverStream::new(rx)
    }

    /// End every subscriber's stream. Later subscribers get history only.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn history(&self) -> Vec<EventEnvelope> {
        self.lock().history.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn bus() -> EventBus {
        EventBus::new(Uuid::new_v4())
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let bus = bus();
        assert_eq!(bus.emit(ProgressEvent::CycleStarted { cycle: 1 }), 1);
        assert_eq!(bus.emit(ProgressEvent::CycleStarted { cycle: 2 }), 2);
        let seqs: Vec<u64> = bus.history().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_history_then_live() {
        let bus = bus();
        bus.emit(ProgressEvent::CycleStarted { cycle: 1 });
        let mut stream = bus.subscribe();
        bus.emit(ProgressEvent::CycleStarted { cycle: 2 });
        bus.close();

        let events: Vec<EventEnvelope> = (&mut stream).collect().await;
        let cycles: Vec<u32> = events
            .iter()
            .map(|e| match e.event {
                ProgressEvent::CycleStarted { cycle } => cycle,
                _ => 0,
            })
            .collect();
        assert_eq!(cycles, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_same_sequence() {
        let bus = bus();
        let a = bus.subscribe();
        let b = bus.subscribe();
        for cycle in 1..=3 {
            bus.emit(ProgressEvent::CycleStarted { cycle });
        }
        bus.close();

        let a: Vec<u64> = a.map(|e| e.seq).collect().await;
        let b: Vec<u64> = b.map(|e| e.seq).collect().await;
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = bus();
        let stream = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(stream);
        bus.emit(ProgressEvent::CycleStarted { cycle: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_envelope_serializes_flat() {
        let envelope = EventEnvelope {
            session_id: Uuid::nil(),
            seq: 7,
            timestamp: Utc::now(),
            event: ProgressEvent::PathStopped {
                cycle: 2,
                path_id: PathId::new(2, "path_1"),
                reason: StopReason::User,
                findings: 1,
                message: None,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "path_stopped");
        assert_eq!(json["reason"], "user");
        assert_eq!(json["path_id"], "c2-path_1");
        assert_eq!(json["seq"], 7);
        assert_eq!(envelope.event.kind(), "path_stopped");
    }
}
