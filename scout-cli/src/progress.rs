//! Renders progress events as terminal lines on stderr.

use scout_core::research::{ConfidenceAssessment, EventStream, ProgressEvent};
use tokio_stream::StreamExt;

/// One line for an event, or `None` for events not worth showing.
pub fn describe(event: &ProgressEvent) -> Option<String> {
    let line = match event {
        ProgressEvent::SessionStarted { input } => {
            format!("Researching {}: {}", input.company, input.initiative)
        }
        ProgressEvent::CycleStarted { cycle } => format!("\x1b[1mCycle {cycle}\x1b[0m"),
        ProgressEvent::PlanCreated {
            assignments, done, ..
        } => {
            if *done && assignments.is_empty() {
                "  plan: nothing left to research".to_string()
            } else {
                format!("  plan: {} path(s)", assignments.len())
            }
        }
        ProgressEvent::PlanTruncated {
            requested, kept, ..
        } => format!("  \x1b[33mplan trimmed from {requested} to {kept} paths\x1b[0m"),
        ProgressEvent::PathStarted { path_id, topic, .. } => {
            format!("  \x1b[36m[{path_id}]\x1b[0m {topic}")
        }
        ProgressEvent::PathCompleted {
            path_id,
            status,
            findings,
            action_calls,
            ..
        } => format!(
            "  \x1b[90m[{path_id}] {status}: {findings} finding(s), {action_calls} action call(s)\x1b[0m"
        ),
        ProgressEvent::PathStopped {
            path_id,
            reason,
            findings,
            ..
        } => format!("  \x1b[33m[{path_id}] stopped ({reason}) with {findings} finding(s)\x1b[0m"),
        ProgressEvent::ActionFailed {
            path_id,
            action,
            kind,
            ..
        } => format!("  \x1b[90m[{path_id}] {action} failed: {kind}\x1b[0m"),
        ProgressEvent::SynthesisComplete {
            new_findings,
            unsynthesized,
            assessment,
            ..
        } => {
            let note = if *unsynthesized { " (unsynthesized)" } else { "" };
            format!(
                "  merged {new_findings} new finding(s){note}: {}",
                confidence_line(assessment)
            )
        }
        ProgressEvent::InitiativeDiscovered { initiative } => {
            format!("  \x1b[35mdiscovered initiative:\x1b[0m {}", initiative.name)
        }
        ProgressEvent::FollowUpAccepted { question, .. } => format!("Follow-up: {question}"),
        ProgressEvent::SessionComplete {
            status,
            reason,
            cycles,
        } => format!("Session {status} after {cycles} cycle(s): {reason}"),
        ProgressEvent::Error {
            message,
            recoverable,
        } => {
            let color = if *recoverable { "33" } else { "31" };
            format!("  \x1b[{color}m{message}\x1b[0m")
        }
        ProgressEvent::IntelligenceUpdated { .. } | ProgressEvent::DashboardUpdated { .. } => {
            return None;
        }
    };
    Some(line)
}

fn confidence_line(assessment: &ConfidenceAssessment) -> String {
    assessment
        .iter()
        .map(|(category, level)| format!("{category}={level}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print events until the stream ends.
pub async fn render(mut events: EventStream) {
    while let Some(envelope) = events.next().await {
        if let Some(line) = describe(&envelope.event) {
            eprintln!("{line}");
        }
    }
}
