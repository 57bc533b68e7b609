//! Action capabilities: registration, definitions for the reasoning
//! capability, and timeout-bounded execution.
//!
//! `ActionRegistry::run` never returns an error. Every failure (unknown
//! action, timeout, unreachable source, malformed payload) comes back as an
//! [`ActionOutcome::Failure`] so the worker can feed it into its conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::types::ActionDefinition;

/// Trait implemented by every action capability (search, fetch, lookup).
#[async_trait]
pub trait ActionCapability: Send + Sync {
    /// The unique name of this action.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the action's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the action, returning structured data.
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ActionError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }
}

/// Classification of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFailureKind {
    NotFound,
    InvalidArguments,
    Timeout,
    Unreachable,
    Malformed,
    Failed,
}

impl std::fmt::Display for ActionFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionFailureKind::NotFound => "not_found",
            ActionFailureKind::InvalidArguments => "invalid_arguments",
            ActionFailureKind::Timeout => "timeout",
            ActionFailureKind::Unreachable => "unreachable",
            ActionFailureKind::Malformed => "malformed",
            ActionFailureKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The typed result of running an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Success {
        data: serde_json::Value,
    },
    Failure {
        kind: ActionFailureKind,
        message: String,
    },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success { .. })
    }

    /// Text fed back to the reasoning capability.
    pub fn to_feedback(&self) -> String {
        match self {
            ActionOutcome::Success { data } => data.to_string(),
            ActionOutcome::Failure { kind, message } => {
                format!("This action failed ({kind}): {message}")
            }
        }
    }
}

impl From<ActionError> for ActionOutcome {
    fn from(err: ActionError) -> Self {
        let kind = match &err {
            ActionError::NotFound { .. } => ActionFailureKind::NotFound,
            ActionError::InvalidArguments { .. } => ActionFailureKind::InvalidArguments,
            ActionError::Timeout { .. } => ActionFailureKind::Timeout,
            ActionError::Unreachable { .. } => ActionFailureKind::Unreachable,
            ActionError::Malformed { .. } => ActionFailureKind::Malformed,
            ActionError::ExecutionFailed { .. } | ActionError::AlreadyRegistered { .. } => {
                ActionFailureKind::Failed
            }
        };
        ActionOutcome::Failure {
            kind,
            message: err.to_string(),
        }
    }
}

/// Holds the registered action capabilities and runs them with a timeout.
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn ActionCapability>>,
    max_timeout: Duration,
}

impl ActionRegistry {
    /// `max_timeout` caps every capability's own timeout.
    pub fn new(max_timeout: Duration) -> Self {
        Self {
            actions: BTreeMap::new(),
            max_timeout,
        }
    }

    /// Register an action. Fails if the name is taken.
    pub fn register(&mut self, action: Arc<dyn ActionCapability>) -> Result<(), ActionError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(ActionError::AlreadyRegistered { name });
        }
        debug!(action = %name, "Registering action");
        self.actions.insert(name, action);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), ActionError> {
        if self.actions.remove(name).is_none() {
            return Err(ActionError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Definitions for the reasoning capability, sorted by name.
    pub fn definitions(&self) -> Vec<ActionDefinition> {
        self.actions
            .values()
            .map(|action| ActionDefinition {
                name: action.name().to_string(),
                description: action.description().to_string(),
                parameters: action.parameters_schema(),
            })
            .collect()
    }

    /// Definitions restricted to `names`. An empty filter means every action.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ActionDefinition> {
        let known: Vec<&String> = names.iter().filter(|n| self.contains(n)).collect();
        if known.is_empty() {
            return self.definitions();
        }
        self.definitions()
            .into_iter()
            .filter(|d| known.iter().any(|n| **n == d.name))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Effective timeout for `action`.
    pub fn timeout_for(&self, action: &dyn ActionCapability) -> Duration {
        action.timeout().min(self.max_timeout)
    }

    /// Run an action by name. Never fails; failures are returned as values.
    pub async fn run(&self, name: &str, args: serde_json::Value) -> ActionOutcome {
        let Some(action) = self.actions.get(name) else {
            warn!(action = %name, "Requested unknown action");
            return ActionError::NotFound {
                name: name.to_string(),
            }
            .into();
        };

        let timeout = self.timeout_for(action.as_ref());
        info!(action = %name, timeout_secs = timeout.as_secs(), "Running action");

        match tokio::time::timeout(timeout, action.execute(args)).await {
            Ok(Ok(data)) => ActionOutcome::Success { data },
            Ok(Err(e)) => {
                warn!(action = %name, error = %e, "Action failed");
                e.into()
            }
            Err(_) => {
                warn!(action = %name, timeout_secs = timeout.as_secs(), "Action timed out");
                ActionError::Timeout {
                    name: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
                .into()
            }
        }
    }
}
