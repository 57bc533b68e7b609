//! Error types for the Scout core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the reasoning capability, action capabilities, role adapters,
//! sessions, and configuration.

use std::path::PathBuf;

/// Top-level error type for the Scout core library.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Role error: {0}")]
    Role(#[from] RoleError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from reasoning-capability interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from action capability registration and execution.
///
/// These never escape `ActionRegistry::run`; they are folded into an
/// `ActionOutcome::Failure` and fed back into the worker's conversation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("Action not found: {name}")]
    NotFound { name: String },

    #[error("Action already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for action '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Action '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Action '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    #[error("Source unreachable for action '{name}': {message}")]
    Unreachable { name: String, message: String },

    #[error("Malformed response from action '{name}': {message}")]
    Malformed { name: String, message: String },
}

/// Errors from the planner, merger, and formatter role adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoleError {
    #[error("{role} call failed: {source}")]
    Capability {
        role: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("{role} output violated its schema: {message}")]
    Schema { role: &'static str, message: String },

    #[error("{role} failed: {message}")]
    Failed { role: &'static str, message: String },
}

impl RoleError {
    /// Name of the role that produced this error.
    pub fn role(&self) -> &'static str {
        match self {
            RoleError::Capability { role, .. }
            | RoleError::Schema { role, .. }
            | RoleError::Failed { role, .. } => role,
        }
    }
}

/// Errors surfaced at the session level.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("All {count} workers in cycle {cycle} failed")]
    AllWorkersFailed { cycle: u32, count: usize },

    #[error("Planner failed in cycle {cycle}: {message}")]
    PlannerFailed { cycle: u32, message: String },

    #[error("Session is terminal with status '{status}'")]
    Terminal { status: String },

    #[error("Session task has shut down")]
    Closed,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `ScoutError`.
pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = ScoutError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_action() {
        let err = ScoutError::Action(ActionError::Timeout {
            name: "web_fetch".into(),
            timeout_secs: 15,
        });
        assert_eq!(
            err.to_string(),
            "Action error: Action 'web_fetch' timed out after 15s"
        );
    }

    #[test]
    fn test_role_error_carries_role_name() {
        let err = RoleError::Capability {
            role: "planner",
            source: LlmError::Timeout { timeout_secs: 30 },
        };
        assert_eq!(err.role(), "planner");
        assert_eq!(
            err.to_string(),
            "planner call failed: Request timed out after 30s"
        );

        let err = RoleError::Schema {
            role: "merger",
            message: "missing 'assessment'".into(),
        };
        assert_eq!(err.role(), "merger");
    }

    #[test]
    fn test_session_error_display() {
        let err = ScoutError::Session(SessionError::AllWorkersFailed { cycle: 3, count: 4 });
        assert_eq!(
            err.to_string(),
            "Session error: All 4 workers in cycle 3 failed"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = ScoutError::Config(ConfigError::Invalid {
            message: "engine.max_parallel_paths must be between 1 and 5".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: engine.max_parallel_paths must be between 1 and 5"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScoutError = io_err.into();
        assert!(matches!(err, ScoutError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ScoutError = serde_err.into();
        assert!(matches!(err, ScoutError::Serialization(_)));
    }
}
