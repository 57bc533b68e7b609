//! # Scout Core
//!
//! Core library for Scout, a company research engine.
//! Provides the research cycle engine, role adapters over a reasoning
//! capability, the action registry, stop policy, configuration and the
//! persistence boundary.

pub mod actions;
pub mod brain;
pub mod config;
pub mod error;
pub mod persistence;
pub mod providers;
pub mod research;
pub mod retry;
pub mod types;

// Re-export commonly used types at the crate root.
pub use actions::{ActionCapability, ActionFailureKind, ActionOutcome, ActionRegistry};
pub use brain::{Brain, LlmProvider, MockLlmProvider, ReasoningRole, Reply};
pub use config::{EngineConfig, LlmConfig, MAX_PARALLEL_PATHS, ScoutConfig};
pub use error::{
    ActionError, ConfigError, LlmError, Result, RoleError, ScoutError, SessionError,
};
pub use persistence::{JsonFileStore, MemoryStore, NullStore, SessionStore};
pub use research::{CycleEngine, ProgressEvent, ResearchInput, SessionHandle};
pub use retry::{RetryPolicy, Retryable};
pub use types::{ActionCall, ActionDefinition, CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage};
