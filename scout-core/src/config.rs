//! Configuration system for Scout.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Files are read
//! from `<config dir>/scout/config.toml` and `.scout/config.toml` in the
//! workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Hard ceiling on concurrently running paths within one cycle.
pub const MAX_PARALLEL_PATHS: usize = 5;

/// Top-level configuration for Scout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub worker: WorkerConfig,
    pub roles: RolesConfig,
    pub tools: ToolsConfig,
    pub persistence: PersistenceConfig,
}

impl ScoutConfig {
    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.engine.max_parallel_paths == 0 || self.engine.max_parallel_paths > MAX_PARALLEL_PATHS
        {
            return invalid(format!(
                "engine.max_parallel_paths must be between 1 and {}, got {}",
                MAX_PARALLEL_PATHS, self.engine.max_parallel_paths
            ));
        }
        if self.engine.max_cycles == 0 {
            return invalid("engine.max_cycles must be at least 1".into());
        }
        if self.engine.diminishing_window == 0 {
            return invalid("engine.diminishing_window must be at least 1".into());
        }
        if self.engine.dashboard_every_n_cycles == 0 {
            return invalid("engine.dashboard_every_n_cycles must be at least 1".into());
        }
        if self.worker.action_budget == 0 {
            return invalid("worker.action_budget must be at least 1".into());
        }
        if self.worker.action_timeout_secs == 0 {
            return invalid("worker.action_timeout_secs must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return invalid(format!(
                "llm.temperature must be within 0.0..=1.0, got {}",
                self.llm.temperature
            ));
        }
        Ok(())
    }
}

/// Reasoning-capability provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name. Only "anthropic" ships with Scout.
    pub provider: String,
    /// Default model identifier for every role.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Per-role model and temperature overrides.
    pub roles: RoleModels,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.3,
            timeout_secs: 120,
            roles: RoleModels::default(),
        }
    }
}

/// Optional overrides keyed by reasoning role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleModels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner: Option<RoleModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<RoleModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merger: Option<RoleModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatter: Option<RoleModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Cycle engine policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cycle ceiling for one run of the loop.
    pub max_cycles: u32,
    /// Concurrency ceiling for worker dispatch, never above 5.
    pub max_parallel_paths: usize,
    /// A cycle adding this many new findings or fewer counts as low-yield.
    pub diminishing_threshold: usize,
    /// Consecutive low-yield cycles that end the session.
    pub diminishing_window: u32,
    /// Run the formatter every N cycles (and always on the final cycle).
    pub dashboard_every_n_cycles: u32,
    /// Discovered initiatives surfaced per session.
    pub max_discovered_initiatives: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cycles: 6,
            max_parallel_paths: MAX_PARALLEL_PATHS,
            diminishing_threshold: 2,
            diminishing_window: 2,
            dashboard_every_n_cycles: 1,
            max_discovered_initiatives: 5,
        }
    }
}

/// Worker role limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Action calls allowed per path.
    pub action_budget: u32,
    /// Upper bound on any single action call.
    pub action_timeout_secs: u64,
    /// Retries of a failed reasoning call before the path errors.
    pub reasoning_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            action_budget: 10,
            action_timeout_secs: 15,
            reasoning_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Retry policy for the planner, merger and formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub planner_retries: u32,
    pub merger_retries: u32,
    pub formatter_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            planner_retries: 1,
            merger_retries: 2,
            formatter_retries: 0,
            retry_base_delay_ms: 1000,
        }
    }
}

impl RolesConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Settings for the bundled action capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Environment variable holding the Brave Search API key.
    pub search_api_key_env: String,
    /// User agent sent by page fetches.
    pub user_agent: String,
    /// User agent sent to SEC EDGAR, which requires contact details.
    pub sec_user_agent: String,
    /// Maximum characters of extracted page text returned by `web_fetch`.
    pub max_page_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_api_key_env: "BRAVE_API_KEY".to_string(),
            user_agent: format!("Scout/{} (company research)", env!("CARGO_PKG_VERSION")),
            sec_user_agent: "Scout Research research@example.com".to_string(),
            max_page_chars: 8000,
        }
    }
}

/// Where session records are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: None,
        }
    }
}

impl PersistenceConfig {
    /// The directory sessions are stored under, if one can be determined.
    pub fn resolve_base_dir(&self) -> Option<PathBuf> {
        self.base_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
    }
}

/// Platform directories for Scout's config, data and logs.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "scout", "scout")
}

/// Load configuration from all layers.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ScoutConfig>,
) -> Result<ScoutConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ScoutConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".scout").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SCOUT_ENGINE__MAX_CYCLES, SCOUT_WORKER__ACTION_BUDGET, ...
    figment = figment.merge(Env::prefixed("SCOUT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
