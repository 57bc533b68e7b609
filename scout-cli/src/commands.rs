//! CLI subcommand handlers.

use anyhow::Context;
use scout_core::research::{Portfolio, ResearchInput, SessionHandle, SessionSnapshot};
use scout_core::{ActionRegistry, Brain, CycleEngine, JsonFileStore, ScoutConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::progress;
use crate::{Commands, ConfigAction};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path, quiet: bool) -> anyhow::Result<()> {
    match command {
        Commands::Research {
            company,
            industry,
            initiative,
            portfolio,
            follow_ups,
            model,
            json,
        } => {
            let mut config = load(workspace)?;
            if let Some(model) = model {
                config.llm.model = model;
            }
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

            let input = ResearchInput::new(company, industry, initiative);
            let portfolio = portfolio.as_deref().map(load_portfolio).transpose()?;
            let request = ResearchRequest {
                input,
                portfolio,
                follow_ups,
                json,
                quiet,
            };
            run_research(config, request).await
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<ScoutConfig> {
    scout_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load(workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Read a vendor portfolio from a TOML file of `[[vendors]]` tables.
pub fn load_portfolio(path: &Path) -> anyhow::Result<Portfolio> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read portfolio {}", path.display()))?;
    let portfolio: Portfolio = toml::from_str(&raw)
        .with_context(|| format!("Invalid portfolio file {}", path.display()))?;
    Ok(portfolio)
}

struct ResearchRequest {
    input: ResearchInput,
    portfolio: Option<Portfolio>,
    follow_ups: Vec<String>,
    json: bool,
    quiet: bool,
}

async fn run_research(config: ScoutConfig, request: ResearchRequest) -> anyhow::Result<()> {
    let provider = scout_core::providers::create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("Reasoning provider unavailable: {}", e))?;
    let brain = Arc::new(Brain::new(provider, config.llm.clone()));

    let mut registry = ActionRegistry::new(config.worker.action_timeout());
    scout_tools::register_all(&mut registry, &config.tools)?;

    let mut engine = CycleEngine::with_llm(brain.clone(), Arc::new(registry), &config);
    if config.persistence.enabled {
        match config.persistence.resolve_base_dir() {
            Some(dir) => {
                info!(dir = %dir.display(), "Persisting sessions");
                engine = engine.with_store(Arc::new(JsonFileStore::new(dir)));
            }
            None => warn!("No data directory available; sessions will not be persisted"),
        }
    }
    if let Some(portfolio) = request.portfolio {
        engine = engine.with_portfolio(portfolio);
    }

    let handle = engine.start_session(request.input);
    let printer = (!request.quiet).then(|| tokio::spawn(progress::render(handle.subscribe())));

    let mut snapshot = wait_or_interrupt(&handle).await;
    for question in request.follow_ups {
        if snapshot.status.is_final() {
            warn!(question = %question, status = %snapshot.status, "Skipping follow-up");
            continue;
        }
        handle
            .inject_follow_up(question)
            .map_err(|e| anyhow::anyhow!("Follow-up rejected: {}", e))?;
        snapshot = wait_or_interrupt(&handle).await;
    }

    let dashboard = handle.dashboard();
    // Dropping the last handle ends the session task and closes the stream.
    drop(handle);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let usage = brain.total_usage();
    info!(
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "Token usage"
    );

    if request.json {
        let payload = serde_json::json!({
            "session": snapshot,
            "dashboard": dashboard.as_deref(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if let Some(dashboard) = dashboard {
        println!("{}", dashboard.to_markdown());
    } else if let Some(error) = &snapshot.error {
        anyhow::bail!("Session {} without a dashboard: {}", snapshot.status, error);
    }
    Ok(())
}

/// Wait for the current run. Ctrl-C asks the session to stop and keeps
/// waiting for it to wind down.
async fn wait_or_interrupt(handle: &SessionHandle) -> SessionSnapshot {
    tokio::select! {
        snapshot = handle.wait() => snapshot,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nStopping session...");
            handle.stop();
            handle.wait().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_portfolio() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[vendors]]
vendor_name = "CloudCo"
partnership_level = "platinum"
capabilities = ["azure migration", "kubernetes"]

[[vendors]]
vendor_name = "DataWorks"
"#
        )
        .unwrap();

        let portfolio = load_portfolio(file.path()).unwrap();
        assert_eq!(portfolio.vendors.len(), 2);
        assert_eq!(portfolio.vendors[0].vendor_name, "CloudCo");
        assert_eq!(portfolio.vendors[0].capabilities.len(), 2);
        assert!(portfolio.vendors[1].capabilities.is_empty());
    }

    #[test]
    fn test_load_portfolio_reports_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vendors = 3").unwrap();
        let err = load_portfolio(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid portfolio file"));

        assert!(load_portfolio(Path::new("/nonexistent/portfolio.toml")).is_err());
    }

    #[test]
    fn test_config_show_with_workspace_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".scout")).unwrap();
        std::fs::write(
            dir.path().join(".scout").join("config.toml"),
            "[engine]\nmax_cycles = 3\n",
        )
        .unwrap();

        let config = load(dir.path()).unwrap();
        assert_eq!(config.engine.max_cycles, 3);
        assert!(handle_config(ConfigAction::Show, dir.path()).is_ok());
    }
}
