//! # Scout Tools
//!
//! Action capabilities used by research workers: web search and page
//! fetch, news search, SEC EDGAR filings and job postings.

mod brave;
mod http;
pub mod jobs;
pub mod news;
pub mod sec;
pub mod web;

pub use brave::BraveClient;

use scout_core::actions::{ActionCapability, ActionRegistry};
use scout_core::config::ToolsConfig;
use scout_core::error::ActionError;
use std::sync::Arc;
use tracing::warn;

/// Register every bundled action. Search actions still register without a
/// Brave key; they fail with a typed error when run.
pub fn register_all(registry: &mut ActionRegistry, config: &ToolsConfig) -> Result<(), ActionError> {
    let brave = BraveClient::from_env(&config.search_api_key_env, &config.user_agent)?;
    if !brave.has_key() {
        warn!(
            env = %config.search_api_key_env,
            "Search API key not set; web, news and job searches will fail"
        );
    }

    let actions: Vec<Arc<dyn ActionCapability>> = vec![
        Arc::new(web::WebSearchAction::new(brave.clone())),
        Arc::new(web::WebFetchAction::new(
            &config.user_agent,
            config.max_page_chars,
        )?),
        Arc::new(news::NewsSearchAction::new(brave.clone())),
        Arc::new(sec::SecFilingsAction::new(&config.sec_user_agent)?),
        Arc::new(jobs::JobPostingsAction::new(brave)),
    ];
    for action in actions {
        registry.register(action)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_all() {
        let mut registry = ActionRegistry::new(Duration::from_secs(30));
        register_all(&mut registry, &ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "job_postings",
                "news_search",
                "sec_filings",
                "web_fetch",
                "web_search"
            ]
        );
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = ActionRegistry::new(Duration::from_secs(30));
        register_all(&mut registry, &ToolsConfig::default()).unwrap();
        let err = register_all(&mut registry, &ToolsConfig::default()).unwrap_err();
        assert!(matches!(err, ActionError::AlreadyRegistered { .. }));
    }
}
