//! Brave Search API client shared by the web, news and job actions.

use reqwest::Client;
use scout_core::error::ActionError;
use tracing::debug;

use crate::http::{build_client, check_status, decode_json, send_error};

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com/res/v1";

/// Authenticated access to one Brave Search endpoint family.
#[derive(Clone)]
pub struct BraveClient {
    client: Client,
    api_key: Option<String>,
    key_env: String,
    base_url: String,
}

impl BraveClient {
    /// Read the key from `key_env`. A missing key is reported when an action
    /// runs, not here.
    pub fn from_env(key_env: &str, user_agent: &str) -> Result<Self, ActionError> {
        let api_key = std::env::var(key_env).ok().filter(|k| !k.trim().is_empty());
        Self::new(api_key, key_env, user_agent)
    }

    pub fn new(
        api_key: Option<String>,
        key_env: &str,
        user_agent: &str,
    ) -> Result<Self, ActionError> {
        Ok(Self {
            client: build_client("brave_search", user_agent)?,
            api_key,
            key_env: key_env.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The key, or a typed failure naming the variable to set.
    fn key(&self, action: &str) -> Result<&str, ActionError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ActionError::ExecutionFailed {
                name: action.to_string(),
                message: format!("Search API key not configured (set {})", self.key_env),
            })
    }

    pub(crate) fn url(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{endpoint}/search?{query}", self.base_url)
    }

    /// GET `<base>/<endpoint>/search` with `params` and decode the JSON body.
    pub async fn search(
        &self,
        action: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, ActionError> {
        let key = self.key(action)?;
        let url = self.url(endpoint, params);
        debug!(action, endpoint, "Brave search request");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .send()
            .await
            .map_err(|e| send_error(action, e))?;
        check_status(action, response.status())?;
        let body = response.text().await.map_err(|e| send_error(action, e))?;
        decode_json(action, &body)
    }
}

/// Base query parameters every Brave call sends.
pub(crate) fn base_params(query: &str, count: u64) -> Vec<(&'static str, String)> {
    vec![
        ("q", query.to_string()),
        ("count", count.to_string()),
        ("text_decorations", "false".to_string()),
        ("search_lang", "en".to_string()),
    ]
}

pub(crate) fn str_field(item: &serde_json::Value, key: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
