//! Brave news search with a freshness filter.

use async_trait::async_trait;
use scout_core::actions::ActionCapability;
use scout_core::error::ActionError;
use serde_json::{Value, json};
use tracing::info;

use crate::brave::{BraveClient, base_params, str_field};
use crate::http::{count_arg, optional_str, required_str};

/// How recent articles must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    PastDay,
    PastWeek,
    PastMonth,
}

impl Freshness {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "past_day" | "day" | "pd" => Some(Freshness::PastDay),
            "past_week" | "week" | "pw" => Some(Freshness::PastWeek),
            "past_month" | "month" | "pm" => Some(Freshness::PastMonth),
            _ => None,
        }
    }

    /// Brave's `freshness` parameter value.
    pub fn as_param(&self) -> &'static str {
        match self {
            Freshness::PastDay => "pd",
            Freshness::PastWeek => "pw",
            Freshness::PastMonth => "pm",
        }
    }
}

pub struct NewsSearchAction {
    brave: BraveClient,
}

impl NewsSearchAction {
    pub fn new(brave: BraveClient) -> Self {
        Self { brave }
    }
}

pub(crate) fn parse_news_results(body: &Value) -> Vec<Value> {
    body.get("results")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    json!({
                        "title": str_field(item, "title"),
                        "url": str_field(item, "url"),
                        "source": item
                            .pointer("/meta_url/hostname")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default(),
                        "published": str_field(item, "age"),
                        "description": str_field(item, "description"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ActionCapability for NewsSearchAction {
    fn name(&self) -> &str {
        "news_search"
    }

    fn description(&self) -> &str {
        "Search recent news about a company or topic: press releases, coverage and \
         announcements. Useful for current events, executive quotes and recent developments."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Company name plus topic"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results (1-20, default 10)",
                    "default": 10
                },
                "freshness": {
                    "type": "string",
                    "description": "How recent the news should be",
                    "enum": ["past_day", "past_week", "past_month", ""]
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ActionError> {
        let query = required_str(&args, self.name(), "query")?;
        let count = count_arg(&args, 10, 20);
        let freshness = match optional_str(&args, "freshness") {
            None => None,
            Some(raw) => Some(Freshness::parse(raw).ok_or_else(|| {
                ActionError::InvalidArguments {
                    name: self.name().to_string(),
                    reason: format!("Unknown freshness '{raw}'"),
                }
            })?),
        };

        let mut params = base_params(query, count);
        if let Some(f) = freshness {
            params.push(("freshness", f.as_param().to_string()));
        }
        let body = self.brave.search(self.name(), "news", &params).await?;
        let results = parse_news_results(&body);
        info!(
            query,
            freshness = freshness.map(|f| f.as_param()).unwrap_or("any"),
            result_count = results.len(),
            "News search completed"
        );

        Ok(json!({
            "query": query,
            "results": results,
            "total_results": results.len(),
        }))
    }
}
