//! Web actions: Brave web search and page fetch with HTML-to-text
//! extraction.

use async_trait::async_trait;
use reqwest::Client;
use scout_core::actions::ActionCapability;
use scout_core::error::ActionError;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::brave::{BraveClient, base_params, str_field};
use crate::http::{
    build_client, check_status, count_arg, required_str, send_error, truncate_chars,
};

// ---------------------------------------------------------------------------
// WebSearchAction
// ---------------------------------------------------------------------------

/// Search the web through the Brave Search API.
pub struct WebSearchAction {
    brave: BraveClient,
}

impl WebSearchAction {
    pub fn new(brave: BraveClient) -> Self {
        Self { brave }
    }
}

/// Pull `{title, url, description, age}` rows out of a Brave web response.
pub(crate) fn parse_web_results(body: &Value) -> Vec<Value> {
    body.pointer("/web/results")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    json!({
                        "title": str_field(item, "title"),
                        "url": str_field(item, "url"),
                        "description": str_field(item, "description"),
                        "age": item.get("age").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ActionCapability for WebSearchAction {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information about companies, people, technologies and topics. \
         Returns relevant pages with titles, URLs and descriptions. Use it to find sources \
         before fetching them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query. Include company names, technologies or topics."
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results (1-20, default 10)",
                    "default": 10
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ActionError> {
        let query = required_str(&args, self.name(), "query")?;
        let count = count_arg(&args, 10, 20);

        let body = self
            .brave
            .search(self.name(), "web", &base_params(query, count))
            .await?;
        let results = parse_web_results(&body);
        info!(query, result_count = results.len(), "Web search completed");

        Ok(json!({
            "query": query,
            "results": results,
            "total_results": results.len(),
        }))
    }
}

// ---------------------------------------------------------------------------
// WebFetchAction
// ---------------------------------------------------------------------------

/// Fetch a page and return its readable text.
pub struct WebFetchAction {
    client: Client,
    max_chars: usize,
}

impl WebFetchAction {
    pub fn new(user_agent: &str, max_chars: usize) -> Result<Self, ActionError> {
        Ok(Self {
            client: build_client("web_fetch", user_agent)?,
            max_chars: max_chars.max(1),
        })
    }
}

#[async_trait]
impl ActionCapability for WebFetchAction {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page and extract its readable text content. Use it after web_search \
         to read promising pages. Returns the title, meta description and main text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The full http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn execute(&self, args: Value) -> Result<Value, ActionError> {
        let url = required_str(&args, self.name(), "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ActionError::InvalidArguments {
                name: self.name().to_string(),
                reason: "URL must start with http:// or https://".to_string(),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| send_error(self.name(), e))?;
        check_status(self.name(), response.status())?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| send_error(self.name(), e))?;

        let is_html = content_type.contains("text/html")
            || content_type.contains("application/xhtml")
            || (content_type.is_empty() && body.trim_start().starts_with('<'));
        let (title, meta_description, text) = if is_html {
            (
                extract_title(&body),
                extract_meta_description(&body),
                extract_text_from_html(&body),
            )
        } else {
            (None, None, body)
        };
        let (content, truncated) = truncate_chars(&text, self.max_chars);
        info!(url, chars = content.len(), truncated, "Page fetched");

        Ok(json!({
            "url": url,
            "title": title,
            "meta_description": meta_description,
            "content": content,
            "truncated": truncated,
        }))
    }
}

/// Tags whose content is never readable text.
const SKIPPED_TAGS: [&str; 8] = [
    "script", "style", "noscript", "svg", "nav", "footer", "iframe", "form",
];

/// Tags that end a line of text.
const BLOCK_TAGS: [&str; 16] = [
    "p", "br", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "header", "table", "blockquote",
];

/// Strip tags and return readable text, one block per line.
pub(crate) fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut building_tag = false;
    let mut tag_name = String::new();
    // Depth inside skipped elements.
    let mut skipping = 0usize;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' && in_tag {
            in_tag = false;
            building_tag = false;

            let tag = tag_name.to_lowercase();
            let (closing, bare) = match tag.strip_prefix('/') {
                Some(rest) => (true, rest),
                None => (false, tag.as_str()),
            };
            if SKIPPED_TAGS.contains(&bare) {
                if closing {
                    skipping = skipping.saturating_sub(1);
                } else {
                    skipping += 1;
                }
            }
            if BLOCK_TAGS.contains(&bare) {
                text.push('\n');
            }
            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || ch == '/') {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if skipping == 0 {
            text.push(ch);
        }
    }

    let text = decode_entities(&text);
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub(crate) fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = decode_entities(html.get(start..end)?.trim());
    (!title.is_empty()).then_some(title)
}

pub(crate) fn extract_meta_description(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("<meta") {
        let start = from + pos;
        let end = start + lower[start..].find('>')?;
        let tag = &lower[start..end];
        if tag.contains("name=\"description\"") || tag.contains("name='description'") {
            let content_at = tag.find("content=")? + "content=".len();
            let quote = tag[content_at..].chars().next()?;
            let value_start = start + content_at + quote.len_utf8();
            let value_len = lower[value_start..].find(quote)?;
            let value = html.get(value_start..value_start + value_len)?;
            return Some(decode_entities(value.trim()));
        }
        from = end;
    }
    None
}
