//! Anthropic Messages API provider.
//!
//! Differences from OpenAI-style APIs that matter here:
//! - Auth via `x-api-key` header, plus a required `anthropic-version` header
//! - The system prompt is a top-level `system` field
//! - Action calls travel as `tool_use` / `tool_result` content blocks, and
//!   consecutive results must share one user turn

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{
    ActionDefinition, CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Used when a 429 carries no retry hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    timeout_secs: u64,
}

impl AnthropicProvider {
    /// Reads the API key from `config.api_key_env`. A missing key is
    /// `LlmError::AuthFailed`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
            provider: format!("Anthropic (env var '{}' not set)", config.api_key_env),
        })?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        // Inline system messages join the top-level system prompt.
        let mut system_parts: Vec<&str> = request.system.as_deref().into_iter().collect();
        let mut turns: Vec<&Message> = Vec::new();
        for msg in &request.messages {
            if msg.role == Role::System {
                if let Some(text) = msg.content.as_text() {
                    system_parts.push(text);
                }
            } else {
                turns.push(msg);
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "messages": Self::messages_to_json(&turns),
        });
        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        if let Some(actions) = &request.actions {
            body["tools"] = Value::Array(actions.iter().map(Self::action_to_json).collect());
        }
        body
    }

    /// Convert turns to Anthropic messages. Consecutive tool-role messages
    /// are merged into a single user message of `tool_result` blocks.
    fn messages_to_json(turns: &[&Message]) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        let mut previous_was_tool = false;

        for msg in turns {
            let is_tool = msg.role == Role::Tool;
            let blocks = Self::content_to_blocks(&msg.content);
            if is_tool
                && previous_was_tool
                && let Some(Value::Array(content)) =
                    out.last_mut().and_then(|last| last.get_mut("content"))
            {
                content.extend(blocks);
                continue;
            }

            let role = match msg.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            out.push(serde_json::json!({ "role": role, "content": blocks }));
            previous_was_tool = is_tool;
        }
        out
    }

    fn content_to_blocks(content: &Content) -> Vec<Value> {
        match content {
            Content::Text { text } => vec![serde_json::json!({ "type": "text", "text": text })],
            Content::ActionCall {
                id,
                name,
                arguments,
            } => vec![serde_json::json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": arguments,
            })],
            Content::ActionResult {
                call_id,
                output,
                is_error,
            } => {
                let mut block = serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": output,
                });
                if *is_error {
                    block["is_error"] = Value::Bool(true);
                }
                vec![block]
            }
            Content::MultiPart { parts } => parts.iter().flat_map(Self::content_to_blocks).collect(),
        }
    }

    fn action_to_json(action: &ActionDefinition) -> Value {
        serde_json::json!({
            "name": action.name,
            "description": action.description,
            "input_schema": action.parameters,
        })
    }

    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        let mut parts: Vec<Content> = Vec::new();
        for block in blocks {
            match block["type"].as_str().unwrap_or("text") {
                "text" => parts.push(Content::text(block["text"].as_str().unwrap_or(""))),
                "tool_use" => parts.push(Content::action_call(
                    block["id"].as_str().unwrap_or(""),
                    block["name"].as_str().unwrap_or(""),
                    block["input"].clone(),
                )),
                other => debug!(block_type = other, "Ignoring unknown content block type"),
            }
        }
        let content = if parts.len() == 1 {
            parts.remove(0)
        } else if parts.is_empty() {
            Content::text("")
        } else {
            Content::MultiPart { parts }
        };

        Ok(CompletionResponse {
            message: Message::new(Role::Assistant, content),
            usage: TokenUsage {
                input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: body["model"].as_str().unwrap_or("unknown").to_string(),
            finish_reason: body["stop_reason"].as_str().map(str::to_string),
        })
    }

    fn map_http_error(
        status: reqwest::StatusCode,
        retry_after: Option<u64>,
        body_text: &str,
    ) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            500..=599 => LlmError::Connection {
                message: format!("HTTP {status} from Anthropic API: {body_text}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status} from Anthropic API: {body_text}"),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, url = %url, "Sending Anthropic completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::Connection {
                        message: format!("Request to Anthropic API failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, retry_after, &body_text));
        }

        let json: Value = serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON in response: {e}"),
        })?;
        Self::parse_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
