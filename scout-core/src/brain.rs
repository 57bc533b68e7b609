//! Reasoning capability: the provider trait, the `Brain` that every role
//! calls through, and a scripted mock provider for tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::{LlmConfig, RoleModel};
use crate::error::LlmError;
use crate::types::{
    ActionCall, ActionDefinition, CompletionRequest, CompletionResponse, Content, Message, Role,
    TokenUsage,
};

/// Trait for reasoning-capability providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the default model name.
    fn model_name(&self) -> &str;
}

/// The role a reasoning call is made on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasoningRole {
    Planner,
    Worker,
    Merger,
    Formatter,
}

impl ReasoningRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningRole::Planner => "planner",
            ReasoningRole::Worker => "worker",
            ReasoningRole::Merger => "merger",
            ReasoningRole::Formatter => "formatter",
        }
    }
}

impl std::fmt::Display for ReasoningRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the reasoning capability answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A terminal structured result, as text.
    Final { text: String },
    /// One or more action requests. `message` is the assistant turn to append
    /// to the conversation before the action results.
    Actions {
        message: Message,
        requests: Vec<ActionCall>,
    },
}

/// Wraps a provider with per-role model selection and usage accounting.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
    usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            provider,
            config,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Send one conversation turn for `role` and classify the answer.
    pub async fn invoke(
        &self,
        role: ReasoningRole,
        system: &str,
        conversation: &[Message],
        actions: &[ActionDefinition],
    ) -> Result<Reply, LlmError> {
        let overrides = self.role_model(role);
        let request = CompletionRequest {
            system: Some(system.to_string()),
            messages: conversation.to_vec(),
            actions: if actions.is_empty() {
                None
            } else {
                Some(actions.to_vec())
            },
            temperature: overrides
                .and_then(|o| o.temperature)
                .unwrap_or(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            model: Some(
                overrides
                    .and_then(|o| o.model.clone())
                    .unwrap_or_else(|| self.config.model.clone()),
            ),
        };

        let response = self.provider.complete(request).await?;
        if let Ok(mut usage) = self.usage.lock() {
            usage.accumulate(&response.usage);
        }
        debug!(
            role = %role,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Reasoning call complete"
        );

        let requests = response.message.content.action_calls();
        if requests.is_empty() {
            Ok(Reply::Final {
                text: response.message.content.collect_text(),
            })
        } else {
            Ok(Reply::Actions {
                message: response.message,
                requests,
            })
        }
    }

    /// Tokens spent across every call made through this brain.
    pub fn total_usage(&self) -> TokenUsage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }

    fn role_model(&self, role: ReasoningRole) -> Option<&RoleModel> {
        let roles = &self.config.roles;
        match role {
            ReasoningRole::Planner => roles.planner.as_ref(),
            ReasoningRole::Worker => roles.worker.as_ref(),
            ReasoningRole::Merger => roles.merger.as_ref(),
            ReasoningRole::Formatter => roles.formatter.as_ref(),
        }
    }
}

/// Pull a JSON value out of model text.
///
/// Accepts a fenced ```json block, any fenced block, the bare text, or the
/// outermost `{...}` span, in that order.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + "```json".len()..];
        if let Some(end) = body.find("```")
            && let Ok(value) = serde_json::from_str(body[..end].trim())
        {
            return Some(value);
        }
    }

    if let Some(start) = trimmed.find("```") {
        let body = &trimmed[start + 3..];
        let body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or(body);
        if let Some(end) = body.find("```")
            && let Ok(value) = serde_json::from_str(body[..end].trim())
        {
            return Some(value);
        }
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    if close <= open {
        return None;
    }
    serde_json::from_str(&trimmed[open..=close]).ok()
}

/// Extract and deserialize a JSON payload, describing what went wrong.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let value = extract_json(text).ok_or_else(|| "no JSON object found in reply".to_string())?;
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// A scripted provider for tests. Responses and errors are returned in the
/// order they were queued; every request is recorded.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push(Ok(response));
        }
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push(Err(error));
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// A plain text response.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("end_turn".to_string()),
        }
    }

    /// A response whose text is `value` serialized as JSON.
    pub fn json_response(value: &serde_json::Value) -> CompletionResponse {
        Self::text_response(&value.to_string())
    }

    /// A response requesting a single action.
    pub fn action_response(name: &str, arguments: serde_json::Value) -> CompletionResponse {
        Self::actions_response(&[(name, arguments)])
    }

    /// A response requesting several actions in one turn.
    pub fn actions_response(calls: &[(&str, serde_json::Value)]) -> CompletionResponse {
        let parts = calls
            .iter()
            .map(|(name, arguments)| {
                Content::action_call(
                    format!("call_{}", uuid::Uuid::new_v4()),
                    *name,
                    arguments.clone(),
                )
            })
            .collect();
        CompletionResponse {
            message: Message::new(Role::Assistant, Content::MultiPart { parts }),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_use".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.responses.lock().ok().and_then(|mut queue| {
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        });
        next.unwrap_or_else(|| {
            Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
