//! OpenAI-compatible chat completions backend.
//!
//! Serves both the OpenAI API and OpenRouter, which speaks the same protocol
//! behind a different endpoint and a couple of attribution headers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{parse_arguments, CompletionBackend};
use crate::config::ModelConfig;
use crate::context::Message;
use crate::error::{AgentError, Result};
use crate::response::AgentResponse;
use crate::schema::SchemaFormat;
use crate::tool::Invocation;

/// OpenAI chat completions endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenRouter chat completions endpoint.
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Backend for any OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: ModelConfig,
    api_key: String,
    endpoint: String,
    label: &'static str,
    extra_headers: Vec<(&'static str, &'static str)>,
}

impl OpenAiBackend {
    /// Backend for the OpenAI API.
    pub fn openai(config: ModelConfig, api_key: impl Into<String>) -> Self {
        let endpoint = endpoint_for(&config, OPENAI_API_URL);
        Self {
            client: reqwest::Client::new(),
            config,
            api_key: api_key.into(),
            endpoint,
            label: "openai",
            extra_headers: Vec::new(),
        }
    }

    /// Backend for OpenRouter.
    pub fn openrouter(config: ModelConfig, api_key: impl Into<String>) -> Self {
        let endpoint = endpoint_for(&config, OPENROUTER_API_URL);
        Self {
            client: reqwest::Client::new(),
            config,
            api_key: api_key.into(),
            endpoint,
            label: "openrouter",
            extra_headers: vec![
                ("HTTP-Referer", "https://github.com/smart-team/smart-team"),
                ("X-Title", "Smart Team"),
            ],
        }
    }

    /// Endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !system.is_empty() {
            messages.push(ChatMessage::new("system", system));
        }
        messages.extend(
            conversation
                .iter()
                .map(|m| ChatMessage::new(m.role.as_str(), &m.content)),
        );

        let tools = (!capabilities.is_empty()).then(|| capabilities.to_vec());
        ChatRequest {
            model: self.config.model.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        }
    }
}

fn endpoint_for(config: &ModelConfig, default: &str) -> String {
    match &config.base_url {
        Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
        None => default.to_string(),
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        self.label
    }

    fn schema_format(&self) -> SchemaFormat {
        SchemaFormat::OpenAi
    }

    async fn complete(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> Result<AgentResponse> {
        let request = self.build_request(conversation, system, capabilities);
        trace!("Sending chat request: {:?}", request);

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, *value);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::ModelInvocation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelInvocation(format!(
                "{} API error {}: {}",
                self.label, status, text
            )));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::ResponseParse(format!("Failed to parse response: {}", e)))?;

        debug!(
            finish_reason = ?response.finish_reason(),
            prompt_tokens = response.usage.as_ref().map_or(0, |u| u.prompt_tokens),
            completion_tokens = response.usage.as_ref().map_or(0, |u| u.completion_tokens),
            "Chat response received: {} tokens used",
            response.usage.as_ref().map_or(0, |u| u.total_tokens)
        );

        response.into_agent_response()
    }
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,

    /// Conversation messages, system first.
    pub messages: Vec<ChatMessage>,

    /// Capability descriptors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,

    /// Tool selection mode; only sent alongside tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A message in the chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: String,

    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Tool call in a response message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatToolCall {
    /// Unique identifier for this tool call.
    pub id: String,

    /// Function details.
    pub function: ChatToolFunction,
}

/// Function details in a tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatToolFunction {
    /// Name of the function to call.
    pub name: String,

    /// JSON-encoded arguments.
    #[serde(default)]
    pub arguments: String,
}

/// Chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Completion choices.
    pub choices: Vec<ChatChoice>,

    /// Token usage information.
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    /// Why the first choice stopped (stop, tool_calls, length, ...).
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Convert the first choice into an agent response.
    pub fn into_agent_response(self) -> Result<AgentResponse> {
        let message = self
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AgentError::ResponseParse("response has no choices".into()))?;

        let mut response = AgentResponse::new();
        if let Some(content) = &message.content {
            response.push_text(content);
        }
        for call in message.tool_calls.unwrap_or_default() {
            let parameters = parse_arguments(&call.function.name, &call.function.arguments, &mut response);
            response.add_invocation(Invocation::with_id(call.id, call.function.name, parameters));
        }
        Ok(response)
    }
}

/// A choice in the completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    /// The message for this choice.
    pub message: ResponseMessage,

    /// Finish reason (stop, tool_calls, length, etc.).
    pub finish_reason: Option<String>,
}

/// Message in a completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls the model wants to make.
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

/// Token usage information.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,

    /// Tokens in the completion.
    pub completion_tokens: u32,

    /// Total tokens used.
    pub total_tokens: u32,
}
