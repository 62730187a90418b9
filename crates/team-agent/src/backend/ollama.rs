//! Ollama `/api/chat` backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{normalize_arguments, CompletionBackend};
use crate::config::ModelConfig;
use crate::context::Message;
use crate::error::{AgentError, Result};
use crate::response::AgentResponse;
use crate::schema::SchemaFormat;
use crate::tool::Invocation;

/// Backend for a local or remote Ollama server.
#[derive(Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    config: ModelConfig,
    host: String,
}

impl OllamaBackend {
    /// Create a backend talking to `host` (e.g. `http://localhost:11434`).
    pub fn new(config: ModelConfig, host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            host: host.into().trim_end_matches('/').to_string(),
        }
    }

    fn build_request(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> OllamaRequest {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !system.is_empty() {
            messages.push(OllamaMessage::new("system", system));
        }
        messages.extend(
            conversation
                .iter()
                .map(|m| OllamaMessage::new(m.role.as_str(), &m.content)),
        );

        OllamaRequest {
            model: self.config.model.clone(),
            messages,
            tools: (!capabilities.is_empty()).then(|| capabilities.to_vec()),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn schema_format(&self) -> SchemaFormat {
        SchemaFormat::Ollama
    }

    async fn complete(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> Result<AgentResponse> {
        let request = self.build_request(conversation, system, capabilities);
        trace!("Sending ollama chat request: {:?}", request);

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::ModelInvocation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelInvocation(format!(
                "Ollama error {}: {}",
                status, text
            )));
        }

        let response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AgentError::ResponseParse(format!("Failed to parse response: {}", e)))?;

        debug!("Ollama response received (done: {})", response.done);
        Ok(response.into_agent_response())
    }
}

/// Chat request body.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaRequest {
    /// Model name.
    pub model: String,
    /// Conversation, system first.
    pub messages: Vec<OllamaMessage>,
    /// Capability descriptors (OpenAI shape).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    /// Always false; responses are read whole.
    pub stream: bool,
    /// Sampling options.
    pub options: OllamaOptions,
}

/// Sampling options.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaOptions {
    /// Temperature.
    pub temperature: f32,
    /// Token limit.
    pub num_predict: u32,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    /// Role of the sender.
    pub role: String,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Tool calls (responses only).
    #[serde(default, skip_serializing)]
    pub tool_calls: Vec<OllamaToolCall>,
}

impl OllamaMessage {
    /// Create a message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Tool call in a response message.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaToolCall {
    /// Function details.
    pub function: OllamaFunction,
}

/// Function name and arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaFunction {
    /// Function name.
    pub name: String,
    /// Arguments, as an object or a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
}

/// Chat response body.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaResponse {
    /// Assistant message.
    pub message: OllamaMessage,
    /// Whether generation finished.
    #[serde(default)]
    pub done: bool,
}

impl OllamaResponse {
    /// Convert into an agent response; ids are generated locally.
    pub fn into_agent_response(self) -> AgentResponse {
        let mut response = AgentResponse::new();
        response.push_text(&self.message.content);
        for call in self.message.tool_calls {
            let OllamaFunction { name, arguments } = call.function;
            let parameters = normalize_arguments(&name, arguments, &mut response);
            response.add_invocation(Invocation::new(name, parameters));
        }
        response
    }
}
