//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{normalize_arguments, CompletionBackend};
use crate::config::ModelConfig;
use crate::context::{Message, MessageRole};
use crate::error::{AgentError, Result};
use crate::response::AgentResponse;
use crate::schema::SchemaFormat;
use crate::tool::Invocation;

/// Anthropic messages endpoint.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Backend for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    config: ModelConfig,
    api_key: String,
    endpoint: String,
}

impl AnthropicBackend {
    /// Create a backend with the given API key.
    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Self {
        let endpoint = match &config.base_url {
            Some(base) => format!("{}/v1/messages", base.trim_end_matches('/')),
            None => ANTHROPIC_API_URL.to_string(),
        };
        Self {
            client: reqwest::Client::new(),
            config,
            api_key: api_key.into(),
            endpoint,
        }
    }

    fn build_request(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> MessagesRequest {
        // System text travels in its own field, never as a message.
        let messages = conversation
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| MessagesMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            system: (!system.is_empty()).then(|| system.to_string()),
            messages,
            tools: (!capabilities.is_empty()).then(|| capabilities.to_vec()),
        }
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn schema_format(&self) -> SchemaFormat {
        SchemaFormat::Anthropic
    }

    async fn complete(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> Result<AgentResponse> {
        let request = self.build_request(conversation, system, capabilities);
        trace!("Sending messages request: {:?}", request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::ModelInvocation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelInvocation(format!(
                "Anthropic API error {}: {}",
                status, text
            )));
        }

        let response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AgentError::ResponseParse(format!("Failed to parse response: {}", e)))?;

        debug!(
            "Messages response received: {} blocks, stop reason {:?}",
            response.content.len(),
            response.stop_reason
        );

        Ok(response.into_agent_response())
    }
}

/// Messages API request.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    /// Model identifier.
    pub model: String,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Temperature for generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User and assistant turns.
    pub messages: Vec<MessagesMessage>,

    /// Capability descriptors (`input_schema` form).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

/// A user or assistant turn.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesMessage {
    /// "user" or "assistant".
    pub role: String,

    /// Text content.
    pub content: String,
}

/// Messages API response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    /// Content blocks in emission order.
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Why generation stopped.
    pub stop_reason: Option<String>,
}

/// One block of response content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Free text.
    Text {
        /// The text.
        text: String,
    },
    /// A tool invocation request.
    ToolUse {
        /// Tool use id.
        id: String,
        /// Tool name.
        name: String,
        /// Arguments object.
        #[serde(default)]
        input: Value,
    },
    /// Block types this backend does not use.
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    /// Collect text and tool uses; text blocks are space-joined.
    pub fn into_agent_response(self) -> AgentResponse {
        let mut response = AgentResponse::new();
        for block in self.content {
            match block {
                ContentBlock::Text { text } => response.push_text(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    let parameters = normalize_arguments(&name, input, &mut response);
                    response.add_invocation(Invocation::with_id(id, name, parameters));
                }
                ContentBlock::Other => {}
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> AgentResponse {
        serde_json::from_value::<MessagesResponse>(value)
            .unwrap()
            .into_agent_response()
    }

    #[test]
    fn test_interleaved_blocks() {
        let response = parse(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "I'll set up the environment."},
                {"type": "tool_use", "id": "toolu_1", "name": "create_virtualenv",
                 "input": {"env_name": "python_env"}},
                {"type": "text", "text": "Then install numpy."},
                {"type": "tool_use", "id": "toolu_2", "name": "install_package",
                 "input": {"package": "numpy"}}
            ],
            "stop_reason": "tool_use"
        }));

        assert_eq!(
            response.text,
            "I'll set up the environment. Then install numpy."
        );
        assert_eq!(response.invocations.len(), 2);
        assert_eq!(response.invocations[0].name, "create_virtualenv");
        assert_eq!(response.invocations[1].id, "toolu_2");
        assert_eq!(
            response.invocations[1].get_arg("package"),
            Some(&json!("numpy"))
        );
    }

    #[test]
    fn test_text_only_and_unknown_blocks() {
        let response = parse(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Done."}
            ],
            "stop_reason": "end_turn"
        }));
        assert_eq!(response.text, "Done.");
        assert!(response.invocations.is_empty());
    }

    #[test]
    fn test_empty_content() {
        let response = parse(json!({"content": [], "stop_reason": "end_turn"}));
        assert_eq!(response.text, "");
        assert!(response.invocations.is_empty());
    }

    #[test]
    fn test_build_request_filters_system() {
        let backend = AnthropicBackend::new(ModelConfig::anthropic("claude"), "k");
        let conversation = vec![
            Message::system("ignored"),
            Message::user("write code"),
            Message::assistant("ok"),
        ];
        let request = backend.build_request(&conversation, "You are CodeBot", &[json!({"name": "x"})]);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.system.as_deref(), Some("You are CodeBot"));
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(backend.schema_format(), SchemaFormat::Anthropic);
    }
}
