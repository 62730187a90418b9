//! Deterministic backend that replays canned responses.
//!
//! Used to drive agents and the orchestration loop without network access.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::CompletionBackend;
use crate::context::Message;
use crate::error::{AgentError, Result};
use crate::response::AgentResponse;
use crate::schema::SchemaFormat;

/// A request as seen by a [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Conversation sent.
    pub conversation: Vec<Message>,
    /// System instructions sent.
    pub system: String,
    /// Capability descriptors sent.
    pub capabilities: Vec<Value>,
}

impl RecordedRequest {
    /// Content of the last message in the conversation.
    pub fn last_message(&self) -> Option<&str> {
        self.conversation.last().map(|m| m.content.as_str())
    }

    /// Names of the capabilities offered, whatever the schema shape.
    pub fn capability_names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter_map(|c| {
                c.get("name")
                    .or_else(|| c.get("function").and_then(|f| f.get("name")))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect()
    }
}

enum Scripted {
    Reply(AgentResponse),
    Fail(String),
}

/// Backend returning queued responses in order.
///
/// Once the queue is empty every request gets an empty text-only reply.
pub struct ScriptedBackend {
    format: SchemaFormat,
    queue: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedBackend {
    /// Create an empty backend using the baseline schema format.
    pub fn new() -> Self {
        Self {
            format: SchemaFormat::Baseline,
            queue: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Use a different schema format.
    pub fn with_format(mut self, format: SchemaFormat) -> Self {
        self.format = format;
        self
    }

    /// Queue a response (builder form).
    pub fn with_response(self, response: AgentResponse) -> Self {
        self.push(response);
        self
    }

    /// Queue a response.
    pub fn push(&self, response: AgentResponse) {
        lock(&self.queue).push_back(Scripted::Reply(response));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.queue).push_back(Scripted::Fail(message.into()));
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn schema_format(&self) -> SchemaFormat {
        self.format
    }

    async fn complete(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> Result<AgentResponse> {
        lock(&self.requests).push(RecordedRequest {
            conversation: conversation.to_vec(),
            system: system.to_string(),
            capabilities: capabilities.to_vec(),
        });

        match lock(&self.queue).pop_front() {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(AgentError::ModelInvocation(message)),
            None => Ok(AgentResponse::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order() {
        let backend = ScriptedBackend::new()
            .with_response(AgentResponse::text("first"))
            .with_response(AgentResponse::text("second"));
        backend.push_error("boom");

        let conversation = [Message::user("hi")];
        assert_eq!(backend.send(&conversation, "", &[]).await.text, "first");
        assert_eq!(backend.send(&conversation, "", &[]).await.text, "second");
        assert!(backend.send(&conversation, "", &[]).await.is_failure());
        assert_eq!(backend.send(&conversation, "", &[]).await, AgentResponse::new());

        assert_eq!(backend.request_count(), 4);
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn test_records_requests() {
        let backend = ScriptedBackend::new();
        let capabilities = [
            json!({"name": "get_weather"}),
            json!({"type": "function", "function": {"name": "transfer_to_orchestrator"}}),
        ];
        backend
            .send(&[Message::user("weather in Paris")], "You are WeatherBot", &capabilities)
            .await;

        let requests = backend.requests();
        assert_eq!(requests[0].system, "You are WeatherBot");
        assert_eq!(requests[0].last_message(), Some("weather in Paris"));
        assert_eq!(
            requests[0].capability_names(),
            vec!["get_weather", "transfer_to_orchestrator"]
        );
    }
}
