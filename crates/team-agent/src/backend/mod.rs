//! Completion backend adapters.
//!
//! Each backend family turns (conversation, system instructions, capability
//! schemas) into an [`AgentResponse`]. Families differ only in wire format;
//! the agent and the orchestration loop see the same contract.

mod anthropic;
mod ollama;
mod openai;
mod scripted;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use scripted::{RecordedRequest, ScriptedBackend};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::{ModelConfig, Provider};
use crate::context::Message;
use crate::error::{AgentError, Result};
use crate::response::AgentResponse;
use crate::schema::SchemaFormat;
use crate::tool::Parameters;

/// Default Ollama endpoint when neither the config nor `OLLAMA_HOST` set one.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// A chat/completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Descriptor shape this backend expects for capabilities.
    fn schema_format(&self) -> SchemaFormat;

    /// Perform one completion request.
    async fn complete(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> Result<AgentResponse>;

    /// Like [`CompletionBackend::complete`], but never fails: transport and
    /// protocol errors become a text-only response marked as failed.
    async fn send(
        &self,
        conversation: &[Message],
        system: &str,
        capabilities: &[Value],
    ) -> AgentResponse {
        match self.complete(conversation, system, capabilities).await {
            Ok(response) => response,
            Err(e) => {
                warn!(backend = %self.name(), error = %e, "Completion request failed");
                AgentResponse::failed(e.to_string())
            }
        }
    }
}

/// Decode JSON-encoded invocation arguments.
///
/// Anything that is not a JSON object yields an empty parameter map and a
/// diagnostic appended to the response text.
pub fn parse_arguments(name: &str, raw: &str, response: &mut AgentResponse) -> Parameters {
    if raw.trim().is_empty() {
        return Parameters::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => normalize_arguments(name, value, response),
        Err(e) => {
            warn!(capability = %name, error = %e, "Malformed invocation arguments");
            response.push_text(&format!("[invalid arguments for {}: {}]", name, e));
            Parameters::new()
        }
    }
}

/// Normalize an already-decoded argument value.
///
/// Strings are decoded as JSON; null becomes an empty map.
pub fn normalize_arguments(name: &str, value: Value, response: &mut AgentResponse) -> Parameters {
    match value {
        Value::Object(map) => map,
        Value::Null => Parameters::new(),
        Value::String(raw) => parse_arguments(name, &raw, response),
        other => {
            warn!(capability = %name, "Invocation arguments are not an object");
            response.push_text(&format!(
                "[invalid arguments for {}: expected an object, got {}]",
                name, other
            ));
            Parameters::new()
        }
    }
}

fn resolve_api_key(config: &ModelConfig) -> Result<String> {
    if let Some(key) = &config.api_key {
        return Ok(key.clone());
    }
    let Some(env) = config.provider.api_key_env() else {
        return Ok(String::new());
    };
    std::env::var(env).map_err(|_| {
        AgentError::Configuration(format!("Missing {} environment variable", env))
    })
}

/// Build the backend for a model configuration.
pub fn from_config(config: &ModelConfig) -> Result<Arc<dyn CompletionBackend>> {
    let backend: Arc<dyn CompletionBackend> = match config.provider {
        Provider::OpenAI => Arc::new(OpenAiBackend::openai(config.clone(), resolve_api_key(config)?)),
        Provider::OpenRouter => Arc::new(OpenAiBackend::openrouter(
            config.clone(),
            resolve_api_key(config)?,
        )),
        Provider::Anthropic => Arc::new(AnthropicBackend::new(
            config.clone(),
            resolve_api_key(config)?,
        )),
        Provider::Ollama => {
            let host = config
                .base_url
                .clone()
                .or_else(|| std::env::var("OLLAMA_HOST").ok())
                .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
            Arc::new(OllamaBackend::new(config.clone(), host))
        }
    };
    Ok(backend)
}
