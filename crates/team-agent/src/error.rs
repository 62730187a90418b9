//! Error types for the agent crate.

use thiserror::Error;

use crate::agent::AgentState;

/// Errors that can occur in agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Capability execution failed.
    #[error("tool execution failed: {tool_name}: {message}")]
    ToolExecution {
        /// Name of the capability that failed.
        tool_name: String,
        /// Error message.
        message: String,
    },

    /// Capability not registered on the agent.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid capability arguments.
    #[error("invalid tool arguments for {tool_name}: {message}")]
    InvalidArguments {
        /// Name of the capability.
        tool_name: String,
        /// Error message.
        message: String,
    },

    /// Two capabilities with the same name on one agent.
    #[error("duplicate capability '{capability}' on agent {agent}")]
    DuplicateCapability {
        /// Agent being configured.
        agent: String,
        /// Offending capability name.
        capability: String,
    },

    /// Lifecycle transition not permitted by the state machine.
    #[error("invalid lifecycle transition for {agent}: {from} -> {to}")]
    InvalidTransition {
        /// Agent whose state was being changed.
        agent: String,
        /// Current state.
        from: AgentState,
        /// Requested state.
        to: AgentState,
    },

    /// Model invocation failed.
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    /// Response parsing failed.
    #[error("failed to parse response: {0}")]
    ResponseParse(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Shorthand for a capability failure.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a bad argument error.
    pub fn arguments(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Message without the variant prefix, as shown to a model after a failure.
    pub fn detail(&self) -> String {
        match self {
            Self::ToolExecution { message, .. } | Self::InvalidArguments { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
