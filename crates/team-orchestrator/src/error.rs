//! Error types for the orchestrator.

use thiserror::Error;

/// Orchestrator-specific errors.
///
/// Capability failures, backend failures and bad invocations are recovered
/// inside the loop; only configuration faults reach the caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Agent error.
    #[error("Agent error: {0}")]
    Agent(#[from] team_agent::AgentError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No agent registered under this name.
    #[error("Agent not found: {0}")]
    UnknownAgent(String),

    /// Two agents registered under one name.
    #[error("Duplicate agent name: {0}")]
    DuplicateAgent(String),

    /// A transfer capability points at an agent that does not exist.
    #[error("Transfer {capability} on {agent} targets unknown agent {target}")]
    UnknownTransferTarget {
        /// Agent owning the transfer.
        agent: String,
        /// Transfer capability name.
        capability: String,
        /// Missing target.
        target: String,
    },
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
