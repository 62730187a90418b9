//! Agent lifecycle state and role.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an agent.
///
/// ```text
/// Ready -> Processing -> Completed -> Ready
///              |             |
///              +---------> Transferring -> Ready
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Awaiting a new top-level task.
    #[default]
    Ready,
    /// A completion request or invocation execution is in progress.
    Processing,
    /// The latest completion turn requested no further invocations.
    Completed,
    /// Control is being handed to another agent.
    Transferring,
}

impl AgentState {
    /// Whether the state machine permits moving to `next`.
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Ready, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Transferring)
                | (Completed, Ready)
                | (Completed, Transferring)
                | (Transferring, Ready)
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Transferring => write!(f, "transferring"),
        }
    }
}

/// Role of an agent within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Routes tasks to workers and resumes after they finish.
    Coordinator,
    /// Performs delegated tasks.
    Worker,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coordinator => write!(f, "coordinator"),
            Self::Worker => write!(f, "worker"),
        }
    }
}
