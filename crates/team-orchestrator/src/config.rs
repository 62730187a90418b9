//! Orchestration loop settings.

use serde::{Deserialize, Serialize};

/// What happens when a worker's turn requests no further work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnPolicy {
    /// Synthesize a transfer back to the coordinator.
    #[default]
    AutoReturn,
    /// Keep the worker active until it transfers back itself.
    WaitForTransfer,
}

/// Settings for the orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Worker return policy.
    #[serde(default)]
    pub return_policy: ReturnPolicy,

    /// Number of memory entries included in completion requests; all when unset.
    #[serde(default)]
    pub memory_window: Option<usize>,

    /// Backend turns allowed per external input before the loop yields.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_max_rounds() -> usize {
    25
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            return_policy: ReturnPolicy::default(),
            memory_window: None,
            max_rounds: default_max_rounds(),
        }
    }
}

impl OrchestratorConfig {
    /// Set the return policy.
    pub fn with_return_policy(mut self, policy: ReturnPolicy) -> Self {
        self.return_policy = policy;
        self
    }

    /// Bound the memory snapshot fed to completion requests.
    pub fn with_memory_window(mut self, window: usize) -> Self {
        self.memory_window = Some(window);
        self
    }

    /// Set the per-input round limit (at least one).
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }
}
