//! Orchestration layer for the Smart Team hand-off system.
//!
//! This crate provides the [`Orchestrator`], which routes a conversation
//! between a fixed team of agents: exactly one is active at a time, tool
//! invocations run sequentially, transfers switch the active agent, and
//! workers hand control back to the coordinator when they are done.
//!
//! # Overview
//!
//! The orchestrator manages:
//! - An [`AgentRegistry`] with one coordinator and any number of workers
//! - A [`CrossAgentMemory`] log shared by every agent in the session
//! - The per-input loop that executes invocations and follows transfers
//!
//! # Example
//!
//! ```ignore
//! use team_orchestrator::{AgentRegistry, Orchestrator, OrchestratorConfig, TurnOutcome};
//!
//! # async fn example(agents: Vec<team_agent::Agent>) -> team_orchestrator::Result<()> {
//! let registry = AgentRegistry::new(agents)?;
//! let mut orchestrator = Orchestrator::new(registry, OrchestratorConfig::default());
//!
//! match orchestrator.handle_input("weather in Paris").await? {
//!     TurnOutcome::Report(report) => {
//!         for event in &report.events {
//!             println!("{}", event);
//!         }
//!     }
//!     TurnOutcome::Exit => {}
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod memory;
mod orchestrator;
mod registry;

pub use config::{OrchestratorConfig, ReturnPolicy};
pub use error::{OrchestratorError, Result};
pub use memory::{CrossAgentMemory, MemoryEntry, MemoryKind, USER_PREFIX};
pub use orchestrator::{
    is_exit, LoopEvent, Orchestrator, SkipReason, TurnOutcome, TurnReport, EXIT_SENTINEL,
};
pub use registry::AgentRegistry;

// Re-export commonly used types from team-agent
pub use team_agent::{Agent, AgentResponse, AgentRole, AgentState};
