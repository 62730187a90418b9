//! Agents, capabilities and completion backends for the Smart Team system.
//!
//! This crate provides the pieces an orchestration loop drives:
//!
//! - **Capabilities**: named, typed callables an agent may request, tagged at
//!   registration time as either ordinary tools or transfers to another agent
//! - **Schema builder**: turns a capability's signature into the descriptor a
//!   backend family expects
//! - **Completion backends**: OpenAI-compatible, Anthropic and Ollama
//!   adapters behind one [`CompletionBackend`] trait, plus a scripted
//!   backend for tests
//! - **Agents**: a persona with instructions, capabilities, history, the set
//!   of invocations it already executed, an error context and a lifecycle
//!   state machine
//!
//! # Core Types
//!
//! - [`Agent`]: A named persona driven by the orchestration loop
//! - [`AgentState`] / [`AgentRole`]: Lifecycle state and team role
//! - [`CapabilitySpec`]: Name, description and parameters of a capability
//! - [`Capability`]: Trait for executable capabilities
//! - [`Invocation`]: A backend-proposed call
//! - [`AgentResponse`]: Text plus invocations for one turn
//! - [`ModelConfig`]: Backend family, model and sampling settings
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use team_agent::{backend, Agent, MessageKind, ModelConfig};
//!
//! let backend = backend::from_config(&ModelConfig::openai("gpt-4o-mini"))?;
//! let mut agent = Agent::worker("WeatherBot", "Report the weather.", backend)
//!     .with_transfer("transfer_to_orchestrator", "Hand back", "OrchestratorBot")?;
//! let response = agent.send("weather in Paris", MessageKind::Task).await?;
//! ```

pub mod agent;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod response;
pub mod schema;
pub mod tool;

// Re-export commonly used items
pub use agent::{Agent, AgentRole, AgentState, CompletedInvocations};
pub use backend::{CompletionBackend, ScriptedBackend};
pub use config::{ModelConfig, Provider};
pub use context::{Message, MessageKind, MessageRole};
pub use error::{AgentError, Result};
pub use response::AgentResponse;
pub use schema::{build_schema, SchemaFormat};
pub use tool::{
    Capability, CapabilityKind, CapabilitySpec, FnCapability, Invocation, InvocationResult,
    ParamSpec, ParamType, Parameters, RegisteredCapability,
};
