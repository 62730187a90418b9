//! Agents: named personas backed by a completion backend.
//!
//! An [`Agent`] owns its conversation history, the set of invocations it
//! has already executed, its current error context and its lifecycle
//! state. It never executes capabilities itself; the orchestration loop
//! does that and reports back through [`Agent::record_success`],
//! [`Agent::record_failure`] and [`Agent::send_function_results`].

mod completed;
mod remediation;
mod state;


pub use completed::CompletedInvocations;
pub use remediation::{error_hint, missing_module, INSTALL_CAPABILITY};
pub use state::{AgentRole, AgentState};

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::backend::CompletionBackend;
use crate::context::{Message, MessageKind};
use crate::error::{AgentError, Result};
use crate::response::AgentResponse;
use crate::schema::build_schema;
use crate::tool::{
    Capability, CapabilitySet, CapabilitySpec, Invocation, InvocationResult, Parameters,
    RegisteredCapability,
};

/// Header of the message that feeds invocation results back to an agent.
pub const FUNCTION_RESULTS_HEADER: &str = "The following functions have been executed:";

/// A named persona with instructions, capabilities and conversational state.
pub struct Agent {
    name: String,
    role: AgentRole,
    instructions: String,
    capabilities: CapabilitySet,
    backend: Arc<dyn CompletionBackend>,
    /// Descriptors in the backend's format, built at registration time.
    schemas: Vec<Value>,
    history: Vec<Message>,
    completed: CompletedInvocations,
    error_context: Option<String>,
    state: AgentState,
    current_task: Option<String>,
}

impl Agent {
    /// Create an agent with no capabilities.
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        instructions: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            instructions: instructions.into(),
            capabilities: CapabilitySet::new(),
            backend,
            schemas: Vec::new(),
            history: Vec::new(),
            completed: CompletedInvocations::new(),
            error_context: None,
            state: AgentState::Ready,
            current_task: None,
        }
    }

    /// Create a coordinating agent.
    pub fn coordinator(
        name: impl Into<String>,
        instructions: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self::new(name, AgentRole::Coordinator, instructions, backend)
    }

    /// Create a worker agent.
    pub fn worker(
        name: impl Into<String>,
        instructions: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self::new(name, AgentRole::Worker, instructions, backend)
    }

    /// Register a capability (builder form).
    pub fn with_tool(mut self, capability: Arc<dyn Capability>) -> Result<Self> {
        self.register_tool(capability)?;
        Ok(self)
    }

    /// Register a transfer (builder form).
    pub fn with_transfer(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Self> {
        self.register_transfer(name, description, target)?;
        Ok(self)
    }

    /// Register an ordinary capability.
    pub fn register_tool(&mut self, capability: Arc<dyn Capability>) -> Result<()> {
        self.register(RegisteredCapability::tool(capability))
    }

    /// Register a transfer capability that activates `target`.
    pub fn register_transfer(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<()> {
        let spec = CapabilitySpec::transfer(name, description);
        self.register(RegisteredCapability::transfer(spec, target))
    }

    /// Register a capability; names must be unique per agent.
    pub fn register(&mut self, capability: RegisteredCapability) -> Result<()> {
        let schema = build_schema(&capability.spec, self.backend.schema_format());
        self.capabilities
            .insert(capability)
            .map_err(|dup| AgentError::DuplicateCapability {
                agent: self.name.clone(),
                capability: dup.spec.name,
            })?;
        self.schemas.push(schema);
        Ok(())
    }

    /// Agent name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Agent role.
    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Whether this agent is the coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.role == AgentRole::Coordinator
    }

    /// Static instructions.
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Registered capabilities.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Look up a capability by name.
    pub fn capability(&self, name: &str) -> Option<&RegisteredCapability> {
        self.capabilities.get(name)
    }

    /// Capability descriptors as sent to the backend.
    pub fn schemas(&self) -> &[Value] {
        &self.schemas
    }

    /// Label of the backend in use.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Conversation history.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Invocations already executed.
    pub fn completed(&self) -> &CompletedInvocations {
        &self.completed
    }

    /// Last failure, if a task is still recovering from one.
    pub fn error_context(&self) -> Option<&str> {
        self.error_context.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Text of the current top-level task.
    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    /// Whether this exact invocation already ran.
    pub fn is_completed(&self, invocation: &Invocation) -> bool {
        self.completed.contains(invocation)
    }

    /// System prompt for the next request: instructions, then prior work,
    /// then the error context if one is set.
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();

        if !self.completed.is_empty() {
            prompt.push_str("\n\nPreviously executed function calls:");
            for record in self.completed.iter() {
                prompt.push_str(&format!("\n- {}", record));
            }
        }

        if let Some(error) = &self.error_context {
            prompt.push_str("\n\n");
            prompt.push_str(&error_hint(error));
        }

        prompt
    }

    /// Send input and return the backend's response.
    ///
    /// A [`MessageKind::Task`] clears the error context and records the task
    /// text. A response without invocations moves the agent to
    /// [`AgentState::Completed`].
    pub async fn send(&mut self, content: impl Into<String>, kind: MessageKind) -> Result<AgentResponse> {
        let content = content.into();
        if kind.is_new_task() {
            self.error_context = None;
            self.current_task = Some(content.clone());
        }
        self.begin_processing()?;

        debug!(agent = %self.name, kind = ?kind, "Sending to backend");
        self.history.push(Message::user(content));

        let system = self.system_prompt();
        let mut response = self.backend.send(&self.history, &system, &self.schemas).await;
        self.apply_remediation(&mut response);

        let entry = history_entry(&response);
        if !entry.is_empty() {
            self.history.push(Message::assistant(entry));
        }

        if !response.has_invocations() {
            self.transition(AgentState::Completed)?;
        }

        debug!(
            agent = %self.name,
            invocations = response.invocations.len(),
            state = %self.state,
            "Backend turn finished"
        );
        Ok(response)
    }

    /// Report executed invocations back to the agent and get its next turn.
    pub async fn send_function_results(&mut self, results: &[InvocationResult]) -> Result<AgentResponse> {
        self.send(format_function_results(results), MessageKind::FunctionResults)
            .await
    }

    /// Record a successful execution; returns false if it was already recorded.
    pub fn record_success(&mut self, invocation: &Invocation) -> bool {
        self.completed.insert(invocation)
    }

    /// Record a failed execution as the agent's error context.
    pub fn record_failure(&mut self, invocation: &Invocation, message: &str) {
        self.error_context = Some(format!("{}: {}", invocation.name, message));
    }

    /// Enter [`AgentState::Processing`], passing through `Ready` if the
    /// previous turn completed.
    pub fn begin_processing(&mut self) -> Result<()> {
        match self.state {
            AgentState::Processing => Ok(()),
            AgentState::Completed => {
                self.transition(AgentState::Ready)?;
                self.transition(AgentState::Processing)
            }
            _ => self.transition(AgentState::Processing),
        }
    }

    /// Enter [`AgentState::Transferring`].
    pub fn begin_transfer(&mut self) -> Result<()> {
        self.transition(AgentState::Transferring)
    }

    /// Leave [`AgentState::Transferring`] and go dormant.
    pub fn finish_transfer(&mut self) -> Result<()> {
        self.transition(AgentState::Ready)
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&mut self, next: AgentState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AgentError::InvalidTransition {
                agent: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        if self.state != next {
            debug!(agent = %self.name, from = %self.state, to = %next, "State transition");
        }
        self.state = next;
        Ok(())
    }

    /// Clear history, completed invocations and error context.
    pub fn reset(&mut self) {
        info!(agent = %self.name, "Resetting agent");
        self.history.clear();
        self.completed.clear();
        self.error_context = None;
        self.current_task = None;
        self.state = AgentState::Ready;
    }

    /// Propose `install_package` when a missing module is the last error and
    /// the backend proposed nothing.
    fn apply_remediation(&self, response: &mut AgentResponse) {
        if response.has_invocations() || response.is_failure() {
            return;
        }
        let Some(module) = self.error_context.as_deref().and_then(missing_module) else {
            return;
        };
        if self
            .capability(INSTALL_CAPABILITY)
            .map_or(true, RegisteredCapability::is_transfer)
        {
            return;
        }

        let mut parameters = Parameters::new();
        parameters.insert("package".into(), json!(module));
        let invocation = Invocation::new(INSTALL_CAPABILITY, parameters);
        if self.completed.contains(&invocation) {
            return;
        }

        info!(agent = %self.name, module = %module, "Proposing install for missing module");
        response.add_invocation(invocation);
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities.len())
            .field("history", &self.history.len())
            .field("completed", &self.completed.len())
            .field("error_context", &self.error_context)
            .finish()
    }
}

/// Body of the function-results feedback message.
pub fn format_function_results(results: &[InvocationResult]) -> String {
    let mut content = String::from(FUNCTION_RESULTS_HEADER);
    for result in results {
        content.push_str(&format!("\n{}", result));
    }
    content
}

/// Assistant history entry for a response; invocation-only turns become a
/// summary of the requested calls.
fn history_entry(response: &AgentResponse) -> String {
    if !response.has_invocations() {
        return response.text.clone();
    }
    let calls: Vec<String> = response.invocations.iter().map(|i| i.to_string()).collect();
    let summary = format!("Requested function calls: {}", calls.join(", "));
    if response.text.is_empty() {
        summary
    } else {
        format!("{}\n{}", response.text, summary)
    }
}
