//! The orchestration loop.
//!
//! One agent is active at a time. Each external input is handed to the
//! active agent; the loop then executes the invocations it asks for,
//! feeds the results back, follows transfers between agents and brings
//! control back to the coordinator when a worker is done. Everything runs
//! sequentially on the caller's task.

use std::fmt;
use std::mem;

use tracing::{debug, info, warn};

use team_agent::{Agent, AgentResponse, CapabilityKind, Invocation, InvocationResult, MessageKind};

use crate::config::{OrchestratorConfig, ReturnPolicy};
use crate::error::Result;
use crate::memory::{CrossAgentMemory, MemoryKind};
use crate::registry::AgentRegistry;

#[cfg(test)]
mod tests;

/// Input that ends the session (case-insensitive).
pub const EXIT_SENTINEL: &str = "exit";

/// Whether `input` is the exit sentinel.
pub fn is_exit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(EXIT_SENTINEL)
}

/// Why an invocation was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same name and parameters already ran and no error is being recovered.
    AlreadyCompleted,
    /// The active agent has no capability by that name.
    UnknownCapability,
    /// The transfer names an agent that is not registered.
    UnknownTarget,
    /// The transfer targets the agent that requested it.
    SelfTransfer,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyCompleted => write!(f, "already executed"),
            Self::UnknownCapability => write!(f, "not a capability of this agent"),
            Self::UnknownTarget => write!(f, "unknown transfer target"),
            Self::SelfTransfer => write!(f, "agent is already active"),
        }
    }
}

/// Progress note produced while handling one input.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// Text returned by an agent's backend.
    AssistantText {
        /// Agent that produced it.
        agent: String,
        /// The text.
        text: String,
    },
    /// An invocation is about to be processed.
    CallStarted {
        /// Requesting agent.
        agent: String,
        /// Rendered call.
        call: String,
    },
    /// An invocation ran successfully.
    CallFinished {
        /// Requesting agent.
        agent: String,
        /// Rendered call.
        call: String,
        /// Capability output.
        result: String,
    },
    /// An invocation failed; the batch continued.
    CallFailed {
        /// Requesting agent.
        agent: String,
        /// Rendered call.
        call: String,
        /// Failure message.
        error: String,
    },
    /// An invocation was not executed.
    CallSkipped {
        /// Requesting agent.
        agent: String,
        /// Rendered call.
        call: String,
        /// Why.
        reason: SkipReason,
    },
    /// Control moved to another agent.
    Transfer {
        /// Previously active agent.
        from: String,
        /// Newly active agent.
        to: String,
        /// Rendered transfer call.
        call: String,
    },
    /// A worker handed control back to the coordinator.
    Returned {
        /// Worker.
        from: String,
        /// Coordinator.
        to: String,
        /// Whether the loop synthesized the return.
        synthesized: bool,
    },
    /// The backend could not complete a request.
    BackendFailure {
        /// Agent whose backend failed.
        agent: String,
        /// Failure message.
        error: String,
    },
    /// The per-input round limit stopped the loop.
    RoundLimit {
        /// Agent left active.
        agent: String,
        /// Rounds used.
        rounds: usize,
    },
}

impl LoopEvent {
    /// Agent the event is attributed to in memory.
    pub fn agent(&self) -> &str {
        match self {
            Self::AssistantText { agent, .. }
            | Self::CallStarted { agent, .. }
            | Self::CallFinished { agent, .. }
            | Self::CallFailed { agent, .. }
            | Self::CallSkipped { agent, .. }
            | Self::BackendFailure { agent, .. }
            | Self::RoundLimit { agent, .. } => agent,
            Self::Transfer { to, .. } => to,
            Self::Returned { from, .. } => from,
        }
    }

    fn memory_kind(&self) -> MemoryKind {
        match self {
            Self::AssistantText { .. } => MemoryKind::Assistant,
            Self::CallStarted { .. } => MemoryKind::CallStarted,
            Self::CallFinished { .. } => MemoryKind::CallFinished,
            Self::CallFailed { .. } => MemoryKind::CallFailed,
            Self::CallSkipped { .. } => MemoryKind::CallSkipped,
            Self::Transfer { .. } => MemoryKind::Transfer,
            Self::Returned { .. } => MemoryKind::Return,
            Self::BackendFailure { .. } | Self::RoundLimit { .. } => MemoryKind::Diagnostic,
        }
    }
}

impl fmt::Display for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssistantText { agent, text } => write!(f, "{}: {}", agent, text),
            Self::CallStarted { agent, call } => {
                write!(f, "{} Is Starting Function Call: {}", agent, call)
            }
            Self::CallFinished {
                agent,
                call,
                result,
            } => write!(f, "{} Finished the Function Call: {} -> {}", agent, call, result),
            Self::CallFailed { call, error, .. } => write!(f, "Error executing {}: {}", call, error),
            Self::CallSkipped {
                agent,
                call,
                reason,
            } => write!(f, "{} Skipped Function Call: {} ({})", agent, call, reason),
            Self::Transfer { from, to, call } => {
                write!(f, "{} is Transferring Function Call: {} -> {}", from, call, to)
            }
            Self::Returned {
                from,
                to,
                synthesized,
            } => {
                if *synthesized {
                    write!(f, "{} finished its task; returning control to {}", from, to)
                } else {
                    write!(f, "{} is returning control to {}", from, to)
                }
            }
            Self::BackendFailure { agent, error } => {
                write!(f, "{} could not reach its backend: {}", agent, error)
            }
            Self::RoundLimit { agent, rounds } => write!(
                f,
                "Stopped after {} rounds with {} active; waiting for input",
                rounds, agent
            ),
        }
    }
}

/// Everything that happened while handling one input.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// Events in order.
    pub events: Vec<LoopEvent>,
    /// Agent active once the turn ended.
    pub active: String,
    /// Backend responses handled.
    pub rounds: usize,
}

impl TurnReport {
    /// Last text produced by any agent.
    pub fn final_text(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            LoopEvent::AssistantText { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Number of invocations that ran successfully.
    pub fn executed(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, LoopEvent::CallFinished { .. }))
            .count()
    }
}

/// Result of handling one input.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The exit sentinel was received.
    Exit,
    /// The input was processed.
    Report(TurnReport),
}

#[derive(Default)]
struct Turn {
    events: Vec<LoopEvent>,
    rounds: usize,
    /// Coordinator invocations suspended by a transfer, in emission order.
    deferred: Vec<Invocation>,
}

enum BatchOutcome {
    /// Every invocation was handled by the requesting agent.
    Results(Vec<InvocationResult>),
    /// Control moved; this is the newly active agent's first response.
    Switched(AgentResponse),
}

/// Drives a team of agents one input at a time.
pub struct Orchestrator {
    registry: AgentRegistry,
    memory: CrossAgentMemory,
    config: OrchestratorConfig,
    active: String,
}

impl Orchestrator {
    /// Create an orchestrator; the coordinator starts active.
    pub fn new(registry: AgentRegistry, config: OrchestratorConfig) -> Self {
        let active = registry.coordinator().to_string();
        info!(
            agents = registry.len(),
            coordinator = %active,
            policy = ?config.return_policy,
            "Initializing Orchestrator"
        );
        Self {
            registry,
            memory: CrossAgentMemory::new(),
            config,
            active,
        }
    }

    /// The agent registry.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// The session log.
    pub fn memory(&self) -> &CrossAgentMemory {
        &self.memory
    }

    /// Loop settings.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Name of the active agent.
    pub fn active(&self) -> &str {
        &self.active
    }

    /// The active agent.
    pub fn active_agent(&self) -> Result<&Agent> {
        self.registry.agent(&self.active)
    }

    /// Reset every agent, clear memory and reactivate the coordinator.
    pub fn reset(&mut self) {
        self.registry.reset_all();
        self.memory.clear();
        self.active = self.registry.coordinator().to_string();
        info!("Session reset");
    }

    /// Handle one line of external input.
    pub async fn handle_input(&mut self, input: &str) -> Result<TurnOutcome> {
        let input = input.trim();
        if is_exit(input) {
            info!("Exit requested");
            return Ok(TurnOutcome::Exit);
        }

        let mut turn = Turn::default();
        if !input.is_empty() {
            let active = self.active.clone();
            info!(agent = %active, "Handling input");

            let content = self.compose_task(&active, input)?;
            self.memory.record_user(&active, input);

            let response = self
                .registry
                .agent_mut(&active)?
                .send(content, MessageKind::Task)
                .await?;
            self.drive(response, &mut turn).await?;
        }

        Ok(TurnOutcome::Report(TurnReport {
            events: turn.events,
            active: self.active.clone(),
            rounds: turn.rounds,
        }))
    }

    /// Follow responses until the active agent asks for nothing more.
    async fn drive(&mut self, mut response: AgentResponse, turn: &mut Turn) -> Result<()> {
        loop {
            turn.rounds += 1;
            let agent_name = self.active.clone();
            self.note_response(&agent_name, &response, turn);

            let is_coordinator = agent_name == self.registry.coordinator();
            let returns = !is_coordinator && self.config.return_policy == ReturnPolicy::AutoReturn;
            if !response.has_invocations() && !returns {
                debug!(agent = %agent_name, rounds = turn.rounds, "Turn complete");
                return Ok(());
            }

            // A finished worker always hands back, even when the limit stops the turn.
            if !response.has_invocations() {
                self.hand_back(&agent_name, true, turn)?;
                if self.round_limit_reached(turn) {
                    return Ok(());
                }
                response = self.resume_coordinator(turn).await?;
                continue;
            }

            if self.round_limit_reached(turn) {
                return Ok(());
            }

            let batch = mem::take(&mut response.invocations);
            response = match self.execute_batch(&agent_name, batch, turn).await? {
                BatchOutcome::Results(results) => {
                    self.registry
                        .agent_mut(&agent_name)?
                        .send_function_results(&results)
                        .await?
                }
                BatchOutcome::Switched(next) => next,
            };
        }
    }

    /// Execute one batch in emission order.
    async fn execute_batch(
        &mut self,
        agent_name: &str,
        batch: Vec<Invocation>,
        turn: &mut Turn,
    ) -> Result<BatchOutcome> {
        let coordinator = self.registry.coordinator().to_string();
        let mut results = Vec::with_capacity(batch.len());
        let mut pending = batch.into_iter();

        while let Some(invocation) = pending.next() {
            let call = invocation.to_string();
            self.emit(
                turn,
                LoopEvent::CallStarted {
                    agent: agent_name.to_string(),
                    call: call.clone(),
                },
            );

            let kind = self
                .registry
                .agent(agent_name)?
                .capability(&invocation.name)
                .map(|c| c.kind.clone());

            match kind {
                None => {
                    warn!(agent = %agent_name, capability = %invocation.name, "Unknown capability requested");
                    self.skip(turn, agent_name, call, SkipReason::UnknownCapability);
                    results.push(InvocationResult::failure(
                        &invocation,
                        format!("Unknown function: {}", invocation.name),
                    ));
                }
                Some(CapabilityKind::Transfer { target }) => {
                    if target == agent_name {
                        self.skip(turn, agent_name, call, SkipReason::SelfTransfer);
                        results.push(InvocationResult::failure(
                            &invocation,
                            format!("{} is already active", target),
                        ));
                        continue;
                    }
                    if !self.registry.contains(&target) {
                        warn!(agent = %agent_name, target = %target, "Transfer target not registered");
                        self.skip(turn, agent_name, call, SkipReason::UnknownTarget);
                        results.push(InvocationResult::failure(
                            &invocation,
                            format!("Unknown agent: {}", target),
                        ));
                        continue;
                    }

                    let rest: Vec<Invocation> = pending.collect();
                    if target == coordinator {
                        if !rest.is_empty() {
                            debug!(agent = %agent_name, dropped = rest.len(), "Return ends the batch");
                        }
                        let next = self.return_to_coordinator(agent_name, false, turn).await?;
                        return Ok(BatchOutcome::Switched(next));
                    }

                    if agent_name == coordinator {
                        if !rest.is_empty() {
                            debug!(deferred = rest.len(), "Deferring coordinator invocations");
                        }
                        let mut deferred = rest;
                        deferred.append(&mut turn.deferred);
                        turn.deferred = deferred;
                    } else if !rest.is_empty() {
                        debug!(agent = %agent_name, dropped = rest.len(), "Transfer ends the batch");
                    }

                    let next = self.transfer(agent_name, &target, &invocation, turn).await?;
                    return Ok(BatchOutcome::Switched(next));
                }
                Some(CapabilityKind::Tool(capability)) => {
                    let agent = self.registry.agent(agent_name)?;
                    if agent.error_context().is_none() && agent.is_completed(&invocation) {
                        debug!(agent = %agent_name, call = %call, "Skipping repeated invocation");
                        self.skip(turn, agent_name, call, SkipReason::AlreadyCompleted);
                        results.push(InvocationResult::success(
                            &invocation,
                            "Already executed earlier in this task; not repeated.",
                        ));
                        continue;
                    }

                    debug!(agent = %agent_name, call = %call, "Executing capability");
                    match capability.call(&invocation).await {
                        Ok(output) => {
                            self.registry
                                .agent_mut(agent_name)?
                                .record_success(&invocation);
                            self.emit(
                                turn,
                                LoopEvent::CallFinished {
                                    agent: agent_name.to_string(),
                                    call,
                                    result: output.clone(),
                                },
                            );
                            results.push(InvocationResult::success(&invocation, output));
                        }
                        Err(e) => {
                            let detail = e.detail();
                            warn!(agent = %agent_name, capability = %invocation.name, error = %detail, "Capability failed");
                            self.registry
                                .agent_mut(agent_name)?
                                .record_failure(&invocation, &detail);
                            self.emit(
                                turn,
                                LoopEvent::CallFailed {
                                    agent: agent_name.to_string(),
                                    call,
                                    error: detail.clone(),
                                },
                            );
                            results.push(InvocationResult::failure(&invocation, detail));
                        }
                    }
                }
            }
        }

        Ok(BatchOutcome::Results(results))
    }

    /// Activate `to` and hand it its task.
    async fn transfer(
        &mut self,
        from: &str,
        to: &str,
        invocation: &Invocation,
        turn: &mut Turn,
    ) -> Result<AgentResponse> {
        let agent = self.registry.agent_mut(from)?;
        agent.begin_transfer()?;
        agent.finish_transfer()?;

        info!(from = %from, to = %to, "Transferring control");
        self.emit(
            turn,
            LoopEvent::Transfer {
                from: from.to_string(),
                to: to.to_string(),
                call: invocation.to_string(),
            },
        );
        self.active = to.to_string();

        let task = match invocation.get_string_arg("task") {
            Ok(task) if !task.trim().is_empty() => task.to_string(),
            _ => self
                .memory
                .last_user_text()
                .map(str::to_string)
                .unwrap_or_default(),
        };
        let seed = self.compose_seed(to, &task)?;

        let response = self
            .registry
            .agent_mut(to)?
            .send(seed, MessageKind::Task)
            .await?;
        Ok(response)
    }

    /// Emit a round-limit event when the turn has used up its rounds.
    fn round_limit_reached(&mut self, turn: &mut Turn) -> bool {
        if turn.rounds < self.config.max_rounds {
            return false;
        }
        let agent = self.active.clone();
        warn!(agent = %agent, rounds = turn.rounds, "Round limit reached");
        self.emit(
            turn,
            LoopEvent::RoundLimit {
                agent,
                rounds: turn.rounds,
            },
        );
        true
    }

    /// Hand control from `from` back to the coordinator and let it resume.
    async fn return_to_coordinator(
        &mut self,
        from: &str,
        synthesized: bool,
        turn: &mut Turn,
    ) -> Result<AgentResponse> {
        self.hand_back(from, synthesized, turn)?;
        self.resume_coordinator(turn).await
    }

    /// Move `from` through its transfer states and activate the coordinator.
    fn hand_back(&mut self, from: &str, synthesized: bool, turn: &mut Turn) -> Result<()> {
        let coordinator = self.registry.coordinator().to_string();

        let agent = self.registry.agent_mut(from)?;
        agent.begin_transfer()?;
        agent.finish_transfer()?;

        info!(from = %from, to = %coordinator, synthesized, "Returning control");
        self.emit(
            turn,
            LoopEvent::Returned {
                from: from.to_string(),
                to: coordinator.clone(),
                synthesized,
            },
        );
        self.active = coordinator;
        Ok(())
    }

    /// Deferred coordinator invocations run first; otherwise the coordinator
    /// resumes from the session log.
    async fn resume_coordinator(&mut self, turn: &mut Turn) -> Result<AgentResponse> {
        let coordinator = self.registry.coordinator().to_string();
        let agent = self.registry.agent_mut(&coordinator)?;
        if !turn.deferred.is_empty() {
            let deferred = mem::take(&mut turn.deferred);
            debug!(count = deferred.len(), "Resuming deferred invocations");
            agent.begin_processing()?;
            return Ok(AgentResponse::with_invocations("", deferred));
        }

        let resume = format!(
            "The following is the conversation history so far:\n{}\n\n\
             Continue from here. If the user's request has been fulfilled, report the result to the user; \
             otherwise route the next step.",
            self.memory.render(self.config.memory_window)
        );
        let response = agent.send(resume, MessageKind::Resume).await?;
        Ok(response)
    }

    /// Request for fresh input: the literal text, the agent's instructions
    /// and a snapshot of the session log.
    fn compose_task(&self, agent_name: &str, input: &str) -> Result<String> {
        let agent = self.registry.agent(agent_name)?;
        let mut content = format!("{}\n\n{}", input, agent.instructions());
        if !self.memory.is_empty() {
            content.push_str("\n\nConversation history:\n");
            content.push_str(&self.memory.render(self.config.memory_window));
        }
        Ok(content)
    }

    /// Request for an agent activated by a transfer: its task, its
    /// instructions and its own slice of the session log.
    fn compose_seed(&self, agent_name: &str, task: &str) -> Result<String> {
        let agent = self.registry.agent(agent_name)?;
        let mut seed = String::new();
        if !task.is_empty() {
            seed.push_str(task);
            seed.push_str("\n\n");
        }
        seed.push_str(agent.instructions());

        let scoped = self
            .memory
            .render_scoped(agent_name, self.config.memory_window);
        if !scoped.is_empty() {
            seed.push_str("\n\nYour earlier activity in this session:\n");
            seed.push_str(&scoped);
        }
        Ok(seed)
    }

    fn note_response(&mut self, agent_name: &str, response: &AgentResponse, turn: &mut Turn) {
        if let Some(error) = &response.transport_error {
            self.emit(
                turn,
                LoopEvent::BackendFailure {
                    agent: agent_name.to_string(),
                    error: error.clone(),
                },
            );
        } else if !response.text.is_empty() {
            self.emit(
                turn,
                LoopEvent::AssistantText {
                    agent: agent_name.to_string(),
                    text: response.text.clone(),
                },
            );
        }
    }

    fn skip(&mut self, turn: &mut Turn, agent_name: &str, call: String, reason: SkipReason) {
        self.emit(
            turn,
            LoopEvent::CallSkipped {
                agent: agent_name.to_string(),
                call,
                reason,
            },
        );
    }

    fn emit(&mut self, turn: &mut Turn, event: LoopEvent) {
        self.memory
            .record(event.agent(), event.memory_kind(), event.to_string());
        turn.events.push(event);
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("active", &self.active)
            .field("agents", &self.registry.len())
            .field("memory", &self.memory.len())
            .field("config", &self.config)
            .finish()
    }
}
