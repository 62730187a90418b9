//! Agent registry owned by the orchestrator.
//!
//! Transfers resolve their target by registry key, so agents never hold
//! references to each other.

use std::collections::HashMap;

use tracing::debug;

use team_agent::Agent;

use crate::error::{OrchestratorError, Result};

/// Agents of one team, keyed by name, with exactly one coordinator.
#[derive(Debug)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
    order: Vec<String>,
    coordinator: String,
}

impl AgentRegistry {
    /// Build a registry, validating names, the coordinator and every
    /// transfer target.
    pub fn new(agents: Vec<Agent>) -> Result<Self> {
        let mut map = HashMap::with_capacity(agents.len());
        let mut order = Vec::with_capacity(agents.len());
        let mut coordinator = None;

        for agent in agents {
            let name = agent.name().to_string();
            if map.contains_key(&name) {
                return Err(OrchestratorError::DuplicateAgent(name));
            }
            if agent.is_coordinator() {
                if let Some(existing) = &coordinator {
                    return Err(OrchestratorError::Configuration(format!(
                        "both {} and {} are coordinators",
                        existing, name
                    )));
                }
                coordinator = Some(name.clone());
            }
            order.push(name.clone());
            map.insert(name, agent);
        }

        let coordinator = coordinator.ok_or_else(|| {
            OrchestratorError::Configuration("team has no coordinator".to_string())
        })?;

        for agent in map.values() {
            for capability in agent.capabilities().iter() {
                if let Some(target) = capability.transfer_target() {
                    if !map.contains_key(target) {
                        return Err(OrchestratorError::UnknownTransferTarget {
                            agent: agent.name().to_string(),
                            capability: capability.name().to_string(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        debug!(agents = order.len(), coordinator = %coordinator, "Agent registry built");
        Ok(Self {
            agents: map,
            order,
            coordinator,
        })
    }

    /// Name of the coordinating agent.
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// Look up an agent.
    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    /// Look up an agent, failing if it does not exist.
    pub fn agent(&self, name: &str) -> Result<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownAgent(name.to_string()))
    }

    /// Mutable lookup, failing if the agent does not exist.
    pub fn agent_mut(&mut self, name: &str) -> Result<&mut Agent> {
        self.agents
            .get_mut(name)
            .ok_or_else(|| OrchestratorError::UnknownAgent(name.to_string()))
    }

    /// Whether an agent with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.order.iter().filter_map(|name| self.agents.get(name))
    }

    /// Agent names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Reset every agent.
    pub fn reset_all(&mut self) {
        for agent in self.agents.values_mut() {
            agent.reset();
        }
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty (never true for a built registry).
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
