//! Agent response types.
//!
//! This module defines what a completion backend hands back for one turn:
//! free text plus the invocations the model asked for.

use serde::{Deserialize, Serialize};

use crate::tool::Invocation;

/// Result of one completion turn.
///
/// `text` is never absent (empty string when the model produced none) and
/// `invocations` is always a list, possibly empty, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Concatenated text fragments of the turn.
    pub text: String,

    /// Invocations the model requested.
    #[serde(default)]
    pub invocations: Vec<Invocation>,

    /// Set when the backend could not complete the request.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transport_error: Option<String>,
}

impl AgentResponse {
    /// Create a new empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a response with text content only.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Create a response with invocations.
    pub fn with_invocations(text: impl Into<String>, invocations: Vec<Invocation>) -> Self {
        Self {
            text: text.into(),
            invocations,
            transport_error: None,
        }
    }

    /// Response standing in for a failed backend call.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            text: format!("Error: {}", error),
            invocations: Vec::new(),
            transport_error: Some(error),
        }
    }

    /// Add an invocation to the response.
    pub fn add_invocation(&mut self, invocation: Invocation) {
        self.invocations.push(invocation);
    }

    /// Append a text fragment, space-joined with what is already there.
    pub fn push_text(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(fragment);
    }

    /// Check if the response has invocations.
    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }

    /// Whether this response stands in for a failed backend call.
    pub fn is_failure(&self) -> bool {
        self.transport_error.is_some()
    }
}

impl std::fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)?;
        if !self.invocations.is_empty() {
            write!(f, " [+{} invocations]", self.invocations.len())?;
        }
        Ok(())
    }
}
