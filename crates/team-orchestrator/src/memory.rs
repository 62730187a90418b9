//! Cross-agent memory.
//!
//! An append-only log of everything that happened in the session, each entry
//! tagged with the agent it belongs to. Agents re-entered after a transfer
//! are seeded from their own slice of it; the coordinator resumes from the
//! whole log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of the note recorded for external input.
pub const USER_PREFIX: &str = "User: ";

/// What a memory entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// External input.
    User,
    /// Text produced by an agent's backend.
    Assistant,
    /// An invocation is about to run.
    CallStarted,
    /// An invocation finished with a result.
    CallFinished,
    /// An invocation failed.
    CallFailed,
    /// An invocation was not run.
    CallSkipped,
    /// Control moved to another agent.
    Transfer,
    /// A worker handed control back to the coordinator.
    Return,
    /// Anything else worth keeping (backend failures, limits).
    Diagnostic,
}

/// One entry of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Agent the entry belongs to.
    pub agent: String,
    /// Kind of entry.
    pub kind: MemoryKind,
    /// Rendered note.
    pub content: String,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for MemoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Append-only, agent-tagged session log.
#[derive(Debug, Clone, Default)]
pub struct CrossAgentMemory {
    entries: Vec<MemoryEntry>,
}

impl CrossAgentMemory {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&mut self, agent: &str, kind: MemoryKind, content: impl Into<String>) {
        self.entries.push(MemoryEntry {
            agent: agent.to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Record a line of external input as `User: <input>`.
    pub fn record_user(&mut self, agent: &str, input: &str) {
        self.record(agent, MemoryKind::User, format!("{}{}", USER_PREFIX, input));
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// The last `n` entries.
    pub fn tail(&self, n: usize) -> &[MemoryEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    /// Entries tagged with `agent`.
    pub fn scoped<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a MemoryEntry> + 'a {
        self.entries.iter().filter(move |e| e.agent == agent)
    }

    /// Most recent user input, if any.
    pub fn last_user_input(&self) -> Option<&MemoryEntry> {
        self.entries.iter().rev().find(|e| e.kind == MemoryKind::User)
    }

    /// Text of the most recent user input, without the note prefix.
    pub fn last_user_text(&self) -> Option<&str> {
        self.last_user_input()
            .map(|e| e.content.strip_prefix(USER_PREFIX).unwrap_or(&e.content))
    }

    /// Render the log, keeping only the last `window` entries if set.
    pub fn render(&self, window: Option<usize>) -> String {
        let entries = match window {
            Some(n) => self.tail(n),
            None => &self.entries,
        };
        join(entries.iter())
    }

    /// Render the entries tagged with `agent`, windowed like [`Self::render`].
    pub fn render_scoped(&self, agent: &str, window: Option<usize>) -> String {
        let scoped: Vec<&MemoryEntry> = self.scoped(agent).collect();
        let start = window.map_or(0, |n| scoped.len().saturating_sub(n));
        join(scoped[start..].iter().copied())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn join<'a>(entries: impl Iterator<Item = &'a MemoryEntry>) -> String {
    entries
        .map(|e| e.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
