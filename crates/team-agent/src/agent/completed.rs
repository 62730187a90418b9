//! Set of invocations an agent has already executed.

use crate::tool::{Invocation, InvocationRecord};

/// Executed (name, parameters) pairs, in first-execution order.
///
/// Parameter maps compare by content, so key order in the backend's JSON
/// does not matter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedInvocations {
    records: Vec<InvocationRecord>,
}

impl CompletedInvocations {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `invocation`; returns false if the pair was already present.
    pub fn insert(&mut self, invocation: &Invocation) -> bool {
        if self.contains(invocation) {
            return false;
        }
        self.records.push(invocation.record());
        true
    }

    /// Whether the same name and parameters already ran.
    pub fn contains(&self, invocation: &Invocation) -> bool {
        self.records.iter().any(|r| r.matches(invocation))
    }

    /// Recorded pairs.
    pub fn iter(&self) -> impl Iterator<Item = &InvocationRecord> {
        self.records.iter()
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has run yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> Invocation {
        Invocation::from_value(name, args)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = CompletedInvocations::new();
        assert!(set.insert(&call("get_weather", json!({"city": "Paris"}))));
        assert!(!set.insert(&call("get_weather", json!({"city": "Paris"}))));
        assert!(set.insert(&call("get_weather", json!({"city": "Rome"}))));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_contains_ignores_key_order() {
        let mut set = CompletedInvocations::new();
        set.insert(&call("install_package", json!({"package": "numpy", "env_name": "py"})));
        assert!(set.contains(&call(
            "install_package",
            json!({"env_name": "py", "package": "numpy"})
        )));
        assert!(!set.contains(&call("install_package", json!({"package": "numpy"}))));
    }

    #[test]
    fn test_clear() {
        let mut set = CompletedInvocations::new();
        set.insert(&call("ping", json!({})));
        set.clear();
        assert!(set.is_empty());
    }
}
