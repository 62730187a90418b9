//! Corrective hints derived from an agent's error context.

use std::sync::OnceLock;

use regex::Regex;

/// Name of the capability that installs a missing module.
pub const INSTALL_CAPABILITY: &str = "install_package";

fn module_not_found() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"ModuleNotFoundError: No module named '([^'.]+)").ok())
        .as_ref()
}

/// Top-level module name from a `ModuleNotFoundError` in `error`, if any.
pub fn missing_module(error: &str) -> Option<String> {
    module_not_found()?
        .captures(error)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Text appended to the system prompt while an error context is set.
pub fn error_hint(error: &str) -> String {
    let mut hint = format!(
        "Error Context: {}\nPlease fix this error by installing any missing packages or fixing code issues.",
        error
    );
    if let Some(module) = missing_module(error) {
        hint.push_str(&format!(
            "\nAction Required: Install missing module '{}' using {} function.",
            module, INSTALL_CAPABILITY
        ));
    }
    hint
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module() {
        let err = "Traceback (most recent call last):\n  File \"x.py\", line 1\nModuleNotFoundError: No module named 'numpy'";
        assert_eq!(missing_module(err), Some("numpy".to_string()));

        let err = "ModuleNotFoundError: No module named 'matplotlib.pyplot'";
        assert_eq!(missing_module(err), Some("matplotlib".to_string()));

        assert_eq!(missing_module("SyntaxError: invalid syntax"), None);
    }

    #[test]
    fn test_error_hint() {
        let hint = error_hint("ModuleNotFoundError: No module named 'requests'");
        assert!(hint.starts_with("Error Context: ModuleNotFoundError"));
        assert!(hint.contains("Install missing module 'requests' using install_package"));

        let hint = error_hint("ZeroDivisionError: division by zero");
        assert!(!hint.contains("Action Required"));
    }
}
