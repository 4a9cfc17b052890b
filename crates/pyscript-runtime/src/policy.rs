//! Capability policy baked into every session

use serde::{Deserialize, Serialize};

/// What a script is allowed to reach.
///
/// Fixed when a session is created; scripts cannot change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityPolicy {
    /// Route `print` output to the log
    pub allow_print: bool,

    /// Built-in modules scripts may import
    pub modules: Vec<String>,

    /// Maximum depth of nested user function calls
    pub max_recursion_depth: usize,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            allow_print: true,
            modules: vec!["math".to_string(), "json".to_string(), "time".to_string()],
            max_recursion_depth: 100,
        }
    }
}

impl CapabilityPolicy {
    /// No console output and no imports
    pub fn locked_down() -> Self {
        Self {
            allow_print: false,
            modules: Vec::new(),
            ..Self::default()
        }
    }

    pub fn allows_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_standard_modules() {
        let policy = CapabilityPolicy::default();
        assert!(policy.allows_module("math"));
        assert!(!policy.allows_module("os"));
    }

    #[test]
    fn test_locked_down() {
        let policy = CapabilityPolicy::locked_down();
        assert!(!policy.allow_print);
        assert!(!policy.allows_module("math"));
    }
}
