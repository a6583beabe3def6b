use thiserror::Error;

use crate::domain::lifecycle::LifecycleState;

/// Core error type for the Flowstate engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Two definitions of the same property cannot be reconciled
    #[error("Definition conflict on '{name}': {reason}")]
    DefinitionConflict {
        /// Property name
        name: String,
        /// What could not be merged
        reason: String,
    },

    /// A definition is malformed on its own
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Lifecycle change that is not in the allow-list of the current state
    #[error("Illegal lifecycle transition from {from} to {to}")]
    IllegalLifecycleTransition {
        /// State the flow was in
        from: LifecycleState,
        /// Requested state
        to: LifecycleState,
    },

    /// Namespace could not be derived for the given context
    #[error("Namespace resolution error: {0}")]
    NamespaceResolution(String),

    /// dependsOn forms a cycle
    #[error("Dependency cycle between properties: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// External persister rejected a write
    #[error("Persistence write failed for '{property}': {reason}")]
    PersistenceWrite {
        /// Property name
        property: String,
        /// Persister's message
        reason: String,
    },

    /// Registry no longer accepts definitions
    #[error("Registry is frozen: {0}")]
    RegistryFrozen(String),

    /// In-place mutation attempted on a template value
    #[error("Cannot mutate template in place: {0}")]
    TemplateMutation(String),

    /// Flow definition not found
    #[error("Flow definition not found: {0}")]
    FlowDefinitionNotFound(String),

    /// Flow state not found
    #[error("Flow state not found: {0}")]
    FlowStateNotFound(String),

    /// Operation on a flow state that already reached a terminal state
    #[error("Flow state {lookup_key} is {state}")]
    FlowStateTerminal {
        /// Flow state lookup key
        lookup_key: String,
        /// The terminal state
        state: LifecycleState,
    },

    /// Value could not be translated
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::DefinitionConflict`]
    pub fn conflict(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::DefinitionConflict {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                CoreError::conflict("count", "incompatible data types"),
                "Definition conflict on 'count': incompatible data types",
            ),
            (
                CoreError::IllegalLifecycleTransition {
                    from: LifecycleState::Successful,
                    to: LifecycleState::Started,
                },
                "Illegal lifecycle transition from successful to started",
            ),
            (
                CoreError::DependencyCycle(vec!["a".to_string(), "b".to_string(), "a".to_string()]),
                "Dependency cycle between properties: a -> b -> a",
            ),
            (
                CoreError::PersistenceWrite {
                    property: "email".to_string(),
                    reason: "store offline".to_string(),
                },
                "Persistence write failed for 'email': store offline",
            ),
            (
                CoreError::FlowStateTerminal {
                    lookup_key: "k1".to_string(),
                    state: LifecycleState::Canceled,
                },
                "Flow state k1 is canceled",
            ),
            (CoreError::NamespaceResolution("no activity".to_string()), "Namespace resolution error: no activity"),
            (CoreError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_str() {
        let error: CoreError = "test error message".into();
        assert_eq!(error, CoreError::Other("test error message".to_string()));
    }
}
