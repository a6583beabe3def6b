//! Assertion utilities for validating flow states.

use serde_json::Value;
use thiserror::Error;

use flowstate_core::{CoreError, FlowState, LifecycleState};

/// Error type for flow state validation failures
#[derive(Debug, Error)]
pub enum FlowStateValidationError {
    /// Lifecycle differs
    #[error("Invalid lifecycle state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: LifecycleState,
        /// Actual state
        actual: LifecycleState,
    },

    /// Property has no value
    #[error("Missing property: {0}")]
    MissingProperty(String),

    /// Property has another value
    #[error("Invalid value of {name}: expected {expected}, got {actual}")]
    InvalidValue {
        /// Property name
        name: String,
        /// Expected value
        expected: String,
        /// Actual value
        actual: String,
    },

    /// Reading the property failed
    #[error("Flow state error: {0}")]
    Core(#[from] CoreError),
}

/// Asserts that a flow state is in `expected`.
pub fn assert_lifecycle(state: &FlowState, expected: LifecycleState) -> Result<(), FlowStateValidationError> {
    if state.lifecycle() != expected {
        return Err(FlowStateValidationError::InvalidState {
            expected,
            actual: state.lifecycle(),
        });
    }
    Ok(())
}

/// Asserts that `name` resolves to `expected`.
pub fn assert_property(state: &FlowState, name: &str, expected: &Value) -> Result<(), FlowStateValidationError> {
    match state.property(name)? {
        Some(actual) if &actual == expected => Ok(()),
        Some(actual) => Err(FlowStateValidationError::InvalidValue {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        None => Err(FlowStateValidationError::MissingProperty(name.to_string())),
    }
}

/// Asserts that the outer namespace holds `expected` under `name`.
pub fn assert_outer_value(state: &FlowState, name: &str, expected: &str) -> Result<(), FlowStateValidationError> {
    match state.raw_value(None, name) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(FlowStateValidationError::InvalidValue {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        None => Err(FlowStateValidationError::MissingProperty(name.to_string())),
    }
}
