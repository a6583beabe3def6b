//! Flow lifecycle state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// Lifecycle of a flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, nothing initialized yet
    Created,
    /// Initial values are being established
    Initializing,
    /// Initialization finished
    Initialized,
    /// First activity is being activated
    Starting,
    /// Running
    Started,
    /// Completed normally
    Successful,
    /// Canceled by the caller
    Canceled,
    /// Aborted by an error
    Failed,
}

use LifecycleState::*;

impl LifecycleState {
    /// All states, in lifecycle order
    pub const ALL: [LifecycleState; 8] = [
        Created,
        Initializing,
        Initialized,
        Starting,
        Started,
        Successful,
        Canceled,
        Failed,
    ];

    /// States reachable from `self` (self-transitions are not listed)
    pub fn allowed_next(self) -> &'static [LifecycleState] {
        match self {
            Created => &[Initializing, Canceled, Failed],
            Initializing => &[Initialized, Successful, Canceled, Failed],
            Initialized => &[Starting, Successful, Canceled, Failed],
            Starting => &[Started, Initializing, Initialized, Successful, Canceled, Failed],
            Started => &[Initializing, Initialized, Successful, Canceled, Failed],
            Successful | Canceled | Failed => &[],
        }
    }

    /// Whether `self -> target` is legal
    pub fn can_transition_to(self, target: LifecycleState) -> bool {
        self == target || self.allowed_next().contains(&target)
    }

    /// Terminal states have no outbound transitions
    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Whether values read in this state should be checked against their data type
    pub fn verify_values(self) -> bool {
        !matches!(self, Created | Canceled | Failed)
    }

    /// A flow is active while it is starting or running
    pub fn is_active(self) -> bool {
        matches!(self, Starting | Started)
    }

    /// Lowercase name of the state
    pub fn as_str(self) -> &'static str {
        match self {
            Created => "created",
            Initializing => "initializing",
            Initialized => "initialized",
            Starting => "starting",
            Started => "started",
            Successful => "successful",
            Canceled => "canceled",
            Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks a lifecycle change and returns the new state.
///
/// The caller keeps its stored state untouched when this returns an error.
pub fn transition(current: LifecycleState, target: LifecycleState) -> Result<LifecycleState, CoreError> {
    if current.can_transition_to(target) {
        Ok(target)
    } else {
        Err(CoreError::IllegalLifecycleTransition {
            from: current,
            to: target,
        })
    }
}

/// Observer of lifecycle changes on flow states
pub trait FlowLifecycleListener: Send + Sync {
    /// Called after a flow state changed from `previous` to `current`
    fn lifecycle_change(&self, lookup_key: &str, previous: LifecycleState, current: LifecycleState);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_transition_always_allowed() {
        for state in LifecycleState::ALL {
            assert_eq!(transition(state, state), Ok(state));
        }
    }

    #[test]
    fn test_disallowed_transitions_fail() {
        for from in LifecycleState::ALL {
            for to in LifecycleState::ALL {
                if from == to || from.allowed_next().contains(&to) {
                    continue;
                }
                assert_eq!(
                    transition(from, to),
                    Err(CoreError::IllegalLifecycleTransition { from, to })
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        for state in [Successful, Canceled, Failed] {
            assert!(state.is_terminal());
            for to in LifecycleState::ALL.into_iter().filter(|s| *s != state) {
                assert!(transition(state, to).is_err());
            }
        }
        assert!(!Started.is_terminal());
    }

    #[test]
    fn test_happy_path() {
        let mut state = Created;
        for next in [Initializing, Initialized, Starting, Started, Successful] {
            state = transition(state, next).unwrap();
        }
        assert_eq!(state, Successful);
    }

    #[test]
    fn test_verify_values() {
        assert!(!Created.verify_values());
        assert!(Started.verify_values());
        assert!(Successful.verify_values());
        assert!(!Failed.verify_values());
    }
}
