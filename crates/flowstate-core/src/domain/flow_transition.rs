//! Transitions from one flow to another

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a transition relates to the flow it leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    /// Regular completion followed by the next flow
    Normal,
    /// Completion through an alternate exit
    Alternate,
    /// The running flow turns into another flow type in place
    Morphing,
    /// Leave by canceling
    Cancel,
    /// Completion that goes back to the parent flow
    Return,
}

impl TransitionType {
    /// Whether taking the transition completes the current flow successfully
    pub fn completes_flow(self) -> bool {
        matches!(self, TransitionType::Normal | TransitionType::Alternate | TransitionType::Return)
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionType::Normal => "normal",
            TransitionType::Alternate => "alternate",
            TransitionType::Morphing => "morphing",
            TransitionType::Cancel => "cancel",
            TransitionType::Return => "return",
        };
        f.write_str(name)
    }
}

/// A labelled exit from a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowTransition {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    /// Lookup key of an existing flow state to continue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_flow: Option<String>,
    /// Flow type to start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_flow_type: Option<String>,
    transition_type: TransitionType,
    /// Values handed to the next flow
    #[serde(default)]
    pub initial_values: BTreeMap<String, String>,
}

/// What to launch when a transition is taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowLauncher {
    /// Turn the running flow state into `flow_type`
    Morph {
        /// Target flow type
        flow_type: String,
    },
    /// Resume an existing flow state
    Continue {
        /// Flow state to resume
        lookup_key: String,
        /// Values applied before resuming
        initial_values: BTreeMap<String, String>,
    },
    /// Start a new flow state
    StartFromDefinition {
        /// Flow type to start
        flow_type: String,
        /// Values handed to the new flow state
        initial_values: BTreeMap<String, String>,
    },
}

impl FlowTransition {
    /// Transition to `next_flow_type`. A blank key defaults to the transition
    /// type name.
    pub fn new(
        key: Option<&str>,
        next_flow_type: impl Into<String>,
        label: Option<&str>,
        transition_type: TransitionType,
    ) -> Self {
        let key = match key {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => transition_type.to_string(),
        };
        Self {
            key,
            label: label.map(str::to_string),
            next_flow: None,
            next_flow_type: Some(next_flow_type.into()),
            transition_type,
            initial_values: BTreeMap::new(),
        }
    }

    /// Transition that resumes the flow state `lookup_key`
    pub fn continuing(key: &str, lookup_key: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            label: None,
            next_flow: Some(lookup_key.into()),
            next_flow_type: None,
            transition_type: TransitionType::Return,
            initial_values: BTreeMap::new(),
        }
    }

    /// Add a value for the next flow
    pub fn with_initial_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.initial_values.insert(name.into(), value.into());
        self
    }

    /// Map key of the transition
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Label shown to users
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Transition type
    pub fn transition_type(&self) -> TransitionType {
        self.transition_type
    }

    /// Morphing transitions replace the flow type in place
    pub fn is_morphing_flow(&self) -> bool {
        self.transition_type == TransitionType::Morphing
    }

    /// Whether taking it completes the current flow
    pub fn is_completing_flow(&self) -> bool {
        self.transition_type.completes_flow()
    }

    /// Launcher for this transition, `None` when it names no target
    pub fn launcher(&self) -> Option<FlowLauncher> {
        if self.is_morphing_flow() {
            return self
                .next_flow_type
                .clone()
                .map(|flow_type| FlowLauncher::Morph { flow_type });
        }
        if let Some(lookup_key) = &self.next_flow {
            return Some(FlowLauncher::Continue {
                lookup_key: lookup_key.clone(),
                initial_values: self.initial_values.clone(),
            });
        }
        self.next_flow_type
            .clone()
            .map(|flow_type| FlowLauncher::StartFromDefinition {
                flow_type,
                initial_values: self.initial_values.clone(),
            })
    }
}
