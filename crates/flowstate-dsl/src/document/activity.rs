use flowstate_core::TransitionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::PropertyDocument;

/// An activity as written in the document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDocument {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub properties: Vec<PropertyDocument>,

    /// Reaching this activity completes the flow
    #[serde(default)]
    pub finishing: bool,

    #[serde(default)]
    pub invisible: bool,

    /// Keep the flow state after it completes
    #[serde(default)]
    pub persist_flow: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionDocument>,
}

/// Transition taken when the activity completes the flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDocument {
    pub next_flow_type: String,

    #[serde(default = "default_transition_type")]
    pub transition_type: TransitionType,

    /// Transition key; defaults to the transition type name
    #[serde(default, alias = "key", skip_serializing_if = "Option::is_none")]
    pub finish_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Values handed to the next flow
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial_values: BTreeMap<String, String>,
}

fn default_transition_type() -> TransitionType {
    TransitionType::Normal
}
