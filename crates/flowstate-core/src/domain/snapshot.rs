//! Read-only view of a flow state for rendering layers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::flow_state::FlowState;
use crate::CoreError;

/// What a rendering layer gets to see of a flow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStateSnapshot {
    /// Whether the flow reached a terminal state
    #[serde(rename = "fsComplete")]
    pub complete: bool,
    /// Current activity, present only while the flow is active
    #[serde(
        rename = "fsCurrentActivityByName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_activity: Option<String>,
    /// Lookup key
    #[serde(rename = "fsLookupKey")]
    pub lookup_key: String,
    /// Exported values; sensitive properties never appear here
    #[serde(rename = "fsParameters")]
    pub parameters: BTreeMap<String, String>,
}

impl FlowStateSnapshot {
    /// Capture `state`
    pub fn capture(state: &FlowState) -> Result<Self, CoreError> {
        let current_activity = if state.lifecycle().is_active() {
            state.current_activity().map(|activity| activity.name().to_string())
        } else {
            None
        };
        Ok(Self {
            complete: state.is_completed(),
            current_activity,
            lookup_key: state.lookup_key().to_string(),
            parameters: state.exported_values()?,
        })
    }

    /// JSON rendering
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl FlowState {
    /// Snapshot for rendering
    pub fn snapshot(&self) -> Result<FlowStateSnapshot, CoreError> {
        FlowStateSnapshot::capture(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow_definition::{ActivityDefinition, FlowDefinition};
    use crate::domain::property_definition::PropertyDefinition;
    use crate::domain::property_scope::PropertyUsage;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> FlowState {
        let mut definition = FlowDefinition::builder("signup")
            .property(PropertyDefinition::new("email").with_usage(PropertyUsage::Io))
            .property(PropertyDefinition::new("password").with_usage(PropertyUsage::Io).sensitive())
            .activity(ActivityDefinition::new("form"))
            .build()
            .unwrap();
        definition.freeze().unwrap();
        FlowState::new(Arc::new(definition), Vec::<(String, String)>::new())
    }

    #[test]
    fn test_active_snapshot() {
        let mut state = state();
        state.begin().unwrap();
        state.set_property("email", "a@b.c").unwrap();
        state.set_property("password", "secret").unwrap();
        let json = state.snapshot().unwrap().to_json().unwrap();
        assert_eq!(
            json,
            json!({
                "fsComplete": false,
                "fsCurrentActivityByName": "form",
                "fsLookupKey": state.lookup_key(),
                "fsParameters": { "email": "a@b.c" }
            })
        );
    }

    #[test]
    fn test_completed_snapshot_has_no_activity() {
        let mut state = state();
        state.begin().unwrap();
        state.set_property("password", "secret").unwrap();
        state.finish().unwrap();
        let snapshot = state.snapshot().unwrap();
        assert!(snapshot.complete);
        assert_eq!(snapshot.current_activity, None);
        assert!(!snapshot.parameters.contains_key("password"));
        assert!(!snapshot.to_json().unwrap().as_object().unwrap().contains_key("fsCurrentActivityByName"));
    }
}
