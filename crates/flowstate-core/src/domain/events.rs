use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::lifecycle::LifecycleState;

/// Domain event trait for everything a flow state records
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the lookup key of the flow state this event belongs to
    fn lookup_key(&self) -> &str;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Event: Flow state created
#[derive(Debug)]
pub struct FlowStateCreated {
    /// The lookup key of the flow state
    pub lookup_key: String,

    /// The flow type it was created from
    pub flow_type_name: String,

    /// The timestamp when the flow state was created
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowStateCreated {
    fn event_type(&self) -> &'static str {
        "flow_state.created"
    }

    fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Lifecycle state changed
#[derive(Debug)]
pub struct FlowLifecycleChanged {
    /// The lookup key of the flow state
    pub lookup_key: String,
    /// State before the change
    pub previous: LifecycleState,
    /// State after the change
    pub current: LifecycleState,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowLifecycleChanged {
    fn event_type(&self) -> &'static str {
        "flow_state.lifecycle_changed"
    }

    fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Activity became current
#[derive(Debug)]
pub struct ActivityActivated {
    /// The lookup key of the flow state
    pub lookup_key: String,
    /// Name of the activity
    pub activity_name: String,
    /// Position of the activity in the flow
    pub index: usize,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for ActivityActivated {
    fn event_type(&self) -> &'static str {
        "activity.activated"
    }

    fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Flow state morphed into another flow type
#[derive(Debug)]
pub struct FlowStateMorphed {
    /// The lookup key of the flow state
    pub lookup_key: String,
    /// Flow type before the morph
    pub from_flow_type: String,
    /// Flow type after the morph
    pub to_flow_type: String,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowStateMorphed {
    fn event_type(&self) -> &'static str {
        "flow_state.morphed"
    }

    fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
