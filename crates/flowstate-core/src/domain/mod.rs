/// Value shapes and translators
pub mod data_type;

/// Property scopes and usages
pub mod property_scope;

/// Copy-on-write template wrapper
pub mod copy_on_write;

/// Default-value providers
pub mod value_provider;

/// Property definitions and merging
pub mod property_definition;

/// Property definition registry
pub mod registry;

/// Namespace search order
pub mod namespace;

/// Flow lifecycle state machine
pub mod lifecycle;

/// dependsOn ordering
pub mod dependencies;

/// Transitions between flows
pub mod flow_transition;

/// Flow and activity definitions
pub mod flow_definition;

/// Running flow states
pub mod flow_state;

/// Domain events
pub mod events;

/// Rendering snapshot
pub mod snapshot;
