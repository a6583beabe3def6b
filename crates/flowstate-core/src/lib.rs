//!
//! Flowstate Core - property scoping and lifecycle core of the Flowstate engine
//!
//! This crate defines flow and property definitions, the namespace rules that
//! decide where a property value lives, and the runtime flow state with its
//! lifecycle state machine. Definition documents are parsed elsewhere and
//! handed in through [`DefinitionSource`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - definitions, flow states and their rules
pub mod domain;

/// Application services - registration and session handling
pub mod application;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

// Re-export key types
pub use config::EngineConfig;
pub use error::CoreError;

pub use domain::copy_on_write::CopyOnWrite;
pub use domain::data_type::{DataKind, PropertyDataType, ScalarType, StandardTranslator, Translator};
pub use domain::flow_definition::{ActivityDefinition, FlowDefinition, FlowDefinitionBuilder};
pub use domain::flow_state::{FlowAdvance, FlowCompletion, FlowState};
pub use domain::flow_transition::{FlowLauncher, FlowTransition, TransitionType};
pub use domain::lifecycle::{FlowLifecycleListener, LifecycleState};
pub use domain::namespace::{resolve_search_order, Namespace, NamespaceContext};
pub use domain::property_definition::{MergeOutcome, PersistContext, PropertyDefinition, PropertyPersister};
pub use domain::property_scope::{PropertyScope, PropertyUsage};
pub use domain::registry::PropertyDefinitionRegistry;
pub use domain::snapshot::FlowStateSnapshot;
pub use domain::value_provider::{ComputedProvider, PropertyReader, ProviderContext, ValueContext, ValueProvider};

// Application interfaces
pub use application::active_flows::{ActiveFlowRegistry, FlowStateHandle};
pub use application::definition_source::{DefinitionSource, MapDefinitionSource};
pub use application::flow_management::{FlowManagement, ReturnToFlow};
pub use application::flow_manager::FlowManager;
pub use application::standard_properties::StandardProperties;
