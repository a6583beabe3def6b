/// Definition sources
pub mod definition_source;

/// Standard property bundles
pub mod standard_properties;

/// Active flow state registry
pub mod active_flows;

/// Flow definition registration
pub mod flow_manager;

/// Session-level flow handling
pub mod flow_management;
