//! Flow definition registry
//!
//! Registration applies the standard property bundles and freezes each
//! definition; flow states are created from the registered definitions.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::definition_source::DefinitionSource;
use super::standard_properties::StandardProperties;
use crate::config::EngineConfig;
use crate::domain::flow_definition::FlowDefinition;
use crate::domain::flow_state::FlowState;
use crate::CoreError;

/// Registry of frozen flow definitions and factory of flow states
pub struct FlowManager {
    /// Registered definitions by flow type
    definitions: RwLock<IndexMap<String, Arc<FlowDefinition>>>,

    /// Bundles added to every registered flow
    standard_properties: StandardProperties,

    /// Engine configuration
    config: EngineConfig,
}

impl FlowManager {
    /// Create a new flow manager
    pub fn new(standard_properties: StandardProperties, config: EngineConfig) -> Self {
        Self {
            definitions: RwLock::new(IndexMap::new()),
            standard_properties,
            config,
        }
    }

    /// Manager with the standard bundles for `config`'s message prefix
    pub fn with_config(config: EngineConfig) -> Self {
        let standard_properties = StandardProperties::new(&config.message_prefix);
        Self::new(standard_properties, config)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Standard bundles
    pub fn standard_properties(&self) -> &StandardProperties {
        &self.standard_properties
    }

    /// Add the standard bundles, check dependencies and freeze `definition`,
    /// then register it. A definition of the same name is replaced.
    pub fn register(&self, mut definition: FlowDefinition) -> Result<Arc<FlowDefinition>, CoreError> {
        self.standard_properties.apply(&mut definition)?;
        definition.freeze()?;
        let definition = Arc::new(definition);
        let previous = self
            .definitions
            .write()
            .insert(definition.name().to_string(), Arc::clone(&definition));
        if previous.is_some() {
            warn!(flow_type = %definition.name(), "Replaced flow definition");
        } else {
            info!(
                flow_type = %definition.name(),
                activities = definition.activities().len(),
                properties = definition.properties().len(),
                "Registered flow definition"
            );
        }
        Ok(definition)
    }

    /// Register every definition of `source`, stopping at the first error
    pub fn register_source(&self, source: &dyn DefinitionSource) -> Result<usize, CoreError> {
        let definitions = source.flow_definitions()?;
        let count = definitions.len();
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(count)
    }

    /// Definition of `flow_type`
    pub fn flow_definition(&self, flow_type: &str) -> Result<Arc<FlowDefinition>, CoreError> {
        self.definitions
            .read()
            .get(flow_type)
            .cloned()
            .ok_or_else(|| CoreError::FlowDefinitionNotFound(flow_type.to_string()))
    }

    /// Whether `flow_type` is registered
    pub fn is_flow_defined(&self, flow_type: &str) -> bool {
        self.definitions.read().contains_key(flow_type)
    }

    /// Registered flow types in registration order
    pub fn flow_types(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    /// New flow state of `flow_type` in `created`
    pub fn create_flow_state(
        &self,
        flow_type: &str,
        initial_values: BTreeMap<String, String>,
    ) -> Result<FlowState, CoreError> {
        let definition = self.flow_definition(flow_type)?;
        Ok(FlowState::new(definition, initial_values).with_verify_initial_values(self.config.verify_initial_values))
    }
}
