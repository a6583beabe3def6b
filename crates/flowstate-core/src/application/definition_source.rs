//! Where flow definitions come from

use indexmap::IndexMap;

use crate::domain::flow_definition::FlowDefinition;
use crate::CoreError;

/// Source of flow definitions, e.g. a parsed definition document
pub trait DefinitionSource: Send + Sync {
    /// Definition of the flow type `name`
    fn flow_definition(&self, name: &str) -> Result<Option<FlowDefinition>, CoreError>;

    /// Every definition the source knows
    fn flow_definitions(&self) -> Result<Vec<FlowDefinition>, CoreError>;

    /// Whether `name` is defined
    fn is_flow_defined(&self, name: &str) -> bool {
        matches!(self.flow_definition(name), Ok(Some(_)))
    }
}

/// In-memory definition source
#[derive(Debug, Clone, Default)]
pub struct MapDefinitionSource {
    definitions: IndexMap<String, FlowDefinition>,
}

impl MapDefinitionSource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing one of the same name
    pub fn add(&mut self, definition: FlowDefinition) {
        self.definitions.insert(definition.name().to_string(), definition);
    }

    /// Builder-style [`MapDefinitionSource::add`]
    pub fn with(mut self, definition: FlowDefinition) -> Self {
        self.add(definition);
        self
    }
}

impl DefinitionSource for MapDefinitionSource {
    fn flow_definition(&self, name: &str) -> Result<Option<FlowDefinition>, CoreError> {
        Ok(self.definitions.get(name).cloned())
    }

    fn flow_definitions(&self) -> Result<Vec<FlowDefinition>, CoreError> {
        Ok(self.definitions.values().cloned().collect())
    }

    fn is_flow_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }
}
