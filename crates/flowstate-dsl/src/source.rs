//! [`DefinitionSource`] backed by a YAML definition document

use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use flowstate_core::{ComputedProvider, CoreError, DefinitionSource, FlowDefinition};

use crate::builder::{build_flow_definitions, ProviderRegistry};
use crate::error::DslError;
use crate::parser::parse_dsl_document;
use crate::validation::validate_document_with;

/// Flow definitions loaded from one or more YAML documents
#[derive(Debug, Clone, Default)]
pub struct YamlDefinitionSource {
    definitions: IndexMap<String, FlowDefinition>,
}

/// Configures how documents are turned into a [`YamlDefinitionSource`]
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    providers: ProviderRegistry,
    known_flows: HashSet<String>,
}

impl DocumentLoader {
    /// Loader without providers or external flows
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `provider` available to `provider:` bindings
    pub fn provider(mut self, provider: ComputedProvider) -> Self {
        self.providers.register(provider);
        self
    }

    /// Accept transitions into `flow_type` although the document does not
    /// define it
    pub fn known_flow(mut self, flow_type: impl Into<String>) -> Self {
        self.known_flows.insert(flow_type.into());
        self
    }

    /// Parse, validate and build `yaml`
    pub fn load_str(&self, yaml: &str) -> Result<YamlDefinitionSource, DslError> {
        let mut source = YamlDefinitionSource::default();
        self.load_into(&mut source, yaml)?;
        Ok(source)
    }

    /// Read and load the document at `path`
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<YamlDefinitionSource, DslError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading definition document");
        self.load_str(&yaml)
    }

    /// Add the flows of `yaml` to `source`. Flows already in `source` count
    /// as known transition targets; a flow of the same name is replaced.
    pub fn load_into(&self, source: &mut YamlDefinitionSource, yaml: &str) -> Result<usize, DslError> {
        let document = parse_dsl_document(yaml)?;

        let mut known = self.known_flows.clone();
        known.extend(source.definitions.keys().cloned());
        validate_document_with(&document, &known)?;

        let definitions = build_flow_definitions(&document, &self.providers)?;
        let count = definitions.len();
        for definition in definitions {
            let name = definition.name().to_string();
            if source.definitions.insert(name.clone(), definition).is_some() {
                debug!(flow_type = %name, "Replaced flow definition from earlier document");
            }
        }
        info!(flows = count, total = source.definitions.len(), "Loaded definition document");
        Ok(count)
    }
}

impl YamlDefinitionSource {
    /// Load `yaml` with the default loader
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DslError> {
        DocumentLoader::new().load_str(yaml)
    }

    /// Load the document at `path` with the default loader
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DslError> {
        DocumentLoader::new().load_path(path)
    }

    /// Loader for documents that need providers or external flows
    pub fn loader() -> DocumentLoader {
        DocumentLoader::new()
    }

    /// Flow type names in document order
    pub fn flow_types(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Number of flows
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no flow was loaded
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl DefinitionSource for YamlDefinitionSource {
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
