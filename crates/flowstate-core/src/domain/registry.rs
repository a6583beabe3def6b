//! Ordered registry of property definitions

use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

use super::copy_on_write::CopyOnWrite;
use super::property_definition::PropertyDefinition;
use crate::CoreError;

/// Name → definition map owned by a flow or an activity.
///
/// Iteration follows insertion order. A name declared twice is merged; a
/// conflicting merge is rejected. Entries are stored as templates, so callers
/// customizing a definition get a copy. Once frozen, the registry refuses
/// additions; [`PropertyDefinitionRegistry::extended`] returns an unfrozen copy
/// instead.
#[derive(Debug, Clone)]
pub struct PropertyDefinitionRegistry {
    owner: String,
    definitions: IndexMap<String, CopyOnWrite<PropertyDefinition>>,
    aliases: HashMap<String, String>,
    frozen: bool,
}

impl PropertyDefinitionRegistry {
    /// Empty registry for the named owner
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            definitions: IndexMap::new(),
            aliases: HashMap::new(),
            frozen: false,
        }
    }

    /// Owner name, used in log and error messages
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Add or merge a definition
    pub fn add_definition(&mut self, definition: PropertyDefinition) -> Result<(), CoreError> {
        if self.frozen {
            return Err(CoreError::RegistryFrozen(format!(
                "cannot add '{}' to {}",
                definition.name(),
                self.owner
            )));
        }
        definition.validate()?;

        let canonical = self.canonical_name(definition.name()).map(str::to_string);
        let stored = match canonical.as_deref().and_then(|name| self.definitions.get(name)) {
            Some(existing) => {
                debug!(owner = %self.owner, property = %definition.name(), "Merging property definition");
                existing.try_merge(&definition)?
            }
            None => definition,
        };

        for alias in stored.alternate_names() {
            if self.definitions.contains_key(alias) && alias != stored.name() {
                return Err(CoreError::conflict(
                    stored.name(),
                    format!("alternate name '{}' is already a property", alias),
                ));
            }
            self.aliases.insert(alias.clone(), stored.name().to_string());
        }
        self.definitions
            .insert(stored.name().to_string(), stored.into_template());
        Ok(())
    }

    /// Add several definitions, stopping at the first error
    pub fn add_definitions<I>(&mut self, definitions: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = PropertyDefinition>,
    {
        definitions
            .into_iter()
            .try_for_each(|definition| self.add_definition(definition))
    }

    fn canonical_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.definitions.contains_key(name) {
            Some(name)
        } else {
            self.aliases.get(name).map(String::as_str)
        }
    }

    /// Definition by name or alias
    pub fn get(&self, name: &str) -> Option<&CopyOnWrite<PropertyDefinition>> {
        self.canonical_name(name)
            .and_then(|canonical| self.definitions.get(canonical))
    }

    /// Whether a name or alias is known
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Definitions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.definitions.values().map(|definition| definition.get())
    }

    /// Names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// No definitions
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Refuse further additions
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether additions are refused
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Unfrozen copy with `definition` added; `self` is never modified
    pub fn extended(&self, definition: PropertyDefinition) -> Result<Self, CoreError> {
        let mut copy = self.clone();
        copy.frozen = false;
        copy.add_definition(definition)?;
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_type::PropertyDataType;
    use crate::domain::property_scope::PropertyUsage;

    #[test]
    fn test_insertion_order_preserved() {
        let mut registry = PropertyDefinitionRegistry::new("flow");
        registry
            .add_definitions(["c", "a", "b"].into_iter().map(PropertyDefinition::new))
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_same_name_is_merged() {
        let mut registry = PropertyDefinitionRegistry::new("flow");
        registry
            .add_definition(PropertyDefinition::new("count").with_usage(PropertyUsage::Consume))
            .unwrap();
        registry
            .add_definition(PropertyDefinition::typed("count", PropertyDataType::integer()))
            .unwrap();
        assert_eq!(registry.len(), 1);
        let count = registry.get("count").unwrap();
        assert_eq!(count.data_type(), &PropertyDataType::integer());
        assert_eq!(count.usage(), Some(PropertyUsage::Consume));
    }

    #[test]
    fn test_conflict_keeps_existing() {
        let mut registry = PropertyDefinitionRegistry::new("flow");
        registry
            .add_definition(PropertyDefinition::typed("count", PropertyDataType::integer()))
            .unwrap();
        let result = registry.add_definition(PropertyDefinition::typed("count", PropertyDataType::boolean()));
        assert!(matches!(result, Err(CoreError::DefinitionConflict { .. })));
        assert_eq!(registry.get("count").unwrap().data_type(), &PropertyDataType::integer());
    }

    #[test]
    fn test_alias_lookup_and_merge() {
        let mut registry = PropertyDefinitionRegistry::new("flow");
        registry
            .add_definition(PropertyDefinition::new("email").with_alternate_name("mail"))
            .unwrap();
        assert_eq!(registry.get("mail").unwrap().name(), "email");
        registry
            .add_definition(PropertyDefinition::new("email").with_initial("x@y"))
            .unwrap();
        assert_eq!(registry.get("mail").unwrap().initial(), Some("x@y"));
    }

    #[test]
    fn test_frozen_registry() {
        let mut registry = PropertyDefinitionRegistry::new("flow");
        registry.add_definition(PropertyDefinition::new("a")).unwrap();
        registry.freeze();
        assert!(matches!(
            registry.add_definition(PropertyDefinition::new("b")),
            Err(CoreError::RegistryFrozen(_))
        ));
        let copy = registry.extended(PropertyDefinition::new("b")).unwrap();
        assert_eq!(copy.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_entries_are_templates() {
        let mut registry = PropertyDefinitionRegistry::new("flow");
        registry.add_definition(PropertyDefinition::new("a")).unwrap();
        let customized = registry.get("a").unwrap().clone().init_initial("v");
        assert_eq!(customized.initial(), Some("v"));
        assert_eq!(registry.get("a").unwrap().initial(), None);
    }
}
