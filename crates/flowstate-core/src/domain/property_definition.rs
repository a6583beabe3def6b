//! Property definitions and the merge algorithm

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::copy_on_write::CopyOnWrite;
use super::data_type::PropertyDataType;
use super::property_scope::{PropertyScope, PropertyUsage};
use super::value_provider::ValueProvider;
use crate::CoreError;

/// Where a persisted write comes from
#[derive(Debug, Clone, Copy)]
pub struct PersistContext<'a> {
    /// Flow type of the writing flow state
    pub flow_type_name: &'a str,
    /// Lookup key of the writing flow state
    pub lookup_key: &'a str,
    /// Current activity, if any
    pub activity_name: Option<&'a str>,
    /// Namespace the value was cached under
    pub namespace: Option<&'a str>,
}

/// External write-back hook for a property
pub trait PropertyPersister: Send + Sync {
    /// Store `value` (`None` clears it). An error means the durable write did
    /// not take effect.
    fn persist(
        &self,
        context: &PersistContext<'_>,
        definition: &PropertyDefinition,
        value: Option<&str>,
    ) -> Result<(), CoreError>;
}

/// A named property declaration
#[derive(Clone)]
pub struct PropertyDefinition {
    name: String,
    data_type: PropertyDataType,
    scope: Option<PropertyScope>,
    usage: Option<PropertyUsage>,
    default_provider: Option<ValueProvider>,
    persister: Option<Arc<dyn PropertyPersister>>,
    initial: Option<String>,
    ui_parameter_name: Option<String>,
    validators: Vec<String>,
    depends_on: BTreeSet<String>,
    alternate_names: BTreeSet<String>,
    sensitive: bool,
    save_back: Option<bool>,
    auto_create: Option<bool>,
}

/// Result of merging two definitions of the same name
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Reconciled definition; meaningless when `conflict` is set
    pub merged: PropertyDefinition,
    /// Whether the two declarations cannot coexist
    pub conflict: bool,
    /// Why they cannot
    pub reasons: Vec<String>,
}

impl PropertyDefinition {
    /// Definition with an undefined data type and no access declared
    pub fn new(name: impl Into<String>) -> Self {
        Self::typed(name, PropertyDataType::undefined())
    }

    /// Definition with a data type
    pub fn typed(name: impl Into<String>, data_type: PropertyDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            scope: None,
            usage: None,
            default_provider: None,
            persister: None,
            initial: None,
            ui_parameter_name: None,
            validators: Vec::new(),
            depends_on: BTreeSet::new(),
            alternate_names: BTreeSet::new(),
            sensitive: false,
            save_back: None,
            auto_create: None,
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope: PropertyScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set the usage
    pub fn with_usage(mut self, usage: PropertyUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Set scope and usage together
    pub fn with_access(self, scope: PropertyScope, usage: PropertyUsage) -> Self {
        self.with_scope(scope).with_usage(usage)
    }

    /// Set the data type
    pub fn with_data_type(mut self, data_type: PropertyDataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Fixed default value
    pub fn with_default(self, value: Value) -> Self {
        self.with_provider(ValueProvider::Fixed(value))
    }

    /// Default-value provider
    pub fn with_provider(mut self, provider: ValueProvider) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Write-back hook
    pub fn with_persister(mut self, persister: Arc<dyn PropertyPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Serialized value placed in the flow when nothing else provides one
    pub fn with_initial(mut self, initial: impl Into<String>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    /// Name of the UI parameter bound to this property
    pub fn with_ui_parameter_name(mut self, name: impl Into<String>) -> Self {
        self.ui_parameter_name = Some(name.into());
        self
    }

    /// Append a validation rule identifier
    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validators.push(validator.into());
        self
    }

    /// Properties that must be resolved before this one
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Legacy alias
    pub fn with_alternate_name(mut self, name: impl Into<String>) -> Self {
        self.alternate_names.insert(name.into());
        self
    }

    /// Mark sensitive
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Override the save-back policy
    pub fn with_save_back(mut self, save_back: bool) -> Self {
        self.save_back = Some(save_back);
        self
    }

    /// Store provided defaults on first read
    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = Some(auto_create);
        self
    }

    /// Wrap as a shared template
    pub fn into_template(self) -> CopyOnWrite<PropertyDefinition> {
        CopyOnWrite::template(self)
    }

    /// Identity
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data type
    pub fn data_type(&self) -> &PropertyDataType {
        &self.data_type
    }

    /// Declared scope
    pub fn scope(&self) -> Option<PropertyScope> {
        self.scope
    }

    /// Declared usage
    pub fn usage(&self) -> Option<PropertyUsage> {
        self.usage
    }

    /// Declared scope, or the flow-local default
    pub fn effective_scope(&self) -> PropertyScope {
        self.scope.unwrap_or_default()
    }

    /// Declared usage, or the default of the effective scope
    pub fn effective_usage(&self) -> PropertyUsage {
        self.usage
            .unwrap_or_else(|| self.effective_scope().default_usage())
    }

    /// Default-value provider
    pub fn default_provider(&self) -> Option<&ValueProvider> {
        self.default_provider.as_ref()
    }

    /// Write-back hook
    pub fn persister(&self) -> Option<&Arc<dyn PropertyPersister>> {
        self.persister.as_ref()
    }

    /// Initial serialized value
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    /// UI parameter name
    pub fn ui_parameter_name(&self) -> Option<&str> {
        self.ui_parameter_name.as_deref()
    }

    /// Validation rules
    pub fn validators(&self) -> &[String] {
        &self.validators
    }

    /// Dependencies
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    /// Aliases
    pub fn alternate_names(&self) -> &BTreeSet<String> {
        &self.alternate_names
    }

    /// Sensitive values are never persisted, exported or copied back
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// In-place edits of materialized values are written back on passivation.
    /// Collections default to true.
    pub fn is_save_back(&self) -> bool {
        self.save_back.unwrap_or_else(|| self.data_type.is_collection())
    }

    /// Provided defaults are stored on first read
    pub fn is_auto_create(&self) -> bool {
        self.auto_create.unwrap_or(false)
    }

    /// Externally settable according to the effective usage
    pub fn is_externally_settable(&self) -> bool {
        self.effective_usage().is_externally_settable()
    }

    /// Never handed to a persister
    pub fn is_cache_only(&self) -> bool {
        self.sensitive || self.effective_scope().is_cache_only()
    }

    /// Copied to the outer namespace when the flow succeeds
    pub fn is_copy_back_on_flow_success(&self) -> bool {
        !self.sensitive && self.effective_usage().is_copy_back_on_flow_success()
    }

    /// Whether `name` is this property's name or one of its aliases
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.alternate_names.contains(name)
    }

    /// Check invariants that hold for a definition on its own
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidDefinition("property name is blank".to_string()));
        }
        let scope = self.effective_scope();
        let usage = self.effective_usage();
        if !scope.is_allowed_usage(usage) {
            return Err(CoreError::InvalidDefinition(format!(
                "'{}': usage {} is not allowed for scope {}",
                self.name, usage, scope
            )));
        }
        if self.depends_on.contains(&self.name) {
            return Err(CoreError::DependencyCycle(vec![self.name.clone(), self.name.clone()]));
        }
        if let Some(initial) = &self.initial {
            if !self.data_type.is_deserializable(initial) {
                return Err(CoreError::InvalidDefinition(format!(
                    "'{}': initial value '{}' is not a {}",
                    self.name, initial, self.data_type
                )));
            }
        }
        Ok(())
    }

    /// Whether `incoming` can be merged into this definition
    pub fn is_mergeable(&self, incoming: &PropertyDefinition) -> bool {
        !self.merge(incoming).conflict
    }

    /// Reconcile two declarations of the same property.
    ///
    /// Set attributes of `self` win over `incoming`; unset ones take the
    /// incoming value. Aliases and dependencies are unioned.
    pub fn merge(&self, incoming: &PropertyDefinition) -> MergeOutcome {
        let mut reasons = Vec::new();
        let mut merged = self.clone();

        if self.name != incoming.name {
            reasons.push(format!("names differ: '{}' and '{}'", self.name, incoming.name));
        }

        match self.data_type.merge(&incoming.data_type) {
            Ok(data_type) => merged.data_type = data_type,
            Err(reason) => reasons.push(reason),
        }

        merged.usage = match (self.usage, incoming.usage) {
            (Some(existing), Some(other)) => match PropertyUsage::surviving(existing, other) {
                Some(usage) => Some(usage),
                None => {
                    reasons.push(format!("usage {} cannot be reconciled with {}", existing, other));
                    Some(existing)
                }
            },
            (existing, other) => existing.or(other),
        };

        merged.scope = match (self.scope, incoming.scope) {
            (Some(existing), Some(other)) if existing != other => Some(existing.max(other)),
            (existing, other) => existing.or(other),
        };

        let scope = merged.effective_scope();
        let usage = merged.effective_usage();
        if !scope.is_allowed_usage(usage) {
            reasons.push(format!("usage {} is not allowed for scope {}", usage, scope));
        }

        merged.default_provider = match (&self.default_provider, &incoming.default_provider) {
            (Some(existing), Some(other)) if existing != other => {
                reasons.push(format!("default providers differ: {:?} and {:?}", existing, other));
                Some(existing.clone())
            }
            (existing, other) => existing.clone().or_else(|| other.clone()),
        };
        merged.persister = self.persister.clone().or_else(|| incoming.persister.clone());
        merged.initial = self.initial.clone().or_else(|| incoming.initial.clone());
        merged.ui_parameter_name = self
            .ui_parameter_name
            .clone()
            .or_else(|| incoming.ui_parameter_name.clone());
        merged.save_back = self.save_back.or(incoming.save_back);
        merged.auto_create = self.auto_create.or(incoming.auto_create);
        if merged.validators.is_empty() {
            merged.validators = incoming.validators.clone();
        }
        merged.sensitive = self.sensitive || incoming.sensitive;
        merged.alternate_names.extend(incoming.alternate_names.iter().cloned());
        merged.depends_on.extend(incoming.depends_on.iter().cloned());

        MergeOutcome {
            merged,
            conflict: !reasons.is_empty(),
            reasons,
        }
    }

    /// Merge, turning a conflict into [`CoreError::DefinitionConflict`]
    pub fn try_merge(&self, incoming: &PropertyDefinition) -> Result<PropertyDefinition, CoreError> {
        let outcome = self.merge(incoming);
        if outcome.conflict {
            return Err(CoreError::conflict(&self.name, outcome.reasons.join("; ")));
        }
        Ok(outcome.merged)
    }
}

impl PartialEq for PropertyDefinition {
    fn eq(&self, other: &Self) -> bool {
        let same_persister = match (&self.persister, &other.persister) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_persister
            && self.name == other.name
            && self.data_type == other.data_type
            && self.scope == other.scope
            && self.usage == other.usage
            && self.default_provider == other.default_provider
            && self.initial == other.initial
            && self.ui_parameter_name == other.ui_parameter_name
            && self.validators == other.validators
            && self.depends_on == other.depends_on
            && self.alternate_names == other.alternate_names
            && self.sensitive == other.sensitive
            && self.save_back == other.save_back
            && self.auto_create == other.auto_create
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("name", &self.name)
            .field("data_type", &self.data_type.to_string())
            .field("scope", &self.scope)
            .field("usage", &self.usage)
            .field("default_provider", &self.default_provider)
            .field("persister", &self.persister.is_some())
            .field("initial", &self.initial)
            .field("depends_on", &self.depends_on)
            .field("alternate_names", &self.alternate_names)
            .field("sensitive", &self.sensitive)
            .finish_non_exhaustive()
    }
}

/// Copy-on-write setters. On a template each returns a modified copy and
/// leaves the template untouched; otherwise the definition changes in place.
impl CopyOnWrite<PropertyDefinition> {
    /// Set the scope
    pub fn init_scope(self, scope: PropertyScope) -> Self {
        self.init_with(|d| &d.scope, Some(scope), |d, v| d.scope = v)
    }

    /// Set the usage
    pub fn init_usage(self, usage: PropertyUsage) -> Self {
        self.init_with(|d| &d.usage, Some(usage), |d, v| d.usage = v)
    }

    /// Set scope and usage
    pub fn init_access(self, scope: PropertyScope, usage: PropertyUsage) -> Self {
        self.init_scope(scope).init_usage(usage)
    }

    /// Set the data type
    pub fn init_data_type(self, data_type: PropertyDataType) -> Self {
        self.init_with(|d| &d.data_type, data_type, |d, v| d.data_type = v)
    }

    /// Set a fixed default value
    pub fn init_default(self, value: Value) -> Self {
        self.init_provider(ValueProvider::Fixed(value))
    }

    /// Set the default-value provider
    pub fn init_provider(self, provider: ValueProvider) -> Self {
        self.init_with(|d| &d.default_provider, Some(provider), |d, v| d.default_provider = v)
    }

    /// Set the write-back hook
    pub fn init_persister(self, persister: Arc<dyn PropertyPersister>) -> Self {
        let unchanged = self
            .get()
            .persister
            .as_ref()
            .map_or(false, |current| Arc::ptr_eq(current, &persister));
        if unchanged {
            return self;
        }
        self.update(|d| d.persister = Some(persister))
    }

    /// Set the initial serialized value
    pub fn init_initial(self, initial: impl Into<String>) -> Self {
        self.init_with(|d| &d.initial, Some(initial.into()), |d, v| d.initial = v)
    }

    /// Set the UI parameter name
    pub fn init_ui_parameter_name(self, name: impl Into<String>) -> Self {
        self.init_with(|d| &d.ui_parameter_name, Some(name.into()), |d, v| d.ui_parameter_name = v)
    }

    /// Set the sensitive flag
    pub fn init_sensitive(self, sensitive: bool) -> Self {
        self.init_with(|d| &d.sensitive, sensitive, |d, v| d.sensitive = v)
    }

    /// Replace the validation rules
    pub fn init_validators(self, validators: Vec<String>) -> Self {
        self.init_with(|d| &d.validators, validators, |d, v| d.validators = v)
    }

    /// Add dependencies
    pub fn init_depends_on<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut depends_on = self.get().depends_on.clone();
        depends_on.extend(names.into_iter().map(Into::into));
        self.init_with(|d| &d.depends_on, depends_on, |d, v| d.depends_on = v)
    }

    /// Add an alias
    pub fn init_alternate_name(self, name: impl Into<String>) -> Self {
        let mut alternate_names = self.get().alternate_names.clone();
        alternate_names.insert(name.into());
        self.init_with(|d| &d.alternate_names, alternate_names, |d, v| d.alternate_names = v)
    }
}
