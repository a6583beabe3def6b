//! Default-value providers

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::property_definition::PropertyDefinition;
use crate::CoreError;

/// Context a computed provider needs to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderContext {
    /// Any flow state will do
    FlowState,
    /// Needs a current activity
    Activity,
}

/// Read access to already-resolvable property values
pub trait PropertyReader {
    /// Resolve `name` the same way a flow read would
    fn read_property(&self, name: &str) -> Result<Option<Value>, CoreError>;
}

/// What a computed provider sees while it runs
pub struct ValueContext<'a> {
    /// Definition being resolved
    pub definition: &'a PropertyDefinition,
    /// Flow type of the owning flow
    pub flow_type_name: &'a str,
    /// Lookup key of the owning flow state, if any
    pub lookup_key: Option<&'a str>,
    /// Current activity, if any
    pub activity_name: Option<&'a str>,
    reader: &'a dyn PropertyReader,
}

impl<'a> ValueContext<'a> {
    /// Create a context
    pub fn new(
        definition: &'a PropertyDefinition,
        flow_type_name: &'a str,
        lookup_key: Option<&'a str>,
        activity_name: Option<&'a str>,
        reader: &'a dyn PropertyReader,
    ) -> Self {
        Self {
            definition,
            flow_type_name,
            lookup_key,
            activity_name,
            reader,
        }
    }

    /// Value of another property, typically one listed in `depends_on`
    pub fn property(&self, name: &str) -> Result<Option<Value>, CoreError> {
        self.reader.read_property(name)
    }
}

/// Signature of a computed provider
pub type ComputeFn = dyn Fn(&ValueContext<'_>) -> Result<Option<Value>, CoreError> + Send + Sync;

/// Provider that derives a value from its context
#[derive(Clone)]
pub struct ComputedProvider {
    name: String,
    context: ProviderContext,
    compute: Arc<ComputeFn>,
}

impl ComputedProvider {
    /// Create a named provider
    pub fn new<F>(name: impl Into<String>, context: ProviderContext, compute: F) -> Self
    where
        F: Fn(&ValueContext<'_>) -> Result<Option<Value>, CoreError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            context,
            compute: Arc::new(compute),
        }
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required context
    pub fn context(&self) -> ProviderContext {
        self.context
    }
}

impl fmt::Debug for ComputedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProvider")
            .field("name", &self.name)
            .field("context", &self.context)
            .finish()
    }
}

impl PartialEq for ComputedProvider {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.context == other.context
    }
}

/// Default-value provider of a property
#[derive(Debug, Clone, PartialEq)]
pub enum ValueProvider {
    /// Constant value
    Fixed(Value),
    /// Value computed from the flow or activity context
    Computed(ComputedProvider),
}

impl ValueProvider {
    /// Computed provider shorthand
    pub fn computed<F>(name: impl Into<String>, context: ProviderContext, compute: F) -> Self
    where
        F: Fn(&ValueContext<'_>) -> Result<Option<Value>, CoreError> + Send + Sync + 'static,
    {
        ValueProvider::Computed(ComputedProvider::new(name, context, compute))
    }

    /// Produce the default value
    pub fn provide(&self, context: &ValueContext<'_>) -> Result<Option<Value>, CoreError> {
        match self {
            ValueProvider::Fixed(value) => Ok(Some(value.clone())),
            ValueProvider::Computed(provider) => {
                if provider.context == ProviderContext::Activity && context.activity_name.is_none() {
                    return Err(CoreError::NamespaceResolution(format!(
                        "provider '{}' for '{}' needs a current activity",
                        provider.name, context.definition.name()
                    )));
                }
                (provider.compute)(context)
            }
        }
    }
}
