//! Namespace search order
//!
//! A namespace is the storage key a property value is cached under. `None` is
//! the outer namespace shared by every flow of a session.

use tracing::trace;

use super::property_definition::PropertyDefinition;
use super::property_scope::PropertyScope;
use crate::CoreError;

/// Storage key; `None` is the outer namespace
pub type Namespace = Option<String>;

/// A running flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowContext<'a> {
    /// Flow state lookup key
    pub lookup_key: &'a str,
    /// Flow type name
    pub flow_type_name: &'a str,
}

/// An activity, optionally inside a running flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityContext<'a> {
    /// Flow type the activity belongs to
    pub flow_type_name: &'a str,
    /// Activity name
    pub activity_name: &'a str,
    /// Lookup key of the running flow state, absent at definition time
    pub lookup_key: Option<&'a str>,
}

impl ActivityContext<'_> {
    /// `flowType.activity`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.flow_type_name, self.activity_name)
    }

    /// Namespace of this activity instance
    pub fn instance_namespace(&self) -> String {
        match self.lookup_key {
            Some(lookup_key) => activity_namespace(lookup_key, self.activity_name),
            None => self.full_name(),
        }
    }
}

/// Namespace of an activity inside the flow state `lookup_key`
pub fn activity_namespace(lookup_key: &str, activity_name: &str) -> String {
    format!("{}.{}", lookup_key, activity_name)
}

/// Context a property is resolved in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceContext<'a> {
    /// Current activity available
    Activity(ActivityContext<'a>),
    /// Only the flow state is available
    FlowState(FlowContext<'a>),
}

/// Namespaces to probe for `definition`, most specific first.
///
/// Externally settable usages add fallbacks up to the outer namespace so a
/// caller can set a value without knowing the instance lookup key.
pub fn resolve_search_order(
    definition: &PropertyDefinition,
    context: &NamespaceContext<'_>,
) -> Result<Vec<Namespace>, CoreError> {
    let external = definition.is_externally_settable();
    let scope = definition.effective_scope();
    let mut order: Vec<Namespace> = Vec::with_capacity(5);

    match (context, scope) {
        (_, PropertyScope::Global) => order.push(None),
        (NamespaceContext::Activity(activity), PropertyScope::ActivityLocal) => {
            order.push(Some(activity.instance_namespace()));
            if external {
                order.push(Some(activity.full_name()));
                order.push(Some(activity.activity_name.to_string()));
                order.push(Some(activity.flow_type_name.to_string()));
                order.push(None);
            }
        }
        (NamespaceContext::Activity(activity), _) => {
            order.push(Some(
                activity.lookup_key.unwrap_or(activity.flow_type_name).to_string(),
            ));
            if external {
                order.push(Some(activity.flow_type_name.to_string()));
                order.push(None);
            }
        }
        (NamespaceContext::FlowState(_), PropertyScope::ActivityLocal) => {
            return Err(CoreError::NamespaceResolution(format!(
                "'{}' is activity local but there is no current activity",
                definition.name()
            )));
        }
        (NamespaceContext::FlowState(flow), _) => {
            order.push(Some(flow.lookup_key.to_string()));
            if external {
                order.push(Some(flow.flow_type_name.to_string()));
                order.push(None);
            }
        }
    }

    let mut seen = Vec::with_capacity(order.len());
    order.retain(|namespace| {
        if seen.contains(namespace) {
            false
        } else {
            seen.push(namespace.clone());
            true
        }
    });
    trace!(property = %definition.name(), ?order, "Resolved namespace search order");
    Ok(order)
}

/// Namespace a write goes to: the most specific one
pub fn write_namespace(
    definition: &PropertyDefinition,
    context: &NamespaceContext<'_>,
) -> Result<Namespace, CoreError> {
    Ok(resolve_search_order(definition, context)?
        .into_iter()
        .next()
        .flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::property_scope::PropertyUsage;

    fn activity(lookup_key: Option<&'static str>) -> NamespaceContext<'static> {
        NamespaceContext::Activity(ActivityContext {
            flow_type_name: "signup",
            activity_name: "email",
            lookup_key,
        })
    }

    fn flow() -> NamespaceContext<'static> {
        NamespaceContext::FlowState(FlowContext {
            lookup_key: "k1",
            flow_type_name: "signup",
        })
    }

    fn key(namespace: &str) -> Namespace {
        Some(namespace.to_string())
    }

    #[test]
    fn test_activity_local_external_ends_with_outer() {
        let definition = PropertyDefinition::new("address")
            .with_access(PropertyScope::ActivityLocal, PropertyUsage::Use);
        let order = resolve_search_order(&definition, &activity(Some("k1"))).unwrap();
        assert_eq!(
            order,
            vec![key("k1.email"), key("signup.email"), key("email"), key("signup"), None]
        );
    }

    #[test]
    fn test_activity_local_internal_has_single_entry() {
        let definition = PropertyDefinition::new("address")
            .with_access(PropertyScope::ActivityLocal, PropertyUsage::InternalState);
        let order = resolve_search_order(&definition, &activity(Some("k1"))).unwrap();
        assert_eq!(order, vec![key("k1.email")]);
    }

    #[test]
    fn test_global_is_outer_only() {
        let definition = PropertyDefinition::new("locale").with_scope(PropertyScope::Global);
        assert_eq!(resolve_search_order(&definition, &activity(Some("k1"))).unwrap(), vec![None]);
        assert_eq!(resolve_search_order(&definition, &flow()).unwrap(), vec![None]);
        assert_eq!(write_namespace(&definition, &flow()).unwrap(), None);
    }

    #[test]
    fn test_flow_local_orders() {
        let io = PropertyDefinition::new("p").with_usage(PropertyUsage::Io);
        assert_eq!(
            resolve_search_order(&io, &flow()).unwrap(),
            vec![key("k1"), key("signup"), None]
        );
        assert_eq!(
            resolve_search_order(&io, &activity(None)).unwrap(),
            vec![key("signup"), None]
        );

        let private = PropertyDefinition::new("p")
            .with_access(PropertyScope::FlowLocal, PropertyUsage::InternalState);
        assert_eq!(resolve_search_order(&private, &flow()).unwrap(), vec![key("k1")]);
        assert_eq!(write_namespace(&private, &flow()).unwrap(), key("k1"));
    }

    #[test]
    fn test_activity_local_without_activity_fails() {
        let definition = PropertyDefinition::new("address").with_scope(PropertyScope::ActivityLocal);
        assert!(matches!(
            resolve_search_order(&definition, &flow()),
            Err(CoreError::NamespaceResolution(_))
        ));
    }
}
