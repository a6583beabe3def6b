//! Running flow instances
//!
//! A [`FlowState`] owns the serialized value cache of one flow run. Values are
//! stored per namespace (see [`crate::domain::namespace`]) and materialized into
//! `serde_json::Value`s on read. In-place edits of materialized values are kept
//! until the activity is passivated and written back only for properties with
//! save-back enabled.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::copy_on_write::CopyOnWrite;
use super::dependencies::order_by_dependencies;
use super::events::{ActivityActivated, DomainEvent, FlowLifecycleChanged, FlowStateCreated, FlowStateMorphed};
use super::flow_definition::{ActivityDefinition, FlowDefinition};
use super::flow_transition::{FlowLauncher, TransitionType};
use super::lifecycle::{self, FlowLifecycleListener, LifecycleState};
use super::namespace::{
    resolve_search_order, write_namespace, ActivityContext, FlowContext, Namespace, NamespaceContext,
};
use super::property_definition::{PersistContext, PropertyDefinition};
use super::property_scope::{PropertyScope, PropertyUsage};
use super::value_provider::{PropertyReader, ValueContext};
use crate::CoreError;

/// Flow type to start once the current flow succeeds
pub const FS_NEXT_FLOW: &str = "fsNextFlow";
/// Lookup key of the flow state to return to once the current flow succeeds
pub const FS_RETURN_TO_FLOW: &str = "fsReturnToFlow";

#[derive(Debug, Clone)]
struct Materialized {
    namespace: Namespace,
    value: Value,
    dirty: bool,
}

struct Stored {
    namespace: Namespace,
    value: Value,
}

/// Result of a successful flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowCompletion {
    /// Flow state that completed
    pub lookup_key: String,
    /// Its flow type
    pub flow_type_name: String,
    /// Outer namespace after copy-back; initial values of the next flow
    pub exported_values: BTreeMap<String, String>,
    /// Flow to launch next, if any
    pub next_flow: Option<FlowLauncher>,
    /// Flow state to make current again, if any
    pub return_to_flow_lookup_key: Option<String>,
    /// Keep the completed state registered
    pub persist_past_completion: bool,
}

/// Outcome of [`FlowState::advance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAdvance {
    /// The next activity of the same flow is current
    Activity,
    /// The flow completed successfully
    Completed(FlowCompletion),
    /// The flow left through a cancel transition; nothing was copied back
    Canceled,
    /// The flow continues in place as `flow_type`. The caller resolves the
    /// definition and hands it to [`FlowState::morph`].
    Morph {
        /// Target flow type
        flow_type: String,
    },
}

/// A running instance of a [`FlowDefinition`]
pub struct FlowState {
    lookup_key: String,
    flow_type_name: String,
    definition: Arc<FlowDefinition>,
    current_index: Option<usize>,
    lifecycle: LifecycleState,
    values: HashMap<Namespace, BTreeMap<String, String>>,
    materialized: HashMap<String, Materialized>,
    return_to_flow_lookup_key: Option<String>,
    persist_past_completion: bool,
    verify_initial_values: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<Box<dyn DomainEvent>>,
    listeners: Vec<Arc<dyn FlowLifecycleListener>>,
}

impl FlowState {
    /// New flow state in `created`. `initial_values` land in the outer
    /// namespace, where externally settable properties can pick them up.
    pub fn new<I, K, V>(definition: Arc<FlowDefinition>, initial_values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let lookup_key = Uuid::new_v4().to_string();
        let now = Utc::now();
        let outer: BTreeMap<String, String> = initial_values
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        let return_to_flow_lookup_key = outer.get(FS_RETURN_TO_FLOW).cloned();
        let mut values = HashMap::new();
        if !outer.is_empty() {
            values.insert(None, outer);
        }
        let created = FlowStateCreated {
            lookup_key: lookup_key.clone(),
            flow_type_name: definition.name().to_string(),
            timestamp: now,
        };
        Self {
            flow_type_name: definition.name().to_string(),
            lookup_key,
            definition,
            current_index: None,
            lifecycle: LifecycleState::Created,
            values,
            materialized: HashMap::new(),
            return_to_flow_lookup_key,
            persist_past_completion: false,
            verify_initial_values: true,
            created_at: now,
            updated_at: now,
            events: vec![Box::new(created)],
            listeners: Vec::new(),
        }
    }

    /// Whether outer values must pass `is_deserializable` before use
    pub fn with_verify_initial_values(mut self, verify: bool) -> Self {
        self.verify_initial_values = verify;
        self
    }

    /// Lookup key
    pub fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    /// Flow type name
    pub fn flow_type_name(&self) -> &str {
        &self.flow_type_name
    }

    /// Definition this state runs
    pub fn definition(&self) -> &Arc<FlowDefinition> {
        &self.definition
    }

    /// Lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Whether the flow reached a terminal state
    pub fn is_completed(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    /// Index of the current activity
    pub fn current_activity_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Current activity
    pub fn current_activity(&self) -> Option<&ActivityDefinition> {
        self.current_index
            .and_then(|index| self.definition.activities().get(index))
    }

    /// Flow state to return to when this one succeeds
    pub fn return_to_flow_lookup_key(&self) -> Option<&str> {
        self.return_to_flow_lookup_key.as_deref()
    }

    /// Remember the parent flow state
    pub fn set_return_to_flow(&mut self, lookup_key: impl Into<String>) {
        let lookup_key = lookup_key.into();
        self.values
            .entry(None)
            .or_default()
            .insert(FS_RETURN_TO_FLOW.to_string(), lookup_key.clone());
        self.return_to_flow_lookup_key = Some(lookup_key);
    }

    /// Keep the state registered after it completes
    pub fn is_persist_past_completion(&self) -> bool {
        self.persist_past_completion
    }

    /// Force the persist-past-completion flag
    pub fn set_persist_past_completion(&mut self, persist: bool) {
        self.persist_past_completion = persist;
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last change
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Untouched since `cutoff`
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_at < cutoff
    }

    /// Recorded domain events
    pub fn events(&self) -> &[Box<dyn DomainEvent>] {
        &self.events
    }

    /// Drain recorded domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    /// Register a lifecycle listener
    pub fn add_listener(&mut self, listener: Arc<dyn FlowLifecycleListener>) {
        self.listeners.push(listener);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn ensure_writable(&self) -> Result<(), CoreError> {
        if self.lifecycle.is_terminal() {
            return Err(CoreError::FlowStateTerminal {
                lookup_key: self.lookup_key.clone(),
                state: self.lifecycle,
            });
        }
        Ok(())
    }

    /// Move to `target`. The state is unchanged when the transition is not
    /// allowed; listeners hear about every effective change.
    pub fn transition_to(&mut self, target: LifecycleState) -> Result<(), CoreError> {
        let previous = self.lifecycle;
        self.lifecycle = lifecycle::transition(previous, target)?;
        self.touch();
        if previous != target {
            debug!(lookup_key = %self.lookup_key, from = %previous, to = %target, "Lifecycle changed");
            self.events.push(Box::new(FlowLifecycleChanged {
                lookup_key: self.lookup_key.clone(),
                previous,
                current: target,
                timestamp: self.updated_at,
            }));
            for listener in &self.listeners {
                listener.lifecycle_change(&self.lookup_key, previous, target);
            }
        }
        Ok(())
    }

    fn namespace_context(&self) -> NamespaceContext<'_> {
        match self.current_activity() {
            Some(activity) => NamespaceContext::Activity(ActivityContext {
                flow_type_name: &self.flow_type_name,
                activity_name: activity.name(),
                lookup_key: Some(&self.lookup_key),
            }),
            None => NamespaceContext::FlowState(FlowContext {
                lookup_key: &self.lookup_key,
                flow_type_name: &self.flow_type_name,
            }),
        }
    }

    /// Definition `name` resolves to from the current activity. Undeclared
    /// names get an ad-hoc flow-local io definition.
    pub fn property_definition(&self, name: &str) -> CopyOnWrite<PropertyDefinition> {
        self.definition
            .definition_for(self.current_activity(), name)
            .cloned()
            .unwrap_or_else(|| {
                PropertyDefinition::new(name)
                    .with_access(PropertyScope::FlowLocal, PropertyUsage::Io)
                    .into_template()
            })
    }

    fn find_stored(&self, definition: &PropertyDefinition) -> Result<Option<Stored>, CoreError> {
        if let Some(materialized) = self.materialized.get(definition.name()) {
            return Ok(Some(Stored {
                namespace: materialized.namespace.clone(),
                value: materialized.value.clone(),
            }));
        }
        let order = resolve_search_order(definition, &self.namespace_context())?;
        for (position, namespace) in order.into_iter().enumerate() {
            let serialized = match self
                .values
                .get(&namespace)
                .and_then(|values| values.get(definition.name()))
            {
                Some(serialized) => serialized,
                None => continue,
            };
            if position > 0
                && self.verify_initial_values
                && self.lifecycle.verify_values()
                && !definition.data_type().is_deserializable(serialized)
            {
                warn!(
                    lookup_key = %self.lookup_key,
                    property = %definition.name(),
                    ?namespace,
                    "Ignoring outer value that does not match the property type"
                );
                continue;
            }
            let value = definition.data_type().deserialize(serialized)?;
            return Ok(Some(Stored { namespace, value }));
        }
        Ok(None)
    }

    fn provide_default(&self, definition: &PropertyDefinition) -> Result<Option<Value>, CoreError> {
        if let Some(provider) = definition.default_provider() {
            let context = ValueContext::new(
                definition,
                &self.flow_type_name,
                Some(&self.lookup_key),
                self.current_activity().map(ActivityDefinition::name),
                self,
            );
            if let Some(value) = provider.provide(&context)? {
                return Ok(Some(value));
            }
        }
        match definition.initial() {
            Some(initial) => definition.data_type().deserialize(initial).map(Some),
            None => Ok(None),
        }
    }

    /// Value of `name`: the first namespace in the search order holding one,
    /// else the default provider, else `initial`. Nothing is cached.
    pub fn property(&self, name: &str) -> Result<Option<Value>, CoreError> {
        let definition = self.property_definition(name);
        match self.find_stored(&definition)? {
            Some(stored) => Ok(Some(stored.value)),
            None => self.provide_default(&definition),
        }
    }

    /// Like [`FlowState::property`] but keeps the value materialized for
    /// in-place updates; provided defaults are stored when the property
    /// auto-creates.
    pub fn materialize(&mut self, name: &str) -> Result<Option<Value>, CoreError> {
        self.materialize_with(name, false)
    }

    fn materialize_with(&mut self, name: &str, store_default: bool) -> Result<Option<Value>, CoreError> {
        let definition = self.property_definition(name);
        if let Some(stored) = self.find_stored(&definition)? {
            self.materialized
                .entry(definition.name().to_string())
                .or_insert_with(|| Materialized {
                    namespace: stored.namespace,
                    value: stored.value.clone(),
                    dirty: false,
                });
            return Ok(Some(stored.value));
        }
        let value = self.provide_default(&definition)?;
        if let Some(value) = &value {
            if store_default || definition.is_auto_create() {
                debug!(lookup_key = %self.lookup_key, property = %definition.name(), "Storing provided value");
                self.store(&definition, value, false)?;
            }
        }
        Ok(value)
    }

    fn store(&mut self, definition: &PropertyDefinition, value: &Value, persist: bool) -> Result<(), CoreError> {
        let namespace = write_namespace(definition, &self.namespace_context())?;
        let serialized = definition.data_type().serialize(value)?;
        self.values
            .entry(namespace.clone())
            .or_default()
            .insert(definition.name().to_string(), serialized.clone());
        self.materialized.insert(
            definition.name().to_string(),
            Materialized {
                namespace: namespace.clone(),
                value: value.clone(),
                dirty: false,
            },
        );
        self.touch();
        if persist {
            self.persist(definition, namespace.as_deref(), Some(&serialized))?;
        }
        Ok(())
    }

    fn persist(
        &self,
        definition: &PropertyDefinition,
        namespace: Option<&str>,
        value: Option<&str>,
    ) -> Result<(), CoreError> {
        if definition.is_cache_only() {
            return Ok(());
        }
        let persister = match definition.persister() {
            Some(persister) => persister,
            None => return Ok(()),
        };
        let context = PersistContext {
            flow_type_name: &self.flow_type_name,
            lookup_key: &self.lookup_key,
            activity_name: self.current_activity().map(ActivityDefinition::name),
            namespace,
        };
        persister.persist(&context, definition, value).map_err(|err| {
            warn!(
                lookup_key = %self.lookup_key,
                property = %definition.name(),
                error = %err,
                "Persister rejected write"
            );
            match err {
                err @ CoreError::PersistenceWrite { .. } => err,
                other => CoreError::PersistenceWrite {
                    property: definition.name().to_string(),
                    reason: other.to_string(),
                },
            }
        })
    }

    /// Write `value` to the most specific namespace of `name`. The cache is
    /// updated before the persister runs, so a [`CoreError::PersistenceWrite`]
    /// leaves the new value readable.
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) -> Result<(), CoreError> {
        self.ensure_writable()?;
        let definition = self.property_definition(name);
        self.store(&definition, &value.into(), true)
    }

    /// Remove the value of `name` from its most specific namespace
    pub fn remove_property(&mut self, name: &str) -> Result<(), CoreError> {
        self.ensure_writable()?;
        let definition = self.property_definition(name);
        let namespace = write_namespace(&definition, &self.namespace_context())?;
        self.materialized.remove(definition.name());
        if let Some(values) = self.values.get_mut(&namespace) {
            values.remove(definition.name());
        }
        self.touch();
        self.persist(&definition, namespace.as_deref(), None)
    }

    /// Edit the materialized value of `name` in place. Returns false when the
    /// property has no value. The edit is written back when the activity is
    /// passivated, if the property saves back.
    pub fn update_property<F>(&mut self, name: &str, edit: F) -> Result<bool, CoreError>
    where
        F: FnOnce(&mut Value),
    {
        self.ensure_writable()?;
        if self.materialize(name)?.is_none() {
            return Ok(false);
        }
        let canonical = self.property_definition(name).name().to_string();
        match self.materialized.get_mut(&canonical) {
            Some(materialized) => {
                edit(&mut materialized.value);
                materialized.dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Put values into the outer namespace, as a caller resuming the flow would
    pub fn apply_outer_values<I, K, V>(&mut self, values: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.ensure_writable()?;
        let outer = self.values.entry(None).or_default();
        for (name, value) in values {
            outer.insert(name.into(), value.into());
        }
        self.materialized.clear();
        self.touch();
        Ok(())
    }

    /// Outer namespace as it is now
    pub fn outer_values(&self) -> BTreeMap<String, String> {
        self.values.get(&None).cloned().unwrap_or_default()
    }

    /// Raw serialized value of `name` in `namespace`
    pub fn raw_value(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.values
            .get(&namespace.map(str::to_string))
            .and_then(|values| values.get(name))
            .map(String::as_str)
    }

    /// Outer values plus the resolved values of every output property;
    /// sensitive properties are left out
    pub fn exported_values(&self) -> Result<BTreeMap<String, String>, CoreError> {
        let mut exported = self.outer_values();
        exported.retain(|name, _| !self.property_definition(name).is_sensitive());
        for definition in self.definition.properties().iter() {
            if !definition.is_copy_back_on_flow_success() || definition.effective_scope().is_local_to_activity() {
                continue;
            }
            if let Some(stored) = self.find_stored(definition)? {
                exported.insert(
                    definition.name().to_string(),
                    definition.data_type().serialize(&stored.value)?,
                );
            }
        }
        exported.extend(self.ad_hoc_values());
        Ok(exported)
    }

    /// created → initializing → initialized → starting → started, computing
    /// eager and initial values and activating the first activity
    pub fn begin(&mut self) -> Result<(), CoreError> {
        self.transition_to(LifecycleState::Initializing)?;
        self.initialize_flow_properties()?;
        self.transition_to(LifecycleState::Initialized)?;
        self.transition_to(LifecycleState::Starting)?;
        self.activate(0)?;
        self.transition_to(LifecycleState::Started)?;
        info!(flow_type = %self.flow_type_name, lookup_key = %self.lookup_key, "Started flow state");
        Ok(())
    }

    fn initialize_flow_properties(&mut self) -> Result<(), CoreError> {
        let definition = Arc::clone(&self.definition);
        let roots: Vec<String> = definition
            .properties()
            .iter()
            .filter(|property| !property.effective_scope().is_local_to_activity())
            .filter(|property| property.effective_usage().is_eagerly_initialized() || property.initial().is_some())
            .map(|property| property.name().to_string())
            .collect();
        let order = order_by_dependencies(roots, |name| definition.dependencies_of(None, name))?;
        for name in order {
            let local = definition
                .properties()
                .get(&name)
                .map_or(false, |property| property.effective_scope().is_local_to_activity());
            if !local {
                self.materialize_with(&name, true)?;
            }
        }
        Ok(())
    }

    fn activate(&mut self, index: usize) -> Result<(), CoreError> {
        let definition = Arc::clone(&self.definition);
        let activity = definition.activities().get(index).ok_or_else(|| {
            CoreError::InvalidDefinition(format!(
                "flow '{}' has no activity at position {}",
                definition.name(),
                index
            ))
        })?;
        let order = order_by_dependencies(activity.declared_properties().iter().cloned(), |name| {
            definition.dependencies_of(Some(activity), name)
        })?;
        let previous = self.current_index.replace(index);
        for name in order {
            if let Err(err) = self.materialize_with(&name, true) {
                self.current_index = previous;
                self.materialized.clear();
                return Err(err);
            }
        }
        if activity.is_persist_flow() {
            self.persist_past_completion = true;
        }
        self.touch();
        self.events.push(Box::new(ActivityActivated {
            lookup_key: self.lookup_key.clone(),
            activity_name: activity.name().to_string(),
            index,
            timestamp: self.updated_at,
        }));
        debug!(lookup_key = %self.lookup_key, activity = %activity.name(), index, "Activated activity");
        Ok(())
    }

    fn passivate(&mut self) -> Result<(), CoreError> {
        let dirty: Vec<(String, Value)> = self
            .materialized
            .iter()
            .filter(|(_, materialized)| materialized.dirty)
            .map(|(name, materialized)| (name.clone(), materialized.value.clone()))
            .collect();
        for (name, value) in dirty {
            let definition = self.property_definition(&name);
            if definition.is_save_back() {
                self.store(&definition, &value, true)?;
            } else {
                debug!(lookup_key = %self.lookup_key, property = %name, "Discarding in-place change");
            }
        }
        self.materialized.clear();
        Ok(())
    }

    /// Move to the next activity. Advancing past the last activity, or out
    /// of a finishing one, leaves the flow through the activity's transition:
    /// cancel transitions cancel, morphing ones hand back the target flow
    /// type, everything else completes the flow.
    pub fn advance(&mut self) -> Result<FlowAdvance, CoreError> {
        self.ensure_writable()?;
        if self.lifecycle != LifecycleState::Started {
            return Err(CoreError::IllegalLifecycleTransition {
                from: self.lifecycle,
                to: LifecycleState::Started,
            });
        }
        let finishing = self
            .current_activity()
            .map_or(false, ActivityDefinition::is_finishing);
        self.passivate()?;
        let next = self.current_index.map_or(0, |index| index + 1);
        if !finishing && next < self.definition.activities().len() {
            self.activate(next)?;
            return Ok(FlowAdvance::Activity);
        }
        let exit = self
            .current_activity()
            .and_then(ActivityDefinition::flow_transition)
            .filter(|transition| !transition.is_completing_flow())
            .cloned();
        match exit {
            Some(transition) if transition.transition_type() == TransitionType::Cancel => {
                self.cancel()?;
                Ok(FlowAdvance::Canceled)
            }
            Some(transition) => match transition.launcher() {
                Some(FlowLauncher::Morph { flow_type }) => {
                    debug!(lookup_key = %self.lookup_key, to = %flow_type, "Leaving through morphing transition");
                    Ok(FlowAdvance::Morph { flow_type })
                }
                _ => self.finish().map(FlowAdvance::Completed),
            },
            None => self.finish().map(FlowAdvance::Completed),
        }
    }

    /// Complete the flow successfully: copy output values to the outer
    /// namespace, clear consumed values, drop instance namespaces.
    pub fn finish(&mut self) -> Result<FlowCompletion, CoreError> {
        self.ensure_writable()?;
        if !self.lifecycle.can_transition_to(LifecycleState::Successful) {
            return Err(CoreError::IllegalLifecycleTransition {
                from: self.lifecycle,
                to: LifecycleState::Successful,
            });
        }
        self.passivate()?;
        let next_flow = self.next_flow_launcher()?;
        self.copy_back()?;
        self.clear_consumed();
        self.drop_instance_namespaces();
        self.current_index = None;
        self.transition_to(LifecycleState::Successful)?;

        let mut exported_values = self.outer_values();
        exported_values.retain(|name, _| !self.property_definition(name).is_sensitive());
        let next_flow = next_flow.map(|launcher| match launcher {
            FlowLauncher::StartFromDefinition {
                flow_type,
                initial_values,
            } => {
                let mut values = exported_values.clone();
                values.extend(initial_values);
                FlowLauncher::StartFromDefinition {
                    flow_type,
                    initial_values: values,
                }
            }
            other => other,
        });
        info!(
            flow_type = %self.flow_type_name,
            lookup_key = %self.lookup_key,
            next_flow = ?next_flow,
            "Flow state completed"
        );
        Ok(FlowCompletion {
            lookup_key: self.lookup_key.clone(),
            flow_type_name: self.flow_type_name.clone(),
            exported_values,
            next_flow,
            return_to_flow_lookup_key: self.return_to_flow_lookup_key.clone(),
            persist_past_completion: self.persist_past_completion,
        })
    }

    fn next_flow_launcher(&self) -> Result<Option<FlowLauncher>, CoreError> {
        let next_flow_type = self
            .property(FS_NEXT_FLOW)?
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|flow_type| !flow_type.trim().is_empty());
        if let Some(flow_type) = next_flow_type {
            return Ok(Some(FlowLauncher::StartFromDefinition {
                flow_type,
                initial_values: BTreeMap::new(),
            }));
        }
        Ok(self
            .current_activity()
            .and_then(ActivityDefinition::flow_transition)
            .filter(|transition| transition.is_completing_flow())
            .and_then(|transition| transition.launcher()))
    }

    fn copy_back(&mut self) -> Result<(), CoreError> {
        let definition = Arc::clone(&self.definition);
        for property in definition.properties().iter() {
            if !property.is_copy_back_on_flow_success() || property.effective_scope().is_local_to_activity() {
                continue;
            }
            if let Some(stored) = self.find_stored(property)? {
                let serialized = property.data_type().serialize(&stored.value)?;
                debug!(lookup_key = %self.lookup_key, property = %property.name(), "Copying value back");
                self.values
                    .entry(None)
                    .or_default()
                    .insert(property.name().to_string(), serialized);
            }
        }
        let ad_hoc = self.ad_hoc_values();
        if !ad_hoc.is_empty() {
            self.values.entry(None).or_default().extend(ad_hoc);
        }
        Ok(())
    }

    /// Values written under undeclared names; they behave as flow-local io
    fn ad_hoc_values(&self) -> Vec<(String, String)> {
        self.values
            .get(&Some(self.lookup_key.clone()))
            .map(|values| {
                values
                    .iter()
                    .filter(|(name, _)| !self.definition.properties().contains(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear_consumed(&mut self) {
        let definition = Arc::clone(&self.definition);
        let outer = match self.values.get_mut(&None) {
            Some(outer) => outer,
            None => return,
        };
        for property in definition.properties().iter() {
            if property.effective_usage().is_cleared_on_flow_success() {
                outer.remove(property.name());
            }
        }
        outer.remove(FS_RETURN_TO_FLOW);
        outer.remove(FS_NEXT_FLOW);
    }

    fn drop_instance_namespaces(&mut self) {
        let prefix = format!("{}.", self.lookup_key);
        let lookup_key = self.lookup_key.clone();
        self.values.retain(|namespace, _| match namespace {
            Some(namespace) => namespace != &lookup_key && !namespace.starts_with(&prefix),
            None => true,
        });
        self.materialized.clear();
    }

    /// Leave the flow without copy-back
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        self.ensure_writable()?;
        self.transition_to(LifecycleState::Canceled)?;
        self.current_index = None;
        self.materialized.clear();
        info!(flow_type = %self.flow_type_name, lookup_key = %self.lookup_key, "Flow state canceled");
        Ok(())
    }

    /// Mark the flow failed
    pub fn fail(&mut self, reason: &str) -> Result<(), CoreError> {
        self.ensure_writable()?;
        self.transition_to(LifecycleState::Failed)?;
        self.current_index = None;
        self.materialized.clear();
        warn!(flow_type = %self.flow_type_name, lookup_key = %self.lookup_key, reason, "Flow state failed");
        Ok(())
    }

    /// Turn this state into a run of `definition`, keeping its values and
    /// restarting at the first activity
    pub fn morph(&mut self, definition: Arc<FlowDefinition>) -> Result<(), CoreError> {
        self.ensure_writable()?;
        self.passivate()?;
        let from_flow_type = std::mem::replace(&mut self.flow_type_name, definition.name().to_string());
        self.definition = definition;
        self.current_index = None;
        self.events.push(Box::new(FlowStateMorphed {
            lookup_key: self.lookup_key.clone(),
            from_flow_type: from_flow_type.clone(),
            to_flow_type: self.flow_type_name.clone(),
            timestamp: Utc::now(),
        }));
        if self.lifecycle.is_active() {
            self.activate(0)?;
        }
        info!(lookup_key = %self.lookup_key, from = %from_flow_type, to = %self.flow_type_name, "Morphed flow state");
        Ok(())
    }

    /// Drop every request-scoped value
    pub fn end_request(&mut self) {
        let definition = Arc::clone(&self.definition);
        let request_scoped: Vec<&str> = definition
            .properties()
            .iter()
            .chain(definition.activities().iter().flat_map(|activity| activity.properties().iter()))
            .filter(|property| property.effective_scope() == PropertyScope::RequestFlowLocal)
            .map(PropertyDefinition::name)
            .collect();
        if request_scoped.is_empty() {
            return;
        }
        for values in self.values.values_mut() {
            for name in &request_scoped {
                values.remove(*name);
            }
        }
        for name in &request_scoped {
            self.materialized.remove(*name);
        }
        debug!(lookup_key = %self.lookup_key, cleared = request_scoped.len(), "Ended request");
    }
}

impl PropertyReader for FlowState {
    fn read_property(&self, name: &str) -> Result<Option<Value>, CoreError> {
        self.property(name)
    }
}

impl fmt::Debug for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowState")
            .field("lookup_key", &self.lookup_key)
            .field("flow_type_name", &self.flow_type_name)
            .field("lifecycle", &self.lifecycle)
            .field("current_index", &self.current_index)
            .field("values", &self.values)
            .field("return_to_flow_lookup_key", &self.return_to_flow_lookup_key)
            .field("persist_past_completion", &self.persist_past_completion)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_type::PropertyDataType;
    use crate::domain::flow_definition::ActivityDefinition;
    use crate::domain::flow_transition::{FlowTransition, TransitionType};
    use crate::domain::value_provider::{ProviderContext, ValueProvider};
    use parking_lot::Mutex;
    use serde_json::json;

    fn flow(properties: Vec<PropertyDefinition>, activities: Vec<ActivityDefinition>) -> Arc<FlowDefinition> {
        let mut builder = FlowDefinition::builder("test");
        for property in properties {
            builder = builder.property(property);
        }
        let mut definition = builder.activities(activities).build().unwrap();
        definition.freeze().unwrap();
        Arc::new(definition)
    }

    fn two_steps() -> Vec<ActivityDefinition> {
        vec![ActivityDefinition::new("one"), ActivityDefinition::new("two")]
    }

    fn completed(advance: FlowAdvance) -> FlowCompletion {
        match advance {
            FlowAdvance::Completed(completion) => completion,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_lifecycle_through_completion() {
        let mut state = FlowState::new(flow(vec![], two_steps()), Vec::<(String, String)>::new());
        assert_eq!(state.lifecycle(), LifecycleState::Created);
        state.begin().unwrap();
        assert_eq!(state.lifecycle(), LifecycleState::Started);
        assert_eq!(state.current_activity().unwrap().name(), "one");
        assert_eq!(state.advance().unwrap(), FlowAdvance::Activity);
        assert_eq!(state.current_activity().unwrap().name(), "two");
        let completion = completed(state.advance().unwrap());
        assert_eq!(completion.lookup_key, state.lookup_key());
        assert_eq!(state.lifecycle(), LifecycleState::Successful);
        assert!(matches!(
            state.set_property("x", "y"),
            Err(CoreError::FlowStateTerminal { .. })
        ));
    }

    #[test]
    fn test_advance_requires_start() {
        let mut state = FlowState::new(flow(vec![], two_steps()), Vec::<(String, String)>::new());
        assert!(matches!(
            state.advance(),
            Err(CoreError::IllegalLifecycleTransition { from: LifecycleState::Created, .. })
        ));
        assert_eq!(state.lifecycle(), LifecycleState::Created);
    }

    #[test]
    fn test_initial_value_used_when_nothing_reachable() {
        let count = PropertyDefinition::typed("count", PropertyDataType::integer()).with_initial("3");
        let mut state = FlowState::new(flow(vec![count], two_steps()), Vec::<(String, String)>::new());
        state.begin().unwrap();
        assert_eq!(state.property("count").unwrap(), Some(json!(3)));
        assert_eq!(state.raw_value(Some(state.lookup_key()), "count"), Some("3"));
    }

    #[test]
    fn test_outer_value_wins_over_initial_for_input_usage() {
        let count = PropertyDefinition::typed("count", PropertyDataType::integer()).with_initial("3");
        let mut state = FlowState::new(flow(vec![count], two_steps()), [("count", "7")]);
        state.begin().unwrap();
        assert_eq!(state.property("count").unwrap(), Some(json!(7)));
    }

    #[test]
    fn test_bad_outer_value_ignored() {
        let count = PropertyDefinition::typed("count", PropertyDataType::integer()).with_initial("3");
        let mut state = FlowState::new(flow(vec![count], two_steps()), [("count", "seven")]);
        state.begin().unwrap();
        assert_eq!(state.property("count").unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_initialize_usage_ignores_outer_value_and_copies_back() {
        let token = PropertyDefinition::new("token")
            .with_usage(PropertyUsage::Initialize)
            .with_initial("fresh");
        let mut state = FlowState::new(flow(vec![token], two_steps()), [("token", "stale")]);
        state.begin().unwrap();
        assert_eq!(state.property("token").unwrap(), Some(json!("fresh")));
        state.advance().unwrap();
        let completion = completed(state.advance().unwrap());
        assert_eq!(completion.exported_values.get("token").map(String::as_str), Some("fresh"));
    }

    #[test]
    fn test_consume_cleared_and_instance_namespaces_dropped() {
        let once = PropertyDefinition::new("once").with_usage(PropertyUsage::Consume);
        let mut state = FlowState::new(flow(vec![once], two_steps()), [("once", "v"), ("other", "w")]);
        state.begin().unwrap();
        assert_eq!(state.property("once").unwrap(), Some(json!("v")));
        state.set_property("scratch", "s").unwrap();
        let completion = state.finish().unwrap();
        assert_eq!(
            completion.exported_values,
            BTreeMap::from([
                ("other".to_string(), "w".to_string()),
                ("scratch".to_string(), "s".to_string())
            ])
        );
        assert_eq!(state.raw_value(Some(state.lookup_key()), "scratch"), None);
    }

    #[test]
    fn test_save_back_on_passivation() {
        let tags = PropertyDefinition::typed("tags", PropertyDataType::list(None)).with_default(json!([]));
        let label = PropertyDefinition::new("label")
            .with_default(json!("a"))
            .with_save_back(false);
        let activities = vec![
            ActivityDefinition::new("one")
                .with_properties([PropertyDefinition::new("tags"), PropertyDefinition::new("label")])
                .unwrap(),
            ActivityDefinition::new("two"),
        ];
        let mut state = FlowState::new(flow(vec![tags, label], activities), Vec::<(String, String)>::new());
        state.begin().unwrap();
        assert!(state
            .update_property("tags", |value| {
                if let Value::Array(items) = value {
                    items.push(json!("x"));
                }
            })
            .unwrap());
        assert!(state.update_property("label", |value| *value = json!("b")).unwrap());
        state.advance().unwrap();
        assert_eq!(state.property("tags").unwrap(), Some(json!(["x"])));
        assert_eq!(state.property("label").unwrap(), Some(json!("a")));
    }

    #[test]
    fn test_transition_launches_next_flow_with_exports() {
        let activities = vec![ActivityDefinition::transition(
            "done",
            FlowTransition::new(None, "second", None, TransitionType::Normal).with_initial_value("mode", "fast"),
        )];
        let result = PropertyDefinition::new("result").with_usage(PropertyUsage::Produce);
        let mut state = FlowState::new(flow(vec![result], activities), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.set_property("result", "ok").unwrap();
        let completion = completed(state.advance().unwrap());
        assert_eq!(
            completion.next_flow,
            Some(FlowLauncher::StartFromDefinition {
                flow_type: "second".to_string(),
                initial_values: BTreeMap::from([
                    ("mode".to_string(), "fast".to_string()),
                    ("result".to_string(), "ok".to_string())
                ]),
            })
        );
    }

    #[test]
    fn test_next_flow_property_overrides_transition() {
        let mut state = FlowState::new(flow(vec![], two_steps()), [(FS_NEXT_FLOW, "elsewhere")]);
        state.begin().unwrap();
        let completion = state.finish().unwrap();
        assert!(matches!(
            completion.next_flow,
            Some(FlowLauncher::StartFromDefinition { ref flow_type, .. }) if flow_type == "elsewhere"
        ));
        assert!(!completion.exported_values.contains_key(FS_NEXT_FLOW));
    }

    #[test]
    fn test_cancel_transition_cancels_without_copy_back() {
        let activities = vec![ActivityDefinition::transition(
            "abort",
            FlowTransition::new(None, "elsewhere", None, TransitionType::Cancel),
        )];
        let result = PropertyDefinition::new("result").with_usage(PropertyUsage::Produce);
        let mut state = FlowState::new(flow(vec![result], activities), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.set_property("result", "ok").unwrap();
        assert_eq!(state.advance().unwrap(), FlowAdvance::Canceled);
        assert_eq!(state.lifecycle(), LifecycleState::Canceled);
        assert!(state.outer_values().is_empty());
    }

    #[test]
    fn test_morphing_transition_hands_back_target() {
        let activities = vec![
            ActivityDefinition::new("one"),
            ActivityDefinition::transition("two", FlowTransition::new(None, "bigger", None, TransitionType::Morphing)),
        ];
        let mut state = FlowState::new(flow(vec![], activities), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.advance().unwrap();
        assert_eq!(
            state.advance().unwrap(),
            FlowAdvance::Morph {
                flow_type: "bigger".to_string()
            }
        );
        assert_eq!(state.lifecycle(), LifecycleState::Started);
    }

    #[test]
    fn test_failed_activation_keeps_previous_activity() {
        let failing = ValueProvider::computed("failing", ProviderContext::FlowState, |_| {
            Err(CoreError::Other("provider down".to_string()))
        });
        let activities = vec![
            ActivityDefinition::new("one"),
            ActivityDefinition::new("two")
                .with_property(
                    PropertyDefinition::new("boom")
                        .with_access(PropertyScope::ActivityLocal, PropertyUsage::Use)
                        .with_provider(failing),
                )
                .unwrap(),
        ];
        let mut state = FlowState::new(flow(vec![], activities), Vec::<(String, String)>::new());
        state.begin().unwrap();
        assert!(matches!(state.advance(), Err(CoreError::Other(_))));
        assert_eq!(state.current_activity_index(), Some(0));
        assert_eq!(state.current_activity().unwrap().name(), "one");
    }

    #[test]
    fn test_undeclared_property_accepts_any_value() {
        let mut state = FlowState::new(flow(vec![], two_steps()), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.set_property("undeclared", 5).unwrap();
        assert_eq!(state.property("undeclared").unwrap(), Some(json!("5")));
        let completion = state.finish().unwrap();
        assert_eq!(completion.exported_values.get("undeclared").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_request_scoped_values_cleared() {
        let otp = PropertyDefinition::new("otp").with_access(PropertyScope::RequestFlowLocal, PropertyUsage::Use);
        let mut state = FlowState::new(flow(vec![otp], two_steps()), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.set_property("otp", "1234").unwrap();
        state.end_request();
        assert_eq!(state.property("otp").unwrap(), None);
    }

    #[test]
    fn test_cancel_skips_copy_back() {
        let result = PropertyDefinition::new("result").with_usage(PropertyUsage::Produce);
        let mut state = FlowState::new(flow(vec![result], two_steps()), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.set_property("result", "ok").unwrap();
        state.cancel().unwrap();
        assert_eq!(state.lifecycle(), LifecycleState::Canceled);
        assert!(state.outer_values().is_empty());
        assert!(state.cancel().is_err());
    }

    #[test]
    fn test_listener_notified_and_events_recorded() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<(LifecycleState, LifecycleState)>>);
        impl FlowLifecycleListener for Recorder {
            fn lifecycle_change(&self, _lookup_key: &str, previous: LifecycleState, current: LifecycleState) {
                self.0.lock().push((previous, current));
            }
        }

        let recorder = Arc::new(Recorder::default());
        let mut state = FlowState::new(flow(vec![], two_steps()), Vec::<(String, String)>::new());
        state.add_listener(recorder.clone());
        state.begin().unwrap();
        assert_eq!(
            recorder.0.lock().clone(),
            vec![
                (LifecycleState::Created, LifecycleState::Initializing),
                (LifecycleState::Initializing, LifecycleState::Initialized),
                (LifecycleState::Initialized, LifecycleState::Starting),
                (LifecycleState::Starting, LifecycleState::Started),
            ]
        );
        let types: Vec<_> = state.take_events().iter().map(|event| event.event_type()).collect();
        assert_eq!(types.first(), Some(&"flow_state.created"));
        assert!(types.contains(&"activity.activated"));
        assert!(state.events().is_empty());
    }

    #[test]
    fn test_morph_keeps_values() {
        let mut state = FlowState::new(flow(vec![], two_steps()), Vec::<(String, String)>::new());
        state.begin().unwrap();
        state.set_property("kept", "yes").unwrap();
        let mut other = FlowDefinition::builder("other")
            .activity(ActivityDefinition::new("only"))
            .build()
            .unwrap();
        other.freeze().unwrap();
        state.morph(Arc::new(other)).unwrap();
        assert_eq!(state.flow_type_name(), "other");
        assert_eq!(state.current_activity().unwrap().name(), "only");
        assert_eq!(state.property("kept").unwrap(), Some(json!("yes")));
    }
}
