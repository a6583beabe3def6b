//! Per-session flow handling
//!
//! A session keeps a stack of flow states; the top one is current. Completing
//! a flow launches its next flow or returns to its parent.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::active_flows::{ActiveFlowRegistry, FlowStateHandle};
use super::flow_manager::FlowManager;
use crate::domain::flow_state::{FlowAdvance, FlowCompletion};
use crate::domain::flow_transition::FlowLauncher;
use crate::domain::lifecycle::FlowLifecycleListener;
use crate::CoreError;

/// Which flow state a newly started flow returns to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReturnToFlow {
    /// No parent
    #[default]
    None,
    /// The session's current flow state
    Current,
    /// A specific flow state
    LookupKey(String),
}

/// Session view on the flow engine
pub struct FlowManagement {
    manager: Arc<FlowManager>,
    active: Arc<ActiveFlowRegistry>,
    session_flows: Vec<String>,
    listeners: Vec<Arc<dyn FlowLifecycleListener>>,
}

impl FlowManagement {
    /// Session sharing `manager` and the `active` registry with other sessions
    pub fn new(manager: Arc<FlowManager>, active: Arc<ActiveFlowRegistry>) -> Self {
        Self {
            manager,
            active,
            session_flows: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Flow manager
    pub fn manager(&self) -> &Arc<FlowManager> {
        &self.manager
    }

    /// Active-flow registry
    pub fn active_flows(&self) -> &Arc<ActiveFlowRegistry> {
        &self.active
    }

    /// Listener added to every flow state this session starts
    pub fn add_listener(&mut self, listener: Arc<dyn FlowLifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Lookup keys of this session's flow states, current last
    pub fn session_flows(&self) -> &[String] {
        &self.session_flows
    }

    fn make_current(&mut self, lookup_key: &str) {
        self.session_flows.retain(|key| key != lookup_key);
        self.session_flows.push(lookup_key.to_string());
    }

    fn forget(&mut self, lookup_key: &str) {
        self.session_flows.retain(|key| key != lookup_key);
    }

    /// Create, begin and register a flow state of `flow_type`
    pub fn start_flow_state(
        &mut self,
        flow_type: &str,
        make_current: bool,
        initial_values: BTreeMap<String, String>,
        return_to: ReturnToFlow,
    ) -> Result<FlowStateHandle, CoreError> {
        if self.manager.config().sweep_on_start {
            self.sweep();
        }
        let parent = match return_to {
            ReturnToFlow::None => None,
            ReturnToFlow::Current => self.current_lookup_key(),
            ReturnToFlow::LookupKey(lookup_key) => {
                if !self.active.contains(&lookup_key) {
                    return Err(CoreError::FlowStateNotFound(lookup_key));
                }
                Some(lookup_key)
            }
        };

        let mut state = self.manager.create_flow_state(flow_type, initial_values)?;
        if let Some(parent) = &parent {
            state.set_return_to_flow(parent.clone());
        }
        for listener in &self.listeners {
            state.add_listener(Arc::clone(listener));
        }
        state.begin()?;

        let lookup_key = state.lookup_key().to_string();
        let handle = self.active.insert(state);
        if make_current {
            self.make_current(&lookup_key);
        }
        info!(flow_type, lookup_key = %lookup_key, parent = ?parent, "Started flow");
        Ok(handle)
    }

    /// Resume an existing flow state, applying `values` to its outer namespace
    pub fn continue_flow_state(
        &mut self,
        lookup_key: &str,
        make_current: bool,
        values: BTreeMap<String, String>,
    ) -> Result<FlowStateHandle, CoreError> {
        let handle = self.flow_state(lookup_key)?;
        if !values.is_empty() {
            handle.lock().apply_outer_values(values)?;
        }
        if make_current {
            self.make_current(lookup_key);
        }
        debug!(lookup_key, "Continued flow");
        Ok(handle)
    }

    fn current_lookup_key(&self) -> Option<String> {
        self.session_flows
            .iter()
            .rev()
            .find(|key| self.active.contains(key))
            .cloned()
    }

    /// Current flow state of the session
    pub fn current_flow_state(&self) -> Option<FlowStateHandle> {
        self.current_lookup_key()
            .and_then(|lookup_key| self.active.get(&lookup_key))
    }

    /// Flow state by lookup key
    pub fn flow_state(&self, lookup_key: &str) -> Result<FlowStateHandle, CoreError> {
        self.active
            .get(lookup_key)
            .ok_or_else(|| CoreError::FlowStateNotFound(lookup_key.to_string()))
    }

    /// Advance a flow state. On completion the next or parent flow becomes
    /// current; a cancel transition releases the flow like [`Self::cancel_flow`];
    /// a morphing transition morphs the same flow state in place.
    pub fn advance(&mut self, lookup_key: &str) -> Result<Option<FlowCompletion>, CoreError> {
        let handle = self.flow_state(lookup_key)?;
        let outcome = handle.lock().advance()?;
        match outcome {
            FlowAdvance::Activity => Ok(None),
            FlowAdvance::Completed(completion) => {
                self.complete(&completion)?;
                Ok(Some(completion))
            }
            FlowAdvance::Canceled => {
                let parent = handle.lock().return_to_flow_lookup_key().map(str::to_string);
                self.release_canceled(lookup_key, parent);
                Ok(None)
            }
            FlowAdvance::Morph { flow_type } => {
                self.morph_flow(lookup_key, &flow_type)?;
                self.make_current(lookup_key);
                Ok(None)
            }
        }
    }

    /// Finish a flow state successfully wherever it is
    pub fn finish_flow(&mut self, lookup_key: &str) -> Result<FlowCompletion, CoreError> {
        let handle = self.flow_state(lookup_key)?;
        let completion = handle.lock().finish()?;
        self.complete(&completion)?;
        Ok(completion)
    }

    fn complete(&mut self, completion: &FlowCompletion) -> Result<(), CoreError> {
        self.forget(&completion.lookup_key);
        if !completion.persist_past_completion {
            self.active.remove(&completion.lookup_key);
        }
        let return_to = match &completion.return_to_flow_lookup_key {
            Some(parent) if self.active.contains(parent) => ReturnToFlow::LookupKey(parent.clone()),
            Some(parent) => {
                debug!(parent = %parent, "Parent flow state is gone");
                ReturnToFlow::None
            }
            None => ReturnToFlow::None,
        };
        match completion.next_flow.clone() {
            Some(FlowLauncher::StartFromDefinition {
                flow_type,
                initial_values,
            }) => {
                self.start_flow_state(&flow_type, true, initial_values, return_to)?;
            }
            Some(FlowLauncher::Continue {
                lookup_key,
                initial_values,
            }) => {
                let mut values = completion.exported_values.clone();
                values.extend(initial_values);
                self.continue_flow_state(&lookup_key, true, values)?;
            }
            // completed flows never carry a morph launcher; morphing happens
            // in place before completion
            Some(FlowLauncher::Morph { .. }) | None => {
                if let ReturnToFlow::LookupKey(parent) = return_to {
                    self.continue_flow_state(&parent, true, completion.exported_values.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Cancel a flow state; its parent, if any, becomes current again
    pub fn cancel_flow(&mut self, lookup_key: &str) -> Result<(), CoreError> {
        let handle = self.flow_state(lookup_key)?;
        let parent = {
            let mut state = handle.lock();
            state.cancel()?;
            state.return_to_flow_lookup_key().map(str::to_string)
        };
        self.release_canceled(lookup_key, parent);
        Ok(())
    }

    fn release_canceled(&mut self, lookup_key: &str, parent: Option<String>) {
        self.forget(lookup_key);
        self.active.remove(lookup_key);
        if let Some(parent) = parent {
            if self.active.contains(&parent) {
                self.make_current(&parent);
            }
        }
    }

    /// Turn a running flow state into a run of `flow_type`
    pub fn morph_flow(&mut self, lookup_key: &str, flow_type: &str) -> Result<FlowStateHandle, CoreError> {
        let definition = self.manager.flow_definition(flow_type)?;
        let handle = self.flow_state(lookup_key)?;
        handle.lock().morph(definition)?;
        Ok(handle)
    }

    /// Forget a flow state without completing it
    pub fn drop_flow_state(&mut self, lookup_key: &str) -> Option<FlowStateHandle> {
        self.forget(lookup_key);
        self.active.remove(lookup_key)
    }

    /// Drop request-scoped values of every flow state in this session
    pub fn end_request(&self) {
        for lookup_key in &self.session_flows {
            if let Some(handle) = self.active.get(lookup_key) {
                handle.lock().end_request();
            }
        }
    }

    /// Sweep the active registry and forget swept flows
    pub fn sweep(&mut self) -> usize {
        let removed = self.active.sweep(self.manager.config().idle_timeout());
        let active = Arc::clone(&self.active);
        self.session_flows.retain(|key| active.contains(key));
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::standard_properties::StandardProperties;
    use crate::config::EngineConfig;
    use crate::domain::flow_definition::{ActivityDefinition, FlowDefinition};
    use crate::domain::lifecycle::LifecycleState;

    fn session() -> FlowManagement {
        let manager = FlowManager::new(StandardProperties::default(), EngineConfig::default());
        for name in ["parent", "child"] {
            manager
                .register(
                    FlowDefinition::builder(name)
                        .activities([ActivityDefinition::new("one"), ActivityDefinition::new("two")])
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        FlowManagement::new(Arc::new(manager), Arc::new(ActiveFlowRegistry::new()))
    }

    #[test]
    fn test_start_makes_current() {
        let mut session = session();
        let handle = session
            .start_flow_state("parent", true, BTreeMap::new(), ReturnToFlow::None)
            .unwrap();
        let current = session.current_flow_state().unwrap();
        assert!(Arc::ptr_eq(&handle, &current));
        assert_eq!(current.lock().lifecycle(), LifecycleState::Started);
    }

    #[test]
    fn test_unknown_flow_type() {
        let mut session = session();
        assert!(matches!(
            session.start_flow_state("nope", true, BTreeMap::new(), ReturnToFlow::None),
            Err(CoreError::FlowDefinitionNotFound(_))
        ));
        assert!(matches!(
            session.start_flow_state("child", true, BTreeMap::new(), ReturnToFlow::LookupKey("gone".to_string())),
            Err(CoreError::FlowStateNotFound(_))
        ));
    }

    #[test]
    fn test_cancel_child_returns_to_parent() {
        let mut session = session();
        let parent = session
            .start_flow_state("parent", true, BTreeMap::new(), ReturnToFlow::None)
            .unwrap();
        let parent_key = parent.lock().lookup_key().to_string();
        let child = session
            .start_flow_state("child", true, BTreeMap::new(), ReturnToFlow::Current)
            .unwrap();
        let child_key = child.lock().lookup_key().to_string();
        assert_eq!(child.lock().return_to_flow_lookup_key(), Some(parent_key.as_str()));

        session.cancel_flow(&child_key).unwrap();
        assert_eq!(child.lock().lifecycle(), LifecycleState::Canceled);
        assert!(session.flow_state(&child_key).is_err());
        assert_eq!(
            session.current_flow_state().unwrap().lock().lookup_key(),
            parent_key
        );
    }

    #[test]
    fn test_drop_and_morph() {
        let mut session = session();
        let handle = session
            .start_flow_state("parent", true, BTreeMap::new(), ReturnToFlow::None)
            .unwrap();
        let key = handle.lock().lookup_key().to_string();
        session.morph_flow(&key, "child").unwrap();
        assert_eq!(handle.lock().flow_type_name(), "child");
        assert!(session.drop_flow_state(&key).is_some());
        assert!(session.current_flow_state().is_none());
    }
}
