//! Flow testing harness
//!
//! Wraps a [`FlowManager`] and one [`FlowManagement`] session so tests can
//! define flows from activities and run them in a few lines.

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use flowstate_core::{
    ActiveFlowRegistry, ActivityDefinition, EngineConfig, FlowCompletion, FlowDefinition, FlowManagement,
    FlowManager, FlowStateHandle, ReturnToFlow, StandardProperties,
};

/// Test harness around one session
pub struct FlowTestingUtils {
    manager: Arc<FlowManager>,
    session: FlowManagement,
}

impl Default for FlowTestingUtils {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowTestingUtils {
    /// Harness with the standard bundles and default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Harness with `config`
    pub fn with_config(config: EngineConfig) -> Self {
        let standard = StandardProperties::new(&config.message_prefix);
        Self::with_parts(standard, config)
    }

    /// Harness with explicit standard properties
    pub fn with_parts(standard: StandardProperties, config: EngineConfig) -> Self {
        let manager = Arc::new(FlowManager::new(standard, config));
        let session = FlowManagement::new(Arc::clone(&manager), Arc::new(ActiveFlowRegistry::new()));
        Self { manager, session }
    }

    /// Flow manager
    pub fn manager(&self) -> &Arc<FlowManager> {
        &self.manager
    }

    /// Session
    pub fn session(&self) -> &FlowManagement {
        &self.session
    }

    /// Mutable session
    pub fn session_mut(&mut self) -> &mut FlowManagement {
        &mut self.session
    }

    /// Define and register a flow made of `activities`
    pub fn add_flow_definition(
        &self,
        flow_type: &str,
        activities: Vec<ActivityDefinition>,
    ) -> Result<Arc<FlowDefinition>> {
        let definition = FlowDefinition::builder(flow_type).activities(activities).build()?;
        self.add_flow(definition)
    }

    /// Register a prebuilt flow
    pub fn add_flow(&self, definition: FlowDefinition) -> Result<Arc<FlowDefinition>> {
        Ok(self.manager.register(definition)?)
    }

    /// Start `flow_type` as the current flow
    pub fn start_flow(&mut self, flow_type: &str, initial_values: &[(&str, &str)]) -> Result<FlowStateHandle> {
        self.start_flow_returning(flow_type, initial_values, ReturnToFlow::None)
    }

    /// Start `flow_type` as the current flow, returning to `return_to`
    pub fn start_flow_returning(
        &mut self,
        flow_type: &str,
        initial_values: &[(&str, &str)],
        return_to: ReturnToFlow,
    ) -> Result<FlowStateHandle> {
        let values: BTreeMap<String, String> = initial_values
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Ok(self.session.start_flow_state(flow_type, true, values, return_to)?)
    }

    /// Advance `handle` until its flow completes
    pub fn advance_to_end(&mut self, handle: &FlowStateHandle) -> Result<FlowCompletion> {
        let (lookup_key, activities) = {
            let state = handle.lock();
            (state.lookup_key().to_string(), state.definition().activities().len())
        };
        for _ in 0..=activities {
            if let Some(completion) = self.session.advance(&lookup_key)? {
                return Ok(completion);
            }
        }
        bail!("flow state {} did not complete after {} steps", lookup_key, activities + 1)
    }

    /// Current flow state of the session
    pub fn current(&self) -> Result<FlowStateHandle> {
        self.session
            .current_flow_state()
            .ok_or_else(|| anyhow!("session has no current flow state"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstate_core::LifecycleState;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_advance_to_end() -> Result<()> {
        let mut utils = FlowTestingUtils::new();
        utils.add_flow_definition("f", vec![ActivityDefinition::new("a"), ActivityDefinition::new("b")])?;
        let handle = utils.start_flow("f", &[("x", "1")])?;
        let completion = utils.advance_to_end(&handle)?;
        assert_eq!(handle.lock().lifecycle(), LifecycleState::Successful);
        assert_eq!(completion.exported_values.get("x").map(String::as_str), Some("1"));
        assert!(utils.current().is_err());
        Ok(())
    }
}
