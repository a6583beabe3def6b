//! Registry of flow states that are still reachable by lookup key

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::flow_state::FlowState;

/// Shared handle to a flow state
pub type FlowStateHandle = Arc<Mutex<FlowState>>;

/// Lookup key → flow state, shared between sessions
#[derive(Debug, Default)]
pub struct ActiveFlowRegistry {
    states: DashMap<String, FlowStateHandle>,
}

impl ActiveFlowRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `state` under its lookup key
    pub fn insert(&self, state: FlowState) -> FlowStateHandle {
        let lookup_key = state.lookup_key().to_string();
        let handle = Arc::new(Mutex::new(state));
        self.states.insert(lookup_key, Arc::clone(&handle));
        handle
    }

    /// Flow state by lookup key
    pub fn get(&self, lookup_key: &str) -> Option<FlowStateHandle> {
        self.states.get(lookup_key).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a flow state
    pub fn remove(&self, lookup_key: &str) -> Option<FlowStateHandle> {
        self.states.remove(lookup_key).map(|(_, handle)| handle)
    }

    /// Whether `lookup_key` is registered
    pub fn contains(&self, lookup_key: &str) -> bool {
        self.states.contains_key(lookup_key)
    }

    /// Number of registered states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// No registered states
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Registered lookup keys
    pub fn lookup_keys(&self) -> Vec<String> {
        self.states.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drop completed states not flagged to persist and states idle for longer
    /// than `idle_timeout`. States locked by someone else are in use and kept.
    /// Returns how many were dropped.
    pub fn sweep(&self, idle_timeout: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(idle_timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout));
        let before = self.states.len();
        self.states.retain(|lookup_key, handle| {
            let state = match handle.try_lock() {
                Some(state) => state,
                None => return true,
            };
            let finished = state.is_completed() && !state.is_persist_past_completion();
            let idle = cutoff.map_or(false, |cutoff| state.is_idle_since(cutoff));
            if finished || idle {
                debug!(lookup_key = %lookup_key, finished, idle, "Sweeping flow state");
            }
            !(finished || idle)
        });
        let removed = before.saturating_sub(self.states.len());
        if removed > 0 {
            info!(removed, remaining = self.states.len(), "Swept active flow states");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow_definition::{ActivityDefinition, FlowDefinition};

    fn state() -> FlowState {
        let definition = FlowDefinition::builder("f")
            .activity(ActivityDefinition::new("a"))
            .build()
            .unwrap();
        FlowState::new(Arc::new(definition), Vec::<(String, String)>::new())
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = ActiveFlowRegistry::new();
        let handle = registry.insert(state());
        let key = handle.lock().lookup_key().to_string();
        assert!(registry.contains(&key));
        assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &handle));
        assert!(registry.remove(&key).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_drops_completed_unless_persisted() {
        let registry = ActiveFlowRegistry::new();
        let done = registry.insert(state());
        done.lock().begin().unwrap();
        done.lock().finish().unwrap();
        let kept = registry.insert(state());
        kept.lock().begin().unwrap();
        kept.lock().set_persist_past_completion(true);
        kept.lock().finish().unwrap();
        let running = registry.insert(state());

        assert_eq!(registry.sweep(Duration::from_secs(3600)), 1);
        assert!(!registry.contains(done.lock().lookup_key()));
        assert!(registry.contains(kept.lock().lookup_key()));
        assert!(registry.contains(running.lock().lookup_key()));
    }

    #[test]
    fn test_sweep_keeps_locked_states() {
        let registry = ActiveFlowRegistry::new();
        let handle = registry.insert(state());
        let guard = handle.lock();
        assert_eq!(registry.sweep(Duration::from_secs(0)), 0);
        drop(guard);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.sweep(Duration::from_millis(1)), 1);
    }
}
