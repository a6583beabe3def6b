//! Active flow registry under concurrent use

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flowstate_core::{
    ActiveFlowRegistry, ActivityDefinition, FlowAdvance, FlowDefinition, FlowState, LifecycleState,
};
use flowstate_test_utils::init_test_tracing;

fn definition() -> Arc<FlowDefinition> {
    Arc::new(
        FlowDefinition::builder("job")
            .activity(ActivityDefinition::new("run"))
            .build()
            .unwrap(),
    )
}

fn started(definition: &Arc<FlowDefinition>, finished: bool) -> FlowState {
    let mut state = FlowState::new(Arc::clone(definition), BTreeMap::<String, String>::new());
    state.begin().unwrap();
    if finished {
        let outcome = state.advance().unwrap();
        assert!(matches!(outcome, FlowAdvance::Completed(_)), "single activity completes");
    }
    state
}

#[test]
fn test_sweep_while_other_threads_insert_and_lock() {
    init_test_tracing();
    let registry = Arc::new(ActiveFlowRegistry::new());
    let definition = definition();
    let idle_timeout = Duration::from_secs(3600);

    thread::scope(|scope| {
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let definition = Arc::clone(&definition);
            scope.spawn(move || {
                for i in 0..25 {
                    let handle = registry.insert(started(&definition, i % 2 == 0));
                    let _ = handle.lock().lifecycle();
                }
            });
        }
        for _ in 0..2 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..20 {
                    registry.sweep(idle_timeout);
                    for lookup_key in registry.lookup_keys() {
                        if let Some(handle) = registry.get(&lookup_key) {
                            let _ = handle.lock().is_completed();
                        }
                    }
                }
            });
        }
    });

    registry.sweep(idle_timeout);
    assert_eq!(registry.len(), 48);
    for lookup_key in registry.lookup_keys() {
        let handle = registry.get(&lookup_key).unwrap();
        assert_eq!(handle.lock().lifecycle(), LifecycleState::Started);
    }
}

#[test]
fn test_locked_state_survives_sweep() {
    let registry = ActiveFlowRegistry::new();
    let definition = definition();
    let handle = registry.insert(started(&definition, true));
    let lookup_key = handle.lock().lookup_key().to_string();

    {
        let _guard = handle.lock();
        assert_eq!(registry.sweep(Duration::from_secs(3600)), 0);
        assert!(registry.contains(&lookup_key));
    }
    assert_eq!(registry.sweep(Duration::from_secs(3600)), 1);
    assert!(registry.get(&lookup_key).is_none());
}

#[test]
fn test_idle_states_are_swept() {
    let registry = ActiveFlowRegistry::new();
    registry.insert(started(&definition(), false));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(registry.sweep(Duration::from_millis(1)), 1);
    assert!(registry.is_empty());
}
