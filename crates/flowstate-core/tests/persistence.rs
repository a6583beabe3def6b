//! Persister hooks and sensitive values

use std::sync::Arc;

use anyhow::Result;
use mockall::predicate::{eq, function};
use pretty_assertions::assert_eq;
use serde_json::json;

use flowstate_core::{ActivityDefinition, CoreError, PropertyDefinition, PropertyPersister, PropertyUsage};
use flowstate_test_utils::mocks::create_failing_backend;
use flowstate_test_utils::{init_test_tracing, mock_persister, FlowTestingUtils, MockPersistenceBackend, RecordingPersister};

fn profile_flow(utils: &FlowTestingUtils, definitions: Vec<PropertyDefinition>) -> Result<()> {
    utils.add_flow_definition(
        "profile",
        vec![ActivityDefinition::new("edit").with_properties(definitions)?],
    )?;
    Ok(())
}

#[test]
fn test_write_reaches_the_persister() -> Result<()> {
    init_test_tracing();
    let mut backend = MockPersistenceBackend::new();
    backend
        .expect_write()
        .with(
            eq("profile".to_string()),
            eq("email".to_string()),
            function(|namespace: &Option<String>| namespace.is_some()),
            eq(Some("a@b.c".to_string())),
        )
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let mut utils = FlowTestingUtils::new();
    profile_flow(
        &utils,
        vec![PropertyDefinition::new("email")
            .with_usage(PropertyUsage::Io)
            .with_persister(mock_persister(backend))],
    )?;
    let handle = utils.start_flow("profile", &[])?;
    handle.lock().set_property("email", "a@b.c")?;
    Ok(())
}

#[test]
fn test_failed_write_still_updates_the_cache() -> Result<()> {
    init_test_tracing();
    let mut utils = FlowTestingUtils::new();
    profile_flow(
        &utils,
        vec![PropertyDefinition::new("email")
            .with_usage(PropertyUsage::Io)
            .with_persister(mock_persister(create_failing_backend("disk full")))],
    )?;
    let handle = utils.start_flow("profile", &[])?;
    let mut state = handle.lock();

    match state.set_property("email", "a@b.c") {
        Err(CoreError::PersistenceWrite { property, reason }) => {
            assert_eq!(property, "email");
            assert!(reason.contains("disk full"), "{}", reason);
        }
        other => panic!("Expected PersistenceWrite, got {:?}", other),
    }
    assert_eq!(state.property("email")?, Some(json!("a@b.c")));
    Ok(())
}

#[test]
fn test_sensitive_values_are_never_persisted_or_exported() -> Result<()> {
    init_test_tracing();
    let recorder = Arc::new(RecordingPersister::new());
    let persister: Arc<dyn PropertyPersister> = recorder.clone();
    let mut utils = FlowTestingUtils::new();
    profile_flow(
        &utils,
        vec![
            PropertyDefinition::new("email")
                .with_usage(PropertyUsage::Io)
                .with_persister(Arc::clone(&persister)),
            PropertyDefinition::new("password")
                .with_usage(PropertyUsage::Io)
                .with_persister(Arc::clone(&persister))
                .sensitive(),
        ],
    )?;

    let handle = utils.start_flow("profile", &[("password", "from-caller")])?;
    {
        let mut state = handle.lock();
        state.set_property("email", "a@b.c")?;
        state.set_property("password", "hunter2")?;
        assert_eq!(state.property("password")?, Some(json!("hunter2")));
        assert!(!state.snapshot()?.parameters.contains_key("password"));
    }

    let completion = utils.advance_to_end(&handle)?;
    assert_eq!(recorder.writes_for("email").len(), 1);
    assert!(recorder.writes_for("password").is_empty());
    assert_eq!(recorder.writes().len(), 1);
    assert!(!completion.exported_values.contains_key("password"));
    assert_eq!(completion.exported_values.get("email").map(String::as_str), Some("a@b.c"));
    Ok(())
}

#[test]
fn test_removal_is_persisted_as_none() -> Result<()> {
    let recorder = Arc::new(RecordingPersister::new());
    let mut utils = FlowTestingUtils::new();
    profile_flow(
        &utils,
        vec![PropertyDefinition::new("nickname").with_persister(recorder.clone())],
    )?;
    let handle = utils.start_flow("profile", &[])?;
    let mut state = handle.lock();
    state.set_property("nickname", "bo")?;
    state.remove_property("nickname")?;

    let values: Vec<Option<String>> = recorder.writes().into_iter().map(|write| write.value).collect();
    assert_eq!(values, vec![Some("bo".to_string()), None]);
    assert_eq!(recorder.writes()[0].lookup_key, state.lookup_key());
    Ok(())
}
