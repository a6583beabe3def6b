use anyhow::Result;
use flowstate_core::domain::flow_state::{FS_NEXT_FLOW, FS_RETURN_TO_FLOW};
use flowstate_core::{ComputedProvider, DefinitionSource, LifecycleState, ProviderContext, StandardProperties};
use flowstate_dsl::{DslError, YamlDefinitionSource};
use flowstate_test_utils::{init_test_tracing, FlowTestingUtils};
use pretty_assertions::assert_eq;
use serde_json::json;

const FLOWS: &str = r#"
dsl_version: "1.0"
definitions:
  flows:
    - name: signup
      title: Sign up
      properties:
        - name: email
          data_type: string
          usage: io
        - name: password
          data_type: string
          usage: io
          sensitive: true
      activities:
        - name: collect
          properties:
            - name: count
              data_type: integer
              initial: "1"
        - name: confirm
          properties:
            - name: count
              usage: use
            - name: account
              usage: initialize
              provider: account-id
          transition:
            next_flow_type: welcome
            initial_values:
              source: signup
    - name: welcome
      activities:
        - name: greet
          properties:
            - name: email
              usage: consume
"#;

fn load() -> Result<YamlDefinitionSource> {
    let source = YamlDefinitionSource::loader()
        .provider(ComputedProvider::new("account-id", ProviderContext::FlowState, |_| {
            Ok(Some(json!("acct-1")))
        }))
        .load_str(FLOWS)?;
    Ok(source)
}

#[test]
fn test_document_flows_register_with_standard_properties() -> Result<()> {
    init_test_tracing();
    let utils = FlowTestingUtils::new();
    let registered = utils.manager().register_source(&load()?)?;
    assert_eq!(registered, 2);

    let signup = utils.manager().flow_definition("signup")?;
    assert!(signup.is_frozen());
    assert!(signup.properties().contains("count"));
    assert!(signup.properties().contains(FS_RETURN_TO_FLOW));
    Ok(())
}

#[test]
fn test_yaml_flow_runs_into_its_transition() -> Result<()> {
    init_test_tracing();
    let mut utils = FlowTestingUtils::new();
    utils.manager().register_source(&load()?)?;

    let handle = utils.start_flow("signup", &[("email", "a@b.c"), ("password", "hunter2")])?;
    assert_eq!(handle.lock().property("count")?, Some(json!(1)));

    let completion = utils.advance_to_end(&handle)?;
    assert_eq!(handle.lock().lifecycle(), LifecycleState::Successful);
    assert_eq!(completion.exported_values.get("account").map(String::as_str), Some("acct-1"));
    assert!(!completion.exported_values.contains_key("password"));

    let welcome = utils.current()?;
    let welcome = welcome.lock();
    assert_eq!(welcome.flow_type_name(), "welcome");
    assert_eq!(welcome.property("email")?, Some(json!("a@b.c")));
    assert_eq!(welcome.raw_value(None, "source"), Some("signup"));
    Ok(())
}

#[test]
fn test_definition_errors_surface_from_core() {
    let yaml = r#"
    dsl_version: "1.0"
    definitions:
      flows:
        - name: f
          activities:
            - name: a
              properties: [{ name: count, data_type: integer }]
            - name: b
              properties: [{ name: count, data_type: boolean }]
    "#;

    match YamlDefinitionSource::from_yaml_str(yaml) {
        Err(err @ DslError::DefinitionError(_)) => {
            assert_eq!(err.error_code(), "ERR_DSL_DEFINITION_CONFLICT");
            assert!(err.to_string().contains("count"));
        }
        other => panic!("Expected DefinitionError, got {:?}", other.map(|source| source.len())),
    }
}

#[test]
fn test_standard_bundles_are_not_part_of_the_document() -> Result<()> {
    let source = load()?;
    let welcome = source.flow_definition("welcome")?.expect("welcome is defined");
    assert!(!welcome.properties().contains(FS_NEXT_FLOW));

    let mut welcome = welcome;
    StandardProperties::default().apply(&mut welcome)?;
    assert!(welcome.properties().contains(FS_NEXT_FLOW));
    Ok(())
}
