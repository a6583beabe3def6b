//! Turns a validated document into core flow definitions

use indexmap::IndexMap;

use flowstate_core::{
    ActivityDefinition, ComputedProvider, FlowDefinition, FlowTransition, PropertyDefinition, ValueProvider,
};

use crate::document::{ActivityDocument, FlowDocument, ParsedDocument, PropertyDocument, TransitionDocument};
use crate::error::DslError;
use crate::validation::{error_codes, ValidationError};

/// Named computed providers that property declarations may bind to
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, ComputedProvider>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own name
    pub fn register(&mut self, provider: ComputedProvider) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Provider called `name`
    pub fn get(&self, name: &str) -> Option<&ComputedProvider> {
        self.providers.get(name)
    }

    /// Whether no provider is registered
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build every flow of `document`. Expects a validated document: bad tokens
/// surface as [`DslError::DefinitionError`].
pub fn build_flow_definitions(
    document: &ParsedDocument,
    providers: &ProviderRegistry,
) -> Result<Vec<FlowDefinition>, DslError> {
    let unbound = unbound_providers(document, providers);
    if !unbound.is_empty() {
        return Err(DslError::from_validation_errors(unbound));
    }

    document
        .definitions
        .flows
        .iter()
        .map(|flow| build_flow(flow, providers))
        .collect()
}

fn unbound_providers(document: &ParsedDocument, providers: &ProviderRegistry) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (idx, flow) in document.definitions.flows.iter().enumerate() {
        let path = format!("definitions.flows[{}]", idx);
        for (property_path, property) in flow.all_properties(&path) {
            if let Some(name) = &property.provider {
                if providers.get(name).is_none() {
                    errors.push(ValidationError::at(
                        error_codes::INVALID_REFERENCE,
                        format!("Provider '{}' of property '{}' is not registered", name, property.name),
                        format!("{}.provider", property_path),
                    ));
                }
            }
        }
    }
    errors
}

fn build_flow(flow: &FlowDocument, providers: &ProviderRegistry) -> Result<FlowDefinition, DslError> {
    let mut builder = FlowDefinition::builder(flow.name.as_str());
    if let Some(title) = &flow.title {
        builder = builder.title(title.as_str());
    }
    if let Some(description) = &flow.description {
        builder = builder.description(description.as_str());
    }
    if let Some(page_name) = &flow.page_name {
        builder = builder.page_name(page_name.as_str());
    }
    if let Some(page) = &flow.default_after_page {
        builder = builder.default_after_page(page.as_str());
    }
    for property in &flow.properties {
        builder = builder.property(build_property(property, providers)?);
    }
    for activity in &flow.activities {
        builder = builder.activity(build_activity(activity, providers)?);
    }
    Ok(builder.build()?)
}

fn build_activity(activity: &ActivityDocument, providers: &ProviderRegistry) -> Result<ActivityDefinition, DslError> {
    let properties = activity
        .properties
        .iter()
        .map(|property| build_property(property, providers))
        .collect::<Result<Vec<_>, _>>()?;

    let mut definition = ActivityDefinition::new(activity.name.as_str()).with_properties(properties)?;
    if let Some(title) = &activity.title {
        definition = definition.with_title(title.as_str());
    }
    if let Some(transition) = &activity.transition {
        definition = definition.with_transition(build_transition(transition));
    }
    if activity.finishing {
        definition = definition.finishing();
    }
    if activity.invisible {
        definition = definition.invisible();
    }
    if activity.persist_flow {
        definition = definition.persist_flow();
    }
    Ok(definition)
}

fn build_transition(transition: &TransitionDocument) -> FlowTransition {
    let mut built = FlowTransition::new(
        transition.finish_key.as_deref(),
        transition.next_flow_type.trim(),
        transition.label.as_deref(),
        transition.transition_type,
    );
    for (name, value) in &transition.initial_values {
        built = built.with_initial_value(name.as_str(), value.as_str());
    }
    built
}

/// A registered provider replaces a fixed `default` on the same declaration.
fn build_property(property: &PropertyDocument, providers: &ProviderRegistry) -> Result<PropertyDefinition, DslError> {
    let mut definition = PropertyDefinition::new(property.name.as_str());
    if let Some(token) = &property.data_type {
        definition = definition.with_data_type(token.parse()?);
    }
    if let Some(token) = &property.scope {
        definition = definition.with_scope(token.parse()?);
    }
    if let Some(token) = &property.usage {
        definition = definition.with_usage(token.parse()?);
    }
    if let Some(initial) = &property.initial {
        definition = definition.with_initial(initial.as_str());
    }
    if let Some(value) = &property.default {
        definition = definition.with_default(value.clone());
    }
    if let Some(provider) = property.provider.as_deref().and_then(|name| providers.get(name)) {
        definition = definition.with_provider(ValueProvider::Computed(provider.clone()));
    }
    if property.sensitive {
        definition = definition.sensitive();
    }
    if let Some(save_back) = property.save_back {
        definition = definition.with_save_back(save_back);
    }
    if let Some(auto_create) = property.auto_create {
        definition = definition.with_auto_create(auto_create);
    }
    if !property.depends_on.is_empty() {
        definition = definition.depends_on(property.depends_on.iter().map(String::as_str));
    }
    for name in &property.alternate_names {
        definition = definition.with_alternate_name(name.as_str());
    }
    if let Some(name) = &property.ui_parameter_name {
        definition = definition.with_ui_parameter_name(name.as_str());
    }
    for validator in &property.validators {
        definition = definition.with_validator(validator.as_str());
    }
    definition.validate()?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_dsl_document;
    use flowstate_core::{PropertyScope, PropertyUsage, ProviderContext, TransitionType};
    use serde_json::json;

    #[test]
    fn test_build_carries_declarations() {
        let document = parse_dsl_document(
            r#"
            dsl_version: "1.0"
            definitions:
              flows:
                - name: signup
                  title: Sign up
                  activities:
                    - name: collect
                      properties:
                        - name: email
                          data_type: string
                          scope: flowLocal
                          usage: io
                        - name: attempts
                          data_type: integer
                          scope: activityLocal
                          usage: internalState
                          default: 0
                      transition:
                        next_flow_type: welcome
                        transition_type: alternate
                        initial_values: { source: signup }
                    - name: confirm
                      finishing: true
            "#,
        )
        .unwrap();

        let flows = build_flow_definitions(&document, &ProviderRegistry::new()).unwrap();
        let flow = &flows[0];
        assert_eq!(flow.title(), Some("Sign up"));
        let email = flow.properties().get("email").unwrap();
        assert_eq!(email.effective_usage(), PropertyUsage::Io);
        assert!(flow.properties().get("attempts").is_none());

        let collect = flow.activity("collect").unwrap();
        let attempts = collect.local_definition("attempts").unwrap();
        assert_eq!(attempts.effective_scope(), PropertyScope::ActivityLocal);
        assert_eq!(attempts.default_provider(), Some(&ValueProvider::Fixed(json!(0))));

        let transition = collect.flow_transition().unwrap();
        assert_eq!(transition.key(), "alternate");
        assert_eq!(transition.transition_type(), TransitionType::Alternate);
        assert_eq!(transition.initial_values.get("source").map(String::as_str), Some("signup"));
        assert!(flow.activity("confirm").unwrap().is_finishing());
    }

    #[test]
    fn test_unregistered_provider() {
        let document = parse_dsl_document(
            r#"
            dsl_version: "1.0"
            definitions:
              flows:
                - name: f
                  activities:
                    - name: a
                      properties: [{ name: today, provider: clock }]
            "#,
        )
        .unwrap();

        let err = build_flow_definitions(&document, &ProviderRegistry::new()).unwrap_err();
        assert_eq!(err.error_code(), error_codes::INVALID_REFERENCE);

        let mut providers = ProviderRegistry::new();
        providers.register(ComputedProvider::new("clock", ProviderContext::FlowState, |_| {
            Ok(Some(json!("2026-10-17")))
        }));
        let flows = build_flow_definitions(&document, &providers).unwrap();
        let today = flows[0].properties().get("today").unwrap();
        assert!(matches!(today.default_provider(), Some(ValueProvider::Computed(p)) if p.name() == "clock"));
    }
}
