//! Property bundles every flow and activity gets
//!
//! A flow that declares one of these names itself keeps its own declaration.

use serde_json::Value;

use crate::domain::data_type::PropertyDataType;
use crate::domain::flow_definition::FlowDefinition;
use crate::domain::flow_state::{FS_NEXT_FLOW, FS_RETURN_TO_FLOW};
use crate::domain::property_definition::PropertyDefinition;
use crate::domain::property_scope::{PropertyScope, PropertyUsage};
use crate::domain::value_provider::{ProviderContext, ValueProvider, ValueContext};
use crate::CoreError;

/// Display title of the flow
pub const FS_TITLE_TEXT: &str = "fsTitleText";
/// Label of the finish action
pub const FS_FINISH_TEXT: &str = "fsFinishText";
/// Label of the return action
pub const FS_RETURN_TO_TEXT: &str = "fsReturnToText";
/// The flow cannot be canceled
pub const FS_NO_CANCEL: &str = "fsNoCancel";
/// Page shown while the flow runs
pub const FS_PAGE_NAME: &str = "fsPageName";
/// Page shown after the flow
pub const FS_AFTER_PAGE: &str = "fsAfterPage";
/// Whether the flow may be activated
pub const FS_ACTIVATABLE: &str = "fsActivatable";
/// Alternate finish label
pub const FS_ALT_FINISHED: &str = "fsAltFinished";
/// Named transitions out of the flow
pub const FS_FLOW_TRANSITIONS: &str = "fsFlowTransitions";
/// Flow type of the parent flow
pub const FS_RETURN_TO_FLOW_TYPE: &str = "fsReturnToFlowType";
/// Display title of an activity
pub const FA_TITLE_TEXT: &str = "faTitleText";
/// Activity hidden from navigation
pub const FA_INVISIBLE: &str = "faInvisible";

/// `{prefix}flow.{flow}.[{activity}.]{name}` with the `fs`/`fa` prefix
/// dropped from the name and everything after `prefix` lowercased
pub fn message_key(prefix: &str, flow_type_name: &str, activity_name: Option<&str>, property_name: &str) -> String {
    let short = property_name
        .strip_prefix("fs")
        .or_else(|| property_name.strip_prefix("fa"))
        .unwrap_or(property_name);
    let key = match activity_name {
        Some(activity) => format!("flow.{}.{}.{}", flow_type_name, activity, short),
        None => format!("flow.{}.{}", flow_type_name, short),
    };
    format!("{}{}", prefix, key.to_lowercase())
}

fn message_provider(prefix: &str, context: ProviderContext) -> ValueProvider {
    let prefix = prefix.to_string();
    ValueProvider::computed("message", context, move |ctx: &ValueContext<'_>| {
        let activity = if ctx.definition.effective_scope().is_local_to_activity() {
            ctx.activity_name
        } else {
            None
        };
        Ok(Some(Value::String(message_key(
            &prefix,
            ctx.flow_type_name,
            activity,
            ctx.definition.name(),
        ))))
    })
}

/// Flow bundle plus activity bundle, handed to the flow manager
#[derive(Debug, Clone)]
pub struct StandardProperties {
    flow: Vec<PropertyDefinition>,
    activity: Vec<PropertyDefinition>,
}

impl Default for StandardProperties {
    fn default() -> Self {
        Self::new("message:")
    }
}

impl StandardProperties {
    /// The standard bundles, message keys starting with `message_prefix`
    pub fn new(message_prefix: &str) -> Self {
        let text = |name: &str| {
            PropertyDefinition::typed(name, PropertyDataType::string())
                .with_usage(PropertyUsage::Use)
                .with_provider(message_provider(message_prefix, ProviderContext::FlowState))
        };
        let flag = |name: &str, usage: PropertyUsage| {
            PropertyDefinition::typed(name, PropertyDataType::boolean()).with_usage(usage)
        };
        let string = |name: &str, usage: PropertyUsage| {
            PropertyDefinition::typed(name, PropertyDataType::string()).with_usage(usage)
        };

        let flow = vec![
            text(FS_TITLE_TEXT),
            text(FS_FINISH_TEXT),
            text(FS_RETURN_TO_TEXT),
            flag(FS_NO_CANCEL, PropertyUsage::Use),
            string(FS_PAGE_NAME, PropertyUsage::Io),
            string(FS_AFTER_PAGE, PropertyUsage::Io),
            flag(FS_ACTIVATABLE, PropertyUsage::Consume),
            flag(FS_ALT_FINISHED, PropertyUsage::Use),
            PropertyDefinition::typed(
                FS_FLOW_TRANSITIONS,
                PropertyDataType::map(None, Some(PropertyDataType::nested("flowTransition"))),
            )
            .with_usage(PropertyUsage::Use),
            string(FS_RETURN_TO_FLOW, PropertyUsage::Consume),
            string(FS_RETURN_TO_FLOW_TYPE, PropertyUsage::Consume),
            string(FS_NEXT_FLOW, PropertyUsage::Consume),
        ];
        let activity = vec![
            PropertyDefinition::typed(FA_TITLE_TEXT, PropertyDataType::string())
                .with_access(PropertyScope::ActivityLocal, PropertyUsage::Use)
                .with_provider(message_provider(message_prefix, ProviderContext::Activity)),
            PropertyDefinition::typed(FA_INVISIBLE, PropertyDataType::boolean())
                .with_access(PropertyScope::ActivityLocal, PropertyUsage::Consume),
        ];
        Self { flow, activity }
    }

    /// No standard properties at all
    pub fn empty() -> Self {
        Self {
            flow: Vec::new(),
            activity: Vec::new(),
        }
    }

    /// Add a definition to the flow bundle
    pub fn with_flow_property(mut self, definition: PropertyDefinition) -> Self {
        self.flow.push(definition);
        self
    }

    /// Add a definition to the activity bundle
    pub fn with_activity_property(mut self, definition: PropertyDefinition) -> Self {
        self.activity.push(definition);
        self
    }

    /// Flow bundle
    pub fn flow_properties(&self) -> &[PropertyDefinition] {
        &self.flow
    }

    /// Activity bundle
    pub fn activity_properties(&self) -> &[PropertyDefinition] {
        &self.activity
    }

    /// Add every bundle definition `definition` does not declare itself
    pub fn apply(&self, definition: &mut FlowDefinition) -> Result<(), CoreError> {
        definition.add_missing_properties(self.flow.iter())?;
        definition.add_missing_activity_properties(self.activity.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow_definition::ActivityDefinition;

    #[test]
    fn test_message_key() {
        assert_eq!(
            message_key("message:", "SignUp", None, FS_TITLE_TEXT),
            "message:flow.signup.titletext"
        );
        assert_eq!(
            message_key("message:", "SignUp", Some("Email"), FA_TITLE_TEXT),
            "message:flow.signup.email.titletext"
        );
        assert_eq!(message_key("", "f", None, "plain"), "flow.f.plain");
    }

    #[test]
    fn test_bundles_are_valid() {
        let standard = StandardProperties::default();
        for definition in standard.flow_properties().iter().chain(standard.activity_properties()) {
            definition.validate().unwrap();
        }
        assert_eq!(standard.flow_properties().len(), 12);
    }

    #[test]
    fn test_apply_keeps_own_declarations() {
        let mut definition = FlowDefinition::builder("f")
            .property(PropertyDefinition::new(FS_TITLE_TEXT).with_default(Value::String("Mine".to_string())))
            .activity(ActivityDefinition::new("a"))
            .build()
            .unwrap();
        StandardProperties::default().apply(&mut definition).unwrap();
        assert!(definition.properties().get(FS_TITLE_TEXT).unwrap().default_provider().is_some());
        assert_eq!(
            definition.properties().get(FS_TITLE_TEXT).unwrap().data_type(),
            &PropertyDataType::undefined()
        );
        assert!(definition.properties().contains(FS_NEXT_FLOW));
        assert!(definition.activities()[0].properties().contains(FA_TITLE_TEXT));
        assert!(!definition.properties().contains(FA_TITLE_TEXT));
    }
}
