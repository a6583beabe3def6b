//! Flow and activity definitions

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::copy_on_write::CopyOnWrite;
use super::dependencies::order_by_dependencies;
use super::flow_transition::FlowTransition;
use super::property_definition::PropertyDefinition;
use super::property_scope::PropertyScope;
use super::registry::PropertyDefinitionRegistry;
use crate::CoreError;

/// One step of a flow
#[derive(Debug, Clone)]
pub struct ActivityDefinition {
    name: String,
    properties: PropertyDefinitionRegistry,
    declared: Vec<String>,
    transition: Option<FlowTransition>,
    title: Option<String>,
    finishing: bool,
    invisible: bool,
    persist_flow: bool,
}

impl ActivityDefinition {
    /// Activity without properties
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            properties: PropertyDefinitionRegistry::new(format!("activity {}", name)),
            name,
            declared: Vec::new(),
            transition: None,
            title: None,
            finishing: false,
            invisible: false,
            persist_flow: false,
        }
    }

    /// Activity that leaves the flow through `transition`
    pub fn transition(name: impl Into<String>, transition: FlowTransition) -> Self {
        Self::new(name).with_transition(transition)
    }

    /// Declare a property. Activity-local declarations stay on the activity,
    /// all others are merged into the owning flow when the flow is built.
    pub fn with_property(mut self, definition: PropertyDefinition) -> Result<Self, CoreError> {
        self.add_property(definition)?;
        Ok(self)
    }

    /// Declare several properties
    pub fn with_properties<I>(mut self, definitions: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = PropertyDefinition>,
    {
        for definition in definitions {
            self.add_property(definition)?;
        }
        Ok(self)
    }

    /// Declare a property in place
    pub fn add_property(&mut self, definition: PropertyDefinition) -> Result<(), CoreError> {
        if !self.declared.iter().any(|name| name == definition.name()) {
            self.declared.push(definition.name().to_string());
        }
        self.properties.add_definition(definition)
    }

    /// Exit transition
    pub fn with_transition(mut self, transition: FlowTransition) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Completing this activity completes the flow
    pub fn finishing(mut self) -> Self {
        self.finishing = true;
        self
    }

    /// Hidden from navigation
    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    /// Reaching this activity keeps the flow state after completion
    pub fn persist_flow(mut self) -> Self {
        self.persist_flow = true;
        self
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties declared by this activity, in declaration order
    pub fn declared_properties(&self) -> &[String] {
        &self.declared
    }

    /// Activity-level registry
    pub fn properties(&self) -> &PropertyDefinitionRegistry {
        &self.properties
    }

    /// Activity-local definition of `name`, if any
    pub fn local_definition(&self, name: &str) -> Option<&CopyOnWrite<PropertyDefinition>> {
        self.properties
            .get(name)
            .filter(|definition| definition.effective_scope().is_local_to_activity())
    }

    /// Exit transition
    pub fn flow_transition(&self) -> Option<&FlowTransition> {
        self.transition.as_ref()
    }

    /// Display title
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Completing it completes the flow
    pub fn is_finishing(&self) -> bool {
        self.finishing
    }

    /// Hidden from navigation
    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    /// Keeps the flow state after completion
    pub fn is_persist_flow(&self) -> bool {
        self.persist_flow
    }
}

/// A reusable flow: ordered activities plus flow-level properties
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    name: String,
    title: Option<String>,
    description: Option<String>,
    page_name: Option<String>,
    default_after_page: Option<String>,
    properties: PropertyDefinitionRegistry,
    activities: Arc<Vec<ActivityDefinition>>,
}

impl FlowDefinition {
    /// Start building a flow
    pub fn builder(name: impl Into<String>) -> FlowDefinitionBuilder {
        FlowDefinitionBuilder::new(name)
    }

    /// Flow type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display title
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Description text
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Page shown while the flow runs
    pub fn page_name(&self) -> Option<&str> {
        self.page_name.as_deref()
    }

    /// Page shown after the flow completes
    pub fn default_after_page(&self) -> Option<&str> {
        self.default_after_page.as_deref()
    }

    /// Flow-level registry
    pub fn properties(&self) -> &PropertyDefinitionRegistry {
        &self.properties
    }

    /// Activities in order
    pub fn activities(&self) -> &Arc<Vec<ActivityDefinition>> {
        &self.activities
    }

    /// Activity by name
    pub fn activity(&self, name: &str) -> Option<&ActivityDefinition> {
        self.activities.iter().find(|activity| activity.name() == name)
    }

    /// Whether the flow no longer accepts definitions
    pub fn is_frozen(&self) -> bool {
        self.properties.is_frozen()
    }

    /// Merge `definitions` into the flow registry unless a declaration of the
    /// same name already exists there. Used for standard property bundles.
    pub fn add_missing_properties<'a, I>(&mut self, definitions: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = &'a PropertyDefinition>,
    {
        for definition in definitions {
            if !self.properties.contains(definition.name()) {
                self.properties.add_definition(definition.clone())?;
            }
        }
        Ok(())
    }

    /// Add activity-level standard definitions to every activity that does
    /// not declare them
    pub fn add_missing_activity_properties<'a, I>(&mut self, definitions: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = &'a PropertyDefinition> + Clone,
    {
        let activities = Arc::make_mut(&mut self.activities);
        for activity in activities.iter_mut() {
            for definition in definitions.clone() {
                if !activity.properties.contains(definition.name()) {
                    activity.properties.add_definition(definition.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Every definition visible from `activity` (activity-local first)
    pub fn definition_for<'a>(
        &'a self,
        activity: Option<&'a ActivityDefinition>,
        name: &str,
    ) -> Option<&'a CopyOnWrite<PropertyDefinition>> {
        activity
            .and_then(|activity| activity.local_definition(name))
            .or_else(|| self.properties.get(name))
    }

    /// Static dependsOn check over the flow registry and each activity's view
    pub fn check_dependencies(&self) -> Result<(), CoreError> {
        let flow_names: Vec<String> = self.properties.names().map(str::to_string).collect();
        order_by_dependencies(flow_names, |name| self.dependencies_of(None, name))?;
        for activity in self.activities.iter() {
            let names: Vec<String> = activity.properties.names().map(str::to_string).collect();
            order_by_dependencies(names, |name| self.dependencies_of(Some(activity), name))?;
        }
        Ok(())
    }

    pub(crate) fn dependencies_of(&self, activity: Option<&ActivityDefinition>, name: &str) -> Vec<String> {
        self.definition_for(activity, name)
            .map(|definition| definition.dependencies().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Validate and make the definition immutable
    pub fn freeze(&mut self) -> Result<(), CoreError> {
        self.check_dependencies()?;
        self.properties.freeze();
        let activities = Arc::make_mut(&mut self.activities);
        for activity in activities.iter_mut() {
            activity.properties.freeze();
        }
        debug!(flow_type = %self.name, properties = self.properties.len(), "Froze flow definition");
        Ok(())
    }
}

/// Builder for [`FlowDefinition`]
#[derive(Debug)]
pub struct FlowDefinitionBuilder {
    name: String,
    title: Option<String>,
    description: Option<String>,
    page_name: Option<String>,
    default_after_page: Option<String>,
    properties: Vec<PropertyDefinition>,
    activities: Vec<ActivityDefinition>,
}

impl FlowDefinitionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            page_name: None,
            default_after_page: None,
            properties: Vec::new(),
            activities: Vec::new(),
        }
    }

    /// Display title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Description text
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Page shown while the flow runs
    pub fn page_name(mut self, page_name: impl Into<String>) -> Self {
        self.page_name = Some(page_name.into());
        self
    }

    /// Page shown after completion
    pub fn default_after_page(mut self, page: impl Into<String>) -> Self {
        self.default_after_page = Some(page.into());
        self
    }

    /// Flow-level property
    pub fn property(mut self, definition: PropertyDefinition) -> Self {
        self.properties.push(definition);
        self
    }

    /// Append an activity
    pub fn activity(mut self, activity: ActivityDefinition) -> Self {
        self.activities.push(activity);
        self
    }

    /// Append several activities
    pub fn activities<I>(mut self, activities: I) -> Self
    where
        I: IntoIterator<Item = ActivityDefinition>,
    {
        self.activities.extend(activities);
        self
    }

    /// Build the flow. Flow-level properties come first, then each non
    /// activity-local property declared by an activity is merged in, in
    /// activity order. A merge conflict aborts the build.
    pub fn build(self) -> Result<FlowDefinition, CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidDefinition("flow name is blank".to_string()));
        }
        if self.activities.is_empty() {
            return Err(CoreError::InvalidDefinition(format!(
                "flow '{}' has no activities",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for activity in &self.activities {
            if !seen.insert(activity.name()) {
                return Err(CoreError::InvalidDefinition(format!(
                    "flow '{}' declares activity '{}' twice",
                    self.name,
                    activity.name()
                )));
            }
        }

        let mut properties = PropertyDefinitionRegistry::new(format!("flow {}", self.name));
        properties.add_definitions(self.properties)?;
        for activity in &self.activities {
            for definition in activity.properties.iter() {
                if definition.effective_scope() != PropertyScope::ActivityLocal {
                    properties.add_definition(definition.clone()).map_err(|err| match err {
                        CoreError::DefinitionConflict { name, reason } => CoreError::DefinitionConflict {
                            name,
                            reason: format!("{} (declared by activity '{}')", reason, activity.name()),
                        },
                        other => other,
                    })?;
                }
            }
        }

        Ok(FlowDefinition {
            name: self.name,
            title: self.title,
            description: self.description,
            page_name: self.page_name,
            default_after_page: self.default_after_page,
            properties,
            activities: Arc::new(self.activities),
        })
    }
}
