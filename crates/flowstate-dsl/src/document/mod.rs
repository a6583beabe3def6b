mod activity;
mod property;

pub use activity::{ActivityDocument, TransitionDocument};
pub use property::PropertyDocument;

use serde::{Deserialize, Serialize};

/// The complete Flowstate definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// The DSL version (e.g., "1.0")
    pub dsl_version: String,

    /// All definitions in the document
    pub definitions: Definitions,
}

/// Container for all definitions in a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definitions {
    /// Flow definitions
    #[serde(default)]
    pub flows: Vec<FlowDocument>,
}

/// One flow type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    /// Unique flow type name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_name: Option<String>,

    /// Page shown once the flow is done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_after_page: Option<String>,

    /// Properties declared at flow level
    #[serde(default)]
    pub properties: Vec<PropertyDocument>,

    /// Activities in the order they run
    #[serde(default)]
    pub activities: Vec<ActivityDocument>,
}

impl ParsedDocument {
    /// Names of the flows defined in the document
    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.flows.iter().map(|flow| flow.name.as_str())
    }
}

impl FlowDocument {
    /// Flow-level and activity-level property declarations with their paths
    pub fn all_properties<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (String, &'a PropertyDocument)> + 'a {
        let flow_level = self
            .properties
            .iter()
            .enumerate()
            .map(move |(idx, property)| (format!("{}.properties[{}]", path, idx), property));
        let activity_level = self.activities.iter().enumerate().flat_map(move |(activity_idx, activity)| {
            activity.properties.iter().enumerate().map(move |(idx, property)| {
                (
                    format!("{}.activities[{}].properties[{}]", path, activity_idx, idx),
                    property,
                )
            })
        });
        flow_level.chain(activity_level)
    }
}
