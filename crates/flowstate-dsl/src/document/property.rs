use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A property declaration as written in the document.
///
/// Tokens are kept as strings here and parsed into core types when the
/// document is built, so validation can report every bad token at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDocument {
    pub name: String,

    /// Data-type token such as `integer` or `map<string,list<integer>>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    /// `activityLocal`, `requestFlowLocal`, `flowLocal` or `global`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// `internalState`, `consume`, `use`, `io`, `produce` or `initialize`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Serialized initial value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    /// Fixed default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Name of a registered computed provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default)]
    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_back: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_parameter_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<String>,
}
