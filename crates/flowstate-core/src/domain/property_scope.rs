//! Property scope and usage policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// How widely a property's storage key is shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyScope {
    /// One value per activity instance
    ActivityLocal,
    /// One value per flow instance, cleared at the end of each request
    RequestFlowLocal,
    /// One value per flow instance
    FlowLocal,
    /// Shared by every flow in the session
    Global,
}

impl Default for PropertyScope {
    fn default() -> Self {
        PropertyScope::FlowLocal
    }
}

impl PropertyScope {
    /// Usages a property of this scope may declare
    pub fn allowed_usages(self) -> &'static [PropertyUsage] {
        use PropertyUsage::*;
        match self {
            PropertyScope::ActivityLocal => &[InternalState, Consume, Use],
            PropertyScope::RequestFlowLocal => &[InternalState, Consume, Use, Io],
            PropertyScope::FlowLocal => &[InternalState, Consume, Use, Io, Produce, Initialize],
            PropertyScope::Global => &[InternalState, Use],
        }
    }

    /// Whether `usage` is legal for this scope
    pub fn is_allowed_usage(self, usage: PropertyUsage) -> bool {
        self.allowed_usages().contains(&usage)
    }

    /// Usage assumed when a definition does not declare one
    pub fn default_usage(self) -> PropertyUsage {
        PropertyUsage::Use
    }

    /// Values of this scope are never handed to a persister
    pub fn is_cache_only(self) -> bool {
        self == PropertyScope::RequestFlowLocal
    }

    /// Values live in the activity instance namespace
    pub fn is_local_to_activity(self) -> bool {
        self == PropertyScope::ActivityLocal
    }

    /// The token used in definition documents
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyScope::ActivityLocal => "activityLocal",
            PropertyScope::RequestFlowLocal => "requestFlowLocal",
            PropertyScope::FlowLocal => "flowLocal",
            PropertyScope::Global => "global",
        }
    }
}

impl fmt::Display for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyScope {
    type Err = CoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "activityLocal" => Ok(PropertyScope::ActivityLocal),
            "requestFlowLocal" => Ok(PropertyScope::RequestFlowLocal),
            "flowLocal" => Ok(PropertyScope::FlowLocal),
            "global" => Ok(PropertyScope::Global),
            other => Err(CoreError::InvalidDefinition(format!("Unknown property scope '{}'", other))),
        }
    }
}

/// Policy governing external settability and copy-back of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyUsage {
    /// Private to the declaring scope
    InternalState,
    /// Read from outside, removed from the outer namespace when the flow succeeds
    Consume,
    /// Read from outside
    Use,
    /// Read from outside and copied back on success
    Io,
    /// Produced for the outside
    Produce,
    /// Initialized by the flow itself and copied back on success
    Initialize,
}

const INPUT: u8 = 0b001;
const OUTPUT: u8 = 0b010;
const RETAIN: u8 = 0b100;

impl PropertyUsage {
    fn capabilities(self) -> u8 {
        match self {
            PropertyUsage::InternalState => RETAIN,
            PropertyUsage::Consume => INPUT,
            PropertyUsage::Use => INPUT | RETAIN,
            PropertyUsage::Io => INPUT | OUTPUT | RETAIN,
            PropertyUsage::Produce | PropertyUsage::Initialize => OUTPUT | RETAIN,
        }
    }

    /// Values may come from outer namespaces
    pub fn is_externally_settable(self) -> bool {
        self.capabilities() & INPUT != 0
    }

    /// Resolved value is copied to the outer namespace when the flow succeeds
    pub fn is_copy_back_on_flow_success(self) -> bool {
        self.capabilities() & OUTPUT != 0
    }

    /// Outer value is removed when the flow succeeds
    pub fn is_cleared_on_flow_success(self) -> bool {
        self.capabilities() & RETAIN == 0
    }

    /// Value is computed by the flow when it starts
    pub fn is_eagerly_initialized(self) -> bool {
        self == PropertyUsage::Initialize
    }

    /// Widening check: `target` keeps every capability of `self`
    pub fn is_changeable_to(self, target: PropertyUsage) -> bool {
        let caps = self.capabilities();
        caps & target.capabilities() == caps
    }

    /// Usage that survives merging two compatible declarations, `None` when
    /// neither widens to the other
    pub fn surviving(existing: PropertyUsage, incoming: PropertyUsage) -> Option<PropertyUsage> {
        if existing.is_changeable_to(incoming) {
            if incoming.is_changeable_to(existing) {
                Some(existing)
            } else {
                Some(incoming)
            }
        } else if incoming.is_changeable_to(existing) {
            Some(existing)
        } else {
            None
        }
    }

    /// The token used in definition documents
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyUsage::InternalState => "internalState",
            PropertyUsage::Consume => "consume",
            PropertyUsage::Use => "use",
            PropertyUsage::Io => "io",
            PropertyUsage::Produce => "produce",
            PropertyUsage::Initialize => "initialize",
        }
    }
}

impl fmt::Display for PropertyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyUsage {
    type Err = CoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "internalState" => Ok(PropertyUsage::InternalState),
            "consume" => Ok(PropertyUsage::Consume),
            "use" => Ok(PropertyUsage::Use),
            "io" => Ok(PropertyUsage::Io),
            "produce" => Ok(PropertyUsage::Produce),
            "initialize" => Ok(PropertyUsage::Initialize),
            other => Err(CoreError::InvalidDefinition(format!("Unknown property usage '{}'", other))),
        }
    }
}
