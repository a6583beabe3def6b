use std::collections::HashSet;

use crate::document::ParsedDocument;
use crate::validation::{error_codes, ValidationError, Validator};

/// Validates that transitions target a flow type that exists, either in the
/// document or among flows registered elsewhere
pub struct ReferenceValidator {
    known_flows: HashSet<String>,
}

impl ReferenceValidator {
    /// Create a new reference validator that also accepts `known_flows`
    pub fn new(known_flows: HashSet<String>) -> Self {
        ReferenceValidator { known_flows }
    }
}

impl Validator for ReferenceValidator {
    fn validate(&self, document: &ParsedDocument) -> Vec<ValidationError> {
        let defined: HashSet<&str> = document.flow_names().collect();
        let mut errors = Vec::new();

        for (flow_idx, flow) in document.definitions.flows.iter().enumerate() {
            for (idx, activity) in flow.activities.iter().enumerate() {
                let Some(transition) = &activity.transition else {
                    continue;
                };
                let path = format!("definitions.flows[{}].activities[{}].transition", flow_idx, idx);
                let target = transition.next_flow_type.trim();
                if target.is_empty() {
                    errors.push(ValidationError::at(
                        error_codes::MISSING_REQUIRED_FIELD,
                        format!("Transition of activity '{}' has no next_flow_type", activity.name),
                        format!("{}.next_flow_type", path),
                    ));
                } else if !defined.contains(target) && !self.known_flows.contains(target) {
                    let mut available: Vec<&str> = defined
                        .iter()
                        .copied()
                        .chain(self.known_flows.iter().map(String::as_str))
                        .collect();
                    available.sort_unstable();
                    errors.push(ValidationError::at(
                        error_codes::INVALID_REFERENCE,
                        format!(
                            "Flow type '{}' in transition of activity '{}' not found. Available flows: {}",
                            target,
                            activity.name,
                            available.iter().map(|name| format!("'{}'", name)).collect::<Vec<_>>().join(", ")
                        ),
                        format!("{}.next_flow_type", path),
                    ));
                }
            }
        }

        errors
    }
}
