use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::document::{FlowDocument, ParsedDocument};
use crate::validation::{error_codes, ValidationError, Validator};

lazy_static! {
    static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap();
}

/// Validates names, uniqueness and property dependencies
pub struct FlowValidator;

impl Default for FlowValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowValidator {
    /// Create a new flow validator
    pub fn new() -> Self {
        FlowValidator
    }

    fn check_name(kind: &str, name: &str, path: &str, errors: &mut Vec<ValidationError>) {
        if name.trim().is_empty() {
            errors.push(ValidationError::at(
                error_codes::MISSING_REQUIRED_FIELD,
                format!("{} name is blank", kind),
                format!("{}.name", path),
            ));
        } else if !NAME_REGEX.is_match(name) {
            errors.push(ValidationError::at(
                error_codes::INVALID_NAME,
                format!("{} name '{}' may only contain letters, digits, '_', '.' and '-'", kind, name),
                format!("{}.name", path),
            ));
        }
    }

    fn check_unique<'a, I>(kind: &str, names: I, path: &str, errors: &mut Vec<ValidationError>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut duplicates = BTreeSet::new();
        for name in names {
            if !seen.insert(name) {
                duplicates.insert(name);
            }
        }
        for duplicate in duplicates {
            errors.push(ValidationError::at(
                error_codes::DUPLICATE_ID,
                format!("Duplicate {} name: '{}'", kind, duplicate),
                path,
            ));
        }
    }

    fn validate_flow(&self, flow: &FlowDocument, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        Self::check_name("Flow", &flow.name, path, &mut errors);

        if flow.activities.is_empty() {
            errors.push(ValidationError::at(
                error_codes::MISSING_REQUIRED_FIELD,
                format!("Flow '{}' has no activities", flow.name),
                format!("{}.activities", path),
            ));
        }

        Self::check_unique(
            "activity",
            flow.activities.iter().map(|activity| activity.name.as_str()),
            &format!("{}.activities", path),
            &mut errors,
        );
        Self::check_unique(
            "property",
            flow.properties.iter().map(|property| property.name.as_str()),
            &format!("{}.properties", path),
            &mut errors,
        );

        for (idx, activity) in flow.activities.iter().enumerate() {
            let activity_path = format!("{}.activities[{}]", path, idx);
            Self::check_name("Activity", &activity.name, &activity_path, &mut errors);
            Self::check_unique(
                "property",
                activity.properties.iter().map(|property| property.name.as_str()),
                &format!("{}.properties", activity_path),
                &mut errors,
            );
        }

        for (property_path, property) in flow.all_properties(path) {
            Self::check_name("Property", &property.name, &property_path, &mut errors);
        }

        errors.extend(self.detect_circular_dependencies(flow, path));
        errors
    }

    /// Depth-first search over the dependsOn graph of every property the flow
    /// declares, at flow or activity level
    fn detect_circular_dependencies(&self, flow: &FlowDocument, path: &str) -> Vec<ValidationError> {
        let mut graph: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (_, property) in flow.all_properties(path) {
            graph
                .entry(property.name.as_str())
                .or_default()
                .extend(property.depends_on.iter().map(String::as_str));
        }

        let mut visited = HashSet::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();
        for &start in graph.keys() {
            if !visited.contains(start) {
                let mut stack = Vec::new();
                Self::find_cycles(start, &graph, &mut visited, &mut stack, &mut cycles);
            }
        }

        cycles
            .into_iter()
            .map(|cycle| {
                ValidationError::at(
                    error_codes::CIRCULAR_DEPENDENCY,
                    format!("Circular dependency between properties: {}", cycle.join(" -> ")),
                    format!("{}.properties", path),
                )
            })
            .collect()
    }

    fn find_cycles<'a>(
        node: &'a str,
        graph: &BTreeMap<&'a str, BTreeSet<&'a str>>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        stack.push(node);

        if let Some(dependencies) = graph.get(node) {
            for &dependency in dependencies {
                if let Some(pos) = stack.iter().position(|&entry| entry == dependency) {
                    let mut cycle: Vec<String> = stack[pos..].iter().map(|name| name.to_string()).collect();
                    cycle.push(dependency.to_string());
                    cycles.push(cycle);
                } else if !visited.contains(dependency) {
                    Self::find_cycles(dependency, graph, visited, stack, cycles);
                }
            }
        }

        stack.pop();
    }
}

impl Validator for FlowValidator {
    fn validate(&self, document: &ParsedDocument) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        Self::check_unique(
            "flow",
            document.flow_names(),
            "definitions.flows",
            &mut errors,
        );
        for (idx, flow) in document.definitions.flows.iter().enumerate() {
            errors.extend(self.validate_flow(flow, &format!("definitions.flows[{}]", idx)));
        }
        errors
    }
}
