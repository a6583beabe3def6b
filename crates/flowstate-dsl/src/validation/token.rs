use flowstate_core::{PropertyDataType, PropertyScope, PropertyUsage};

use crate::document::{ParsedDocument, PropertyDocument};
use crate::validation::{error_codes, ValidationError, Validator};

/// Validates data-type, scope and usage tokens and the values typed by them
pub struct TokenValidator;

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenValidator {
    /// Create a new token validator
    pub fn new() -> Self {
        TokenValidator
    }

    fn validate_property(&self, property: &PropertyDocument, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let data_type = match property.data_type.as_deref().map(str::parse::<PropertyDataType>) {
            Some(Err(err)) => {
                errors.push(ValidationError::at(
                    error_codes::INVALID_DATA_TYPE,
                    format!("Property '{}': {}", property.name, err),
                    format!("{}.data_type", path),
                ));
                None
            }
            Some(Ok(data_type)) => Some(data_type),
            None => Some(PropertyDataType::undefined()),
        };

        let scope = match property.scope.as_deref().map(str::parse::<PropertyScope>) {
            Some(Err(err)) => {
                errors.push(ValidationError::at(
                    error_codes::INVALID_ACCESS,
                    format!("Property '{}': {}", property.name, err),
                    format!("{}.scope", path),
                ));
                None
            }
            Some(Ok(scope)) => Some(scope),
            None => Some(PropertyScope::default()),
        };

        let usage = match property.usage.as_deref().map(str::parse::<PropertyUsage>) {
            Some(Err(err)) => {
                errors.push(ValidationError::at(
                    error_codes::INVALID_ACCESS,
                    format!("Property '{}': {}", property.name, err),
                    format!("{}.usage", path),
                ));
                None
            }
            Some(Ok(usage)) => Some(usage),
            None => scope.map(PropertyScope::default_usage),
        };

        if let (Some(scope), Some(usage)) = (scope, usage) {
            if !scope.is_allowed_usage(usage) {
                errors.push(ValidationError::at(
                    error_codes::INVALID_ACCESS,
                    format!("Property '{}': usage {} is not allowed for scope {}", property.name, usage, scope),
                    format!("{}.usage", path),
                ));
            }
        }

        if let Some(data_type) = data_type {
            if let Some(initial) = &property.initial {
                if !data_type.is_deserializable(initial) {
                    errors.push(ValidationError::at(
                        error_codes::INVALID_INITIAL_VALUE,
                        format!("Property '{}': initial value '{}' is not a {}", property.name, initial, data_type),
                        format!("{}.initial", path),
                    ));
                }
            }
            if let Some(default) = &property.default {
                if !data_type.conforms(default) {
                    errors.push(ValidationError::at(
                        error_codes::INVALID_INITIAL_VALUE,
                        format!("Property '{}': default {} is not a {}", property.name, default, data_type),
                        format!("{}.default", path),
                    ));
                }
            }
        }

        errors
    }
}

impl Validator for TokenValidator {
    fn validate(&self, document: &ParsedDocument) -> Vec<ValidationError> {
        document
            .definitions
            .flows
            .iter()
            .enumerate()
            .flat_map(|(idx, flow)| {
                let path = format!("definitions.flows[{}]", idx);
                flow.all_properties(&path)
                    .flat_map(|(property_path, property)| self.validate_property(property, &property_path))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(data_type: Option<&str>, scope: Option<&str>, usage: Option<&str>) -> PropertyDocument {
        PropertyDocument {
            name: "p".to_string(),
            data_type: data_type.map(str::to_string),
            scope: scope.map(str::to_string),
            usage: usage.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_tokens() {
        let validator = TokenValidator::new();
        let errors = validator.validate_property(
            &property(Some("map<string,list<integer>>"), Some("requestFlowLocal"), Some("io")),
            "p",
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_unknown_tokens_are_all_reported() {
        let errors = TokenValidator::new().validate_property(&property(Some("widget"), Some("galaxy"), Some("eat")), "p");
        let codes: Vec<_> = errors.iter().map(|err| err.code).collect();
        assert_eq!(
            codes,
            vec![
                error_codes::INVALID_DATA_TYPE,
                error_codes::INVALID_ACCESS,
                error_codes::INVALID_ACCESS
            ]
        );
    }

    #[test]
    fn test_usage_not_allowed_for_scope() {
        let errors = TokenValidator::new().validate_property(&property(None, Some("global"), Some("io")), "p");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path.as_deref(), Some("p.usage"));
    }

    #[test]
    fn test_initial_value_must_parse() {
        let mut bad = property(Some("integer"), None, None);
        bad.initial = Some("twelve".to_string());
        let errors = TokenValidator::new().validate_property(&bad, "p");
        assert_eq!(errors[0].code, error_codes::INVALID_INITIAL_VALUE);
    }
}
