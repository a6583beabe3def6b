use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use crate::document::ParsedDocument;
use crate::error::DslError;

mod flow_validator;
mod reference;
mod token;

pub use flow_validator::FlowValidator;
pub use reference::ReferenceValidator;
pub use token::TokenValidator;

/// Represents a validation error found in a definition document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error code (one of [`error_codes`])
    pub code: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Optional path to the location of the error (e.g., "flows[0].activities[2]")
    pub path: Option<String>,
}

impl ValidationError {
    pub(crate) fn at(code: &'static str, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl Error for ValidationError {}

/// Validation error codes
pub mod error_codes {
    /// Transition target or provider that does not exist
    pub const INVALID_REFERENCE: &str = "ERR_DSL_VALIDATION_INVALID_REFERENCE";

    /// Flow, activity or property name used twice
    pub const DUPLICATE_ID: &str = "ERR_DSL_VALIDATION_DUPLICATE_ID";

    /// dependsOn cycle between properties
    pub const CIRCULAR_DEPENDENCY: &str = "ERR_DSL_VALIDATION_CIRCULAR_DEPENDENCY";

    /// Blank name or a flow without activities
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_DSL_VALIDATION_MISSING_REQUIRED_FIELD";

    /// Name with characters outside `[A-Za-z0-9_.-]`
    pub const INVALID_NAME: &str = "ERR_DSL_VALIDATION_INVALID_NAME";

    /// Unknown data-type token
    pub const INVALID_DATA_TYPE: &str = "ERR_DSL_VALIDATION_INVALID_DATA_TYPE";

    /// Unknown scope or usage token, or a usage the scope does not allow
    pub const INVALID_ACCESS: &str = "ERR_DSL_VALIDATION_INVALID_ACCESS";

    /// Initial value that does not parse as the declared type
    pub const INVALID_INITIAL_VALUE: &str = "ERR_DSL_VALIDATION_INVALID_INITIAL_VALUE";
}

/// A trait for validators that check specific aspects of the document
pub trait Validator {
    /// Validate the document and return a list of validation errors (if any)
    fn validate(&self, document: &ParsedDocument) -> Vec<ValidationError>;
}

/// Validate a parsed document on its own
pub fn validate_document(document: &ParsedDocument) -> Result<(), DslError> {
    validate_document_with(document, &HashSet::new())
}

/// Validate a parsed document whose transitions may also target the
/// flow types in `known_flows`
pub fn validate_document_with(document: &ParsedDocument, known_flows: &HashSet<String>) -> Result<(), DslError> {
    let validators: Vec<Box<dyn Validator>> = vec![
        Box::new(FlowValidator::new()),
        Box::new(TokenValidator::new()),
        Box::new(ReferenceValidator::new(known_flows.clone())),
    ];

    let errors: Vec<ValidationError> = validators
        .iter()
        .flat_map(|validator| validator.validate(document))
        .collect();

    if !errors.is_empty() {
        return Err(DslError::from_validation_errors(errors));
    }

    Ok(())
}
