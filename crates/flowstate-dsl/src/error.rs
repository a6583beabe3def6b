use flowstate_core::CoreError;
use std::fmt;
use thiserror::Error;

use crate::validation::ValidationError;

/// All possible errors that can occur while loading a definition document
#[derive(Error, Debug)]
pub enum DslError {
    /// Errors that occur during YAML parsing
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Errors that occur during JSON processing
    #[error("JSON processing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Reading the document failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A single validation error
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    /// Multiple validation errors
    #[error("{}", MultipleErrorsFormat(.0))]
    MultipleValidationErrors(Vec<ValidationError>),

    /// Unsupported DSL version
    #[error("Unsupported DSL version: {0}")]
    UnsupportedVersion(String),

    /// The core rejected a definition built from the document
    #[error("Definition error: {0}")]
    DefinitionError(#[from] CoreError),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

struct MultipleErrorsFormat<'a>(&'a [ValidationError]);

impl fmt::Display for MultipleErrorsFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiple validation errors ({} issues):", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            write!(f, "\n  {}. {}", i + 1, err)?;
        }
        Ok(())
    }
}

impl DslError {
    /// Create a DslError from one or more validation errors
    pub fn from_validation_errors(mut errors: Vec<ValidationError>) -> Self {
        match errors.len() {
            0 => DslError::InternalError("Called from_validation_errors with empty vector".to_string()),
            1 => DslError::ValidationError(errors.remove(0)),
            _ => DslError::MultipleValidationErrors(errors),
        }
    }

    /// Validation errors carried by this error
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            DslError::ValidationError(err) => std::slice::from_ref(err),
            DslError::MultipleValidationErrors(errors) => errors,
            _ => &[],
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DslError::YamlError(_) => "ERR_DSL_YAML_PARSE",
            DslError::JsonError(_) => "ERR_DSL_JSON_PARSE",
            DslError::IoError(_) => "ERR_DSL_IO",
            DslError::ValidationError(err) => err.code,
            DslError::MultipleValidationErrors(_) => "ERR_DSL_VALIDATION_MULTIPLE",
            DslError::UnsupportedVersion(_) => "ERR_DSL_UNSUPPORTED_VERSION",
            DslError::DefinitionError(CoreError::DependencyCycle(_)) => "ERR_DSL_DEFINITION_CYCLE",
            DslError::DefinitionError(CoreError::DefinitionConflict { .. }) => "ERR_DSL_DEFINITION_CONFLICT",
            DslError::DefinitionError(_) => "ERR_DSL_DEFINITION",
            DslError::InternalError(_) => "ERR_DSL_INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::error_codes;

    fn error(code: &'static str) -> ValidationError {
        ValidationError {
            code,
            message: "bad".to_string(),
            path: None,
        }
    }

    #[test]
    fn test_single_validation_error_keeps_its_code() {
        let err = DslError::from_validation_errors(vec![error(error_codes::DUPLICATE_ID)]);
        assert_eq!(err.error_code(), error_codes::DUPLICATE_ID);
        assert_eq!(err.validation_errors().len(), 1);
    }

    #[test]
    fn test_multiple_errors_are_numbered() {
        let err = DslError::from_validation_errors(vec![
            error(error_codes::DUPLICATE_ID),
            error(error_codes::INVALID_REFERENCE),
        ]);
        assert_eq!(err.error_code(), "ERR_DSL_VALIDATION_MULTIPLE");
        let text = err.to_string();
        assert!(text.contains("(2 issues)"));
        assert!(text.contains("2. ERR_DSL_VALIDATION_INVALID_REFERENCE"));
    }

    #[test]
    fn test_core_error_codes() {
        let err = DslError::from(CoreError::DependencyCycle(vec!["a".into(), "b".into(), "a".into()]));
        assert_eq!(err.error_code(), "ERR_DSL_DEFINITION_CYCLE");
        assert!(DslError::from_validation_errors(Vec::new()).to_string().contains("empty vector"));
    }
}
