//! # Flowstate DSL
//!
//! Flow types can be declared in a versioned YAML document instead of being
//! assembled in code. This crate parses such a document, validates names,
//! tokens and references, and builds core
//! [`FlowDefinition`](flowstate_core::FlowDefinition)s behind the core
//! [`DefinitionSource`](flowstate_core::DefinitionSource) trait.
//!
//! ## Example
//!
//! ```
//! use flowstate_dsl::YamlDefinitionSource;
//! use flowstate_core::DefinitionSource;
//!
//! let yaml = r#"
//! dsl_version: "1.0"
//! definitions:
//!   flows:
//!     - name: signup
//!       title: Sign up
//!       properties:
//!         - name: email
//!           data_type: string
//!           usage: io
//!       activities:
//!         - name: collect
//!           properties:
//!             - name: attempts
//!               data_type: integer
//!               scope: activityLocal
//!               usage: internalState
//!         - name: confirm
//!           transition:
//!             next_flow_type: welcome
//!     - name: welcome
//!       activities:
//!         - name: greet
//! "#;
//!
//! let source = YamlDefinitionSource::from_yaml_str(yaml).unwrap();
//! assert!(source.is_flow_defined("signup"));
//! assert_eq!(source.flow_definitions().unwrap().len(), 2);
//! ```

pub mod builder;
pub mod document;
pub mod error;
pub mod parser;
pub mod source;
pub mod validation;

pub use builder::{build_flow_definitions, ProviderRegistry};
pub use document::{ActivityDocument, Definitions, FlowDocument, ParsedDocument, PropertyDocument, TransitionDocument};
pub use error::DslError;
pub use source::{DocumentLoader, YamlDefinitionSource};
pub use validation::{ValidationError, Validator};

/// Parse and validate a definition document.
///
/// # Errors
///
/// * Invalid YAML syntax or unknown transition types
/// * Unsupported DSL version
/// * Validation errors (duplicate or malformed names, bad tokens, dependency
///   cycles, transitions into undefined flows)
///
/// # Examples
///
/// ```
/// use flowstate_dsl::parse_and_validate_flow_definition;
///
/// let invalid_yaml = r#"
/// dsl_version: "1.0"
/// definitions:
///   flows:
///     - name: signup
///       activities:
///         - name: collect
///           transition:
///             next_flow_type: nowhere
/// "#;
///
/// let error = parse_and_validate_flow_definition(invalid_yaml).unwrap_err();
/// assert!(error.error_code().contains("INVALID_REFERENCE"));
/// ```
pub fn parse_and_validate_flow_definition(yaml_str: &str) -> Result<ParsedDocument, DslError> {
    let document = parser::parse_dsl_document(yaml_str)?;
    validation::validate_document(&document)?;
    Ok(document)
}

/// Returns the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
