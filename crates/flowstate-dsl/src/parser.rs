use tracing::debug;

use crate::document::ParsedDocument;
use crate::error::DslError;

/// DSL versions this crate understands
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Parse a YAML string into a ParsedDocument.
///
/// Only the structure and the version are checked here; names, tokens and
/// references are left to the validation module.
pub fn parse_dsl_document(yaml_str: &str) -> Result<ParsedDocument, DslError> {
    let document: ParsedDocument = serde_yaml::from_str(yaml_str)?;

    if !SUPPORTED_VERSIONS.contains(&document.dsl_version.as_str()) {
        return Err(DslError::UnsupportedVersion(document.dsl_version));
    }

    debug!(
        dsl_version = %document.dsl_version,
        flows = document.definitions.flows.len(),
        "Parsed definition document"
    );
    Ok(document)
}
