//! Parse error taxonomy.
//!
//! - **Validation**: the content is empty or is not valid TOML/JSON/XML/YAML.
//! - **Schema**: the document parses but a document-level section is absent or
//!   malformed, so no dependency can be inferred from it.
//! - **UnsupportedFile**: no registered parser claims the filename.
//!
//! A single malformed dependency entry is never an error; parsers skip it and
//! count it in [`crate::parser::ParseOutput::skipped`].

/// Per-file parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Empty content or invalid base format.
    #[error("validation error: {reason}")]
    Validation {
        /// Why the content was rejected
        reason: String,
    },

    /// Structurally valid document missing a required section.
    #[error("schema error: {reason}")]
    Schema {
        /// Which section is missing or malformed
        reason: String,
    },

    /// No parser is registered for the filename.
    #[error("unsupported file: no registered parser claims this filename")]
    UnsupportedFile,
}

impl ParseError {
    pub fn validation(reason: impl std::fmt::Display) -> Self {
        ParseError::Validation {
            reason: reason.to_string(),
        }
    }

    pub fn schema(reason: impl std::fmt::Display) -> Self {
        ParseError::Schema {
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable tag for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Validation { .. } => "validation",
            ParseError::Schema { .. } => "schema",
            ParseError::UnsupportedFile => "unsupported_file",
        }
    }
}

impl From<toml::de::Error> for ParseError {
    fn from(err: toml::de::Error) -> Self {
        ParseError::validation(format!("invalid TOML: {}", err.message()))
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::validation(format!("invalid JSON: {err}"))
    }
}

impl From<serde_yaml::Error> for ParseError {
    fn from(err: serde_yaml::Error) -> Self {
        ParseError::validation(format!("invalid YAML: {err}"))
    }
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::validation(format!("invalid XML: {err}"))
    }
}
