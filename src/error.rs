//! Error types for the Census provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors raised while translating or managing Census resources.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A configuration value failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single field mapping is malformed.
    #[error("Invalid field mapping at index {index}: {message}")]
    InvalidMapping {
        /// Position of the offending mapping in the configured list.
        index: usize,
        /// What is wrong with it.
        message: String,
    },

    /// The mapping list does not contain exactly one primary identifier.
    #[error(
        "Expected exactly one primary identifier field mapping, found {}{}",
        .indices.len(),
        mapping_paths(.indices)
    )]
    PrimaryIdentifier {
        /// Positions of the mappings flagged `is_primary_identifier`.
        indices: Vec<usize>,
    },

    /// A structurally required field is absent from an API response.
    #[error("Missing required field in API response: {0}")]
    MissingField(String),

    /// An API response could not be mapped back to state.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The provider configuration is invalid or absent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is not served by this provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The upstream API call failed.
    #[error("API error: {0}")]
    Api(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::MissingField(msg)
            | Self::Decode(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Api(msg)
            | Self::Unimplemented(msg) => msg.clone(),
            Self::InvalidMapping { message, .. } => message.clone(),
            Self::PrimaryIdentifier { indices } => format!(
                "{} primary identifier(s) configured{}",
                indices.len(),
                mapping_paths(indices)
            ),
            Self::Serialization(err) => err.to_string(),
        }
    }

    /// The attribute path this error refers to, when it names one.
    pub fn attribute(&self) -> Option<String> {
        match self {
            Self::InvalidMapping { index, .. } => Some(format!("field_mapping.{}", index)),
            Self::PrimaryIdentifier { indices } => match indices.first() {
                Some(index) if indices.len() > 1 => Some(format!("field_mapping.{}", index)),
                _ => Some("field_mapping".to_string()),
            },
            Self::MissingField(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// Whether this error was raised before any request was issued.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidMapping { .. } | Self::PrimaryIdentifier { .. }
        )
    }
}

fn mapping_paths(indices: &[usize]) -> String {
    if indices.is_empty() {
        return String::new();
    }
    let paths: Vec<String> = indices
        .iter()
        .map(|i| format!("field_mapping.{}", i))
        .collect();
    format!(" at {}", paths.join(", "))
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        let diagnostic = Diagnostic::error(err.to_string());
        match err.attribute() {
            Some(path) => diagnostic.with_attribute(path),
            None => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("sync 123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: sync 123");

        let err = ProviderError::InvalidMapping {
            index: 2,
            message: "constant mapping has no value".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Invalid field mapping at index 2: constant mapping has no value"
        );

        let err = ProviderError::PrimaryIdentifier { indices: vec![] };
        assert_eq!(
            format!("{}", err),
            "Expected exactly one primary identifier field mapping, found 0"
        );

        let err = ProviderError::PrimaryIdentifier {
            indices: vec![0, 3],
        };
        assert_eq!(
            format!("{}", err),
            "Expected exactly one primary identifier field mapping, found 2 at field_mapping.0, field_mapping.3"
        );
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("missing base_url".to_string());
        assert_eq!(err.message(), "missing base_url");

        let err = ProviderError::PrimaryIdentifier {
            indices: vec![1, 2, 4],
        };
        assert_eq!(
            err.message(),
            "3 primary identifier(s) configured at field_mapping.1, field_mapping.2, field_mapping.4"
        );
    }

    #[test]
    fn test_error_to_diagnostic() {
        let diag: Diagnostic = ProviderError::InvalidMapping {
            index: 1,
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.attribute, Some("field_mapping.1".to_string()));

        let diag: Diagnostic = ProviderError::PrimaryIdentifier {
            indices: vec![2, 5],
        }
        .into();
        assert_eq!(diag.attribute, Some("field_mapping.2".to_string()));

        let diag: Diagnostic = ProviderError::PrimaryIdentifier { indices: vec![] }.into();
        assert_eq!(diag.attribute, Some("field_mapping".to_string()));

        let diag: Diagnostic = ProviderError::Api("boom".to_string()).into();
        assert_eq!(diag.attribute, None);
        assert_eq!(diag.summary, "API error: boom");
    }

    #[test]
    fn test_is_validation() {
        assert!(ProviderError::PrimaryIdentifier {
            indices: vec![0, 1]
        }
        .is_validation());
        assert!(ProviderError::Validation("x".to_string()).is_validation());
        assert!(!ProviderError::MissingField("to".to_string()).is_validation());
    }
}
