//! Error types shared across the metrics operator crates

use thiserror::Error;

/// Errors raised while validating a MetricSet or setting up the process
#[derive(Debug, Error)]
pub enum Error {
    /// The MetricSet specification is structurally invalid
    #[error("validation error for {set}: {message}")]
    Validation {
        /// Name of the MetricSet with invalid configuration
        set: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.pods")
        field: Option<String>,
    },

    /// Tracing subscriber could not be installed
    #[error("failed to initialize tracing subscriber: {0}")]
    Telemetry(String),
}

impl Error {
    /// Create a validation error without a field path
    pub fn validation(set: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            set: set.into(),
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error pointing at a specific field
    pub fn validation_field(
        set: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            set: set.into(),
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_the_set() {
        let err = Error::validation("bench", "no metrics");
        assert_eq!(err.to_string(), "validation error for bench: no metrics");
    }

    #[test]
    fn field_is_kept_for_diagnostics() {
        let err = Error::validation_field("bench", "spec.pods", "must be at least 1");
        match err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("spec.pods")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
