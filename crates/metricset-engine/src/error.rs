//! Composition error types

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while building a registry or composing a MetricSet
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{name} is not a registered Metric type")]
    UnknownMetric { name: String },

    #[error("{name} is not a known addon")]
    UnknownAddon { name: String },

    #[error("{kind} {name} has already been added to the registry")]
    DuplicateRegistration { kind: &'static str, name: String },

    #[error("option '{key}' for {component}: {message}")]
    OptionType {
        component: String,
        key: String,
        message: String,
    },

    #[error("{metric} did not validate: {reason}")]
    MetricValidation { metric: String, reason: String },

    #[error("addons for {metric} did not validate: {}", .failures.join("; "))]
    AddonValidation {
        metric: String,
        failures: Vec<String>,
    },

    #[error("{metric}: custom standalone metrics require a replicated job set")]
    NoReplicatedJobs { metric: String },

    #[error("replicated job '{job}' is produced by more than one metric")]
    DuplicateJob { job: String },

    #[error("entrypoint script '{key}' is defined twice with different content")]
    ScriptConflict { key: String },

    #[error("failed to serialize metadata for {component}: {source}")]
    Metadata {
        component: String,
        source: serde_json::Error,
    },

    #[error("failed to render template '{name}': {source}")]
    Template {
        name: String,
        source: minijinja::Error,
    },

    #[error("{0}")]
    Set(#[from] metricset_common::Error),
}

impl EngineError {
    pub fn option_type(
        component: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OptionType {
            component: component.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn metric_validation(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetricValidation {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    pub fn template(name: impl Into<String>, source: minijinja::Error) -> Self {
        Self::Template {
            name: name.into(),
            source,
        }
    }
}

/// Outcome of a `validate` call: either valid, or invalid with a diagnostic
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(String),
}

impl Validation {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    /// Valid when `condition` holds, otherwise invalid with `reason`
    pub fn check(condition: bool, reason: impl FnOnce() -> String) -> Self {
        if condition {
            Self::Valid
        } else {
            Self::Invalid(reason())
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Chain another check, keeping the first failure
    pub fn and(self, other: impl FnOnce() -> Validation) -> Self {
        match self {
            Self::Valid => other(),
            invalid => invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_metric_message() {
        let err = EngineError::UnknownMetric {
            name: "does-not-exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "does-not-exist is not a registered Metric type"
        );
    }

    #[test]
    fn addon_failures_are_joined() {
        let err = EngineError::AddonValidation {
            metric: "app-lammps".to_string(),
            failures: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "addons for app-lammps did not validate: a; b"
        );
    }

    #[test]
    fn validation_keeps_first_failure() {
        let v = Validation::check(false, || "first".to_string())
            .and(|| Validation::invalid("second"));
        assert_eq!(v, Validation::Invalid("first".to_string()));
        assert!(Validation::Valid.and(|| Validation::Valid).is_valid());
    }
}
