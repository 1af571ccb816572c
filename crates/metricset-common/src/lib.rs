//! Common types for the metrics operator: the MetricSet resource, errors and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod telemetry;

pub use crd::{
    AddonDeclaration, ContainerAttributes, ContainerResources, LoggingSettings, MetricDeclaration,
    MetricSet, MetricSetSpec, PodSettings, SecurityAttributes,
};
pub use error::Error;

/// Option values are either integers or strings, as in Kubernetes `intstr`
pub use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Directory where entrypoint scripts are mounted inside every container
pub const SCRIPT_MOUNT_PATH: &str = "/metrics_operator/";

/// Default headless service name for replica DNS
pub const DEFAULT_SERVICE_NAME: &str = "ms";

/// Default active deadline for every job (roughly one year)
pub const DEFAULT_DEADLINE_SECONDS: i64 = 31_500_000;
