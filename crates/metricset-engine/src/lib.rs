//! Metric and addon composition engine
//!
//! Turns a [`MetricSet`](metricset_common::MetricSet) into replicated job
//! descriptors plus the named entrypoint scripts their containers run.
//!
//! # Architecture
//!
//! - [`registry`]: name to factory tables for metrics and addons, built once at startup
//! - [`options`]: typed decoding of declaration option bags
//! - [`metrics`]: the `Metric` protocol and the built-in metrics
//! - [`addons`]: the capability traits addons implement and the built-in addons
//! - [`script`]: entrypoint assembly (targeting, command wrapping, hold-open handling)
//! - [`topology`]: replicated job shapes, pod labels, host lists and sole tenancy
//! - [`compose`]: the single entry point tying it all together
//!
//! Composition is synchronous and performs no I/O. The same input always
//! yields byte-identical output.

pub mod addons;
pub mod compose;
pub mod error;
pub mod k8s;
pub mod metadata;
pub mod metrics;
pub mod options;
pub mod registry;
pub mod script;
pub mod specs;
pub mod topology;

pub use compose::{Composer, Composition};
pub use error::{EngineError, Result, Validation};
pub use registry::{Registry, RegistryBuilder};
pub use specs::{ContainerSpec, EntrypointScript, SetContext, VolumeSource, VolumeSpec};
