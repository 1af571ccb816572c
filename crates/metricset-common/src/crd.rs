//! MetricSet CRD types
//!
//! A `MetricSet` describes one benchmarking run: how many pods, which metrics
//! to run across them, and the addons that customize each metric. The
//! composition engine turns this description into replicated jobs.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{DEFAULT_DEADLINE_SECONDS, DEFAULT_SERVICE_NAME};

/// Scalar options keyed by name
pub type Options = BTreeMap<String, IntOrString>;

/// List options keyed by name
pub type ListOptions = BTreeMap<String, Vec<IntOrString>>;

/// Nested map options keyed by name
pub type MapOptions = BTreeMap<String, BTreeMap<String, IntOrString>>;

// =============================================================================
// Container settings
// =============================================================================

/// Security attributes applied to a metric's containers
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAttributes {
    /// Run the container privileged
    #[serde(default)]
    pub privileged: bool,
    /// Add the SYS_PTRACE capability
    #[serde(default)]
    pub allow_ptrace: bool,
    /// Add the SYS_ADMIN capability
    #[serde(default)]
    pub allow_admin: bool,
}

/// Container attributes wrapper (mirrors the pod security context nesting)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAttributes {
    /// Security context settings
    #[serde(default)]
    pub security_context: SecurityAttributes,
}

/// Resource limits and requests, as integers or quantity strings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    /// Resource limits (e.g. `cpu: 2`, `memory: 1Gi`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, IntOrString>,
    /// Resource requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, IntOrString>,
}

impl ContainerResources {
    /// True when neither limits nor requests are set
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// An addon attached to a metric
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonDeclaration {
    /// Registered addon name (e.g. `perf-mpitrace`)
    pub name: String,
    /// Scalar options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: Options,
    /// List options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub list_options: ListOptions,
    /// Nested map options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub map_options: MapOptions,
}

impl AddonDeclaration {
    /// Declare an addon by name with no options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a string option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .insert(key.into(), IntOrString::String(value.into()));
        self
    }

    /// Add an integer option
    pub fn with_int_option(mut self, key: impl Into<String>, value: i32) -> Self {
        self.options.insert(key.into(), IntOrString::Int(value));
        self
    }

    /// Add a list option of strings
    pub fn with_list_option<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list_options.insert(
            key.into(),
            values
                .into_iter()
                .map(|v| IntOrString::String(v.into()))
                .collect(),
        );
        self
    }

    /// Add a nested map option of strings
    pub fn with_map_option<I, K, V>(mut self, key: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.map_options.insert(
            key.into(),
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), IntOrString::String(v.into())))
                .collect(),
        );
        self
    }
}

/// A metric to run as part of the set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricDeclaration {
    /// Registered metric name (e.g. `app-lammps`)
    pub name: String,
    /// Scalar options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: Options,
    /// List options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub list_options: ListOptions,
    /// Nested map options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub map_options: MapOptions,
    /// Override the metric's default container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Addons applied to this metric, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<AddonDeclaration>,
    /// Container security attributes
    #[serde(default)]
    pub attributes: ContainerAttributes,
    /// Container resources
    #[serde(default, skip_serializing_if = "ContainerResources::is_empty")]
    pub resources: ContainerResources,
}

impl MetricDeclaration {
    /// Declare a metric by name with no options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a string option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .insert(key.into(), IntOrString::String(value.into()));
        self
    }

    /// Add an integer option
    pub fn with_int_option(mut self, key: impl Into<String>, value: i32) -> Self {
        self.options.insert(key.into(), IntOrString::Int(value));
        self
    }

    /// Add a list option of strings
    pub fn with_list_option<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list_options.insert(
            key.into(),
            values
                .into_iter()
                .map(|v| IntOrString::String(v.into()))
                .collect(),
        );
        self
    }

    /// Override the container image
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Attach an addon (appended after any existing addons)
    pub fn with_addon(mut self, addon: AddonDeclaration) -> Self {
        self.addons.push(addon);
        self
    }
}

// =============================================================================
// Pod and logging settings
// =============================================================================

/// Pod-level settings shared by every replicated job in the set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSettings {
    /// Service account for the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Node selector labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Pod annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Logging behaviour of the generated entrypoints
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Keep containers alive after the run for debugging
    #[serde(default)]
    pub interactive: bool,
}

fn default_pods() -> i32 {
    1
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_deadline_seconds() -> i64 {
    DEFAULT_DEADLINE_SECONDS
}

// =============================================================================
// CRD
// =============================================================================

/// A set of metrics to run together across a group of pods
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "flux-framework.org",
    version = "v1alpha2",
    kind = "MetricSet",
    plural = "metricsets",
    namespaced,
    printcolumn = r#"{"name":"Pods","type":"integer","jsonPath":".spec.pods"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MetricSetSpec {
    /// Metrics to run, in order
    #[serde(default)]
    pub metrics: Vec<MetricDeclaration>,

    /// Headless service name used for replica DNS
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Do not set the pod hostname as its fully qualified domain name
    #[serde(default, rename = "dontSetFQDN")]
    pub dont_set_fqdn: bool,

    /// Active deadline for every job
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: i64,

    /// Pod-level settings
    #[serde(default)]
    pub pod: PodSettings,

    /// Number of pods (for launcher/worker metrics: one launcher plus workers)
    #[serde(default = "default_pods")]
    pub pods: i32,

    /// Completions for single-job metrics (defaults to `pods`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<i32>,

    /// Logging behaviour
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for MetricSetSpec {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            service_name: default_service_name(),
            dont_set_fqdn: false,
            deadline_seconds: default_deadline_seconds(),
            pod: PodSettings::default(),
            pods: default_pods(),
            completions: None,
            logging: LoggingSettings::default(),
        }
    }
}

impl MetricSetSpec {
    /// Completions for single-job topologies: explicit value or the pod count
    pub fn effective_completions(&self) -> i32 {
        self.completions.unwrap_or(self.pods)
    }

    /// Validate structure that does not depend on any registered metric
    ///
    /// `set` names the MetricSet in error messages.
    pub fn validate(&self, set: &str) -> Result<(), Error> {
        if self.metrics.is_empty() {
            return Err(Error::validation_field(
                set,
                "spec.metrics",
                "at least one metric is required",
            ));
        }
        if self.pods < 1 {
            return Err(Error::validation_field(
                set,
                "spec.pods",
                format!("pods must be at least 1, got {}", self.pods),
            ));
        }
        if let Some(completions) = self.completions {
            if completions < 1 {
                return Err(Error::validation_field(
                    set,
                    "spec.completions",
                    format!("completions must be at least 1, got {completions}"),
                ));
            }
        }
        if self.service_name.is_empty() {
            return Err(Error::validation_field(
                set,
                "spec.serviceName",
                "service name cannot be empty",
            ));
        }
        if self.deadline_seconds < 1 {
            return Err(Error::validation_field(
                set,
                "spec.deadlineSeconds",
                "deadline must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec_with_metric() -> MetricSetSpec {
        MetricSetSpec {
            metrics: vec![MetricDeclaration::new("app-lammps")],
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_serde_defaults() {
        let parsed: MetricSetSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, MetricSetSpec::default());
        assert_eq!(parsed.pods, 1);
        assert_eq!(parsed.service_name, "ms");
        assert_eq!(parsed.deadline_seconds, 31_500_000);
    }

    #[test]
    fn parses_yaml_manifest() {
        let yaml = r#"
apiVersion: flux-framework.org/v1alpha2
kind: MetricSet
metadata:
  name: metricset-sample
spec:
  pods: 4
  dontSetFQDN: true
  logging:
    interactive: true
  metrics:
    - name: app-lammps
      options:
        command: mpirun lmp
        soleTenancy: "true"
      listOptions:
        extra: [a, 2]
      addons:
        - name: perf-mpitrace
          options:
            mount: /opt/share
"#;
        let set: MetricSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.spec.pods, 4);
        assert!(set.spec.dont_set_fqdn);
        assert!(set.spec.logging.interactive);
        let metric = &set.spec.metrics[0];
        assert_eq!(
            metric.options.get("command"),
            Some(&IntOrString::String("mpirun lmp".to_string()))
        );
        assert_eq!(metric.list_options["extra"][1], IntOrString::Int(2));
        assert_eq!(metric.addons[0].name, "perf-mpitrace");
    }

    #[test]
    fn builders_accumulate_in_order() {
        let decl = MetricDeclaration::new("io-fio")
            .with_option("size", "1G")
            .with_int_option("iodepth", 8)
            .with_addon(AddonDeclaration::new("volume-empty"))
            .with_addon(AddonDeclaration::new("commands").with_option("prefix", "time"));
        assert_eq!(decl.options.len(), 2);
        assert_eq!(decl.addons[0].name, "volume-empty");
        assert_eq!(decl.addons[1].name, "commands");
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec_with_metric().validate("bench").is_ok());
    }

    #[rstest]
    #[case::no_metrics(MetricSetSpec::default(), "spec.metrics")]
    #[case::zero_pods(MetricSetSpec { pods: 0, ..spec_with_metric() }, "spec.pods")]
    #[case::zero_completions(
        MetricSetSpec { completions: Some(0), ..spec_with_metric() },
        "spec.completions"
    )]
    #[case::empty_service(
        MetricSetSpec { service_name: String::new(), ..spec_with_metric() },
        "spec.serviceName"
    )]
    fn invalid_specs_are_rejected(#[case] spec: MetricSetSpec, #[case] expected_field: &str) {
        match spec.validate("bench") {
            Err(Error::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some(expected_field))
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn completions_default_to_pods() {
        let spec = MetricSetSpec {
            pods: 3,
            ..spec_with_metric()
        };
        assert_eq!(spec.effective_completions(), 3);
        let spec = MetricSetSpec {
            completions: Some(1),
            ..spec
        };
        assert_eq!(spec.effective_completions(), 1);
    }
}
