//! Kubernetes types for composed replicated jobs
//!
//! Minimal typed mirrors of the JobSet `ReplicatedJob` and the core/batch
//! objects it embeds. Only the fields the engine sets are modelled; empty
//! fields are skipped on serialization so output stays compact and stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Metadata
// =============================================================================

/// Object metadata for embedded templates
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Metadata with a name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }
}

// =============================================================================
// ReplicatedJob
// =============================================================================

/// One replicated job of a JobSet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedJob {
    /// Job role name (e.g. `l`, `w`, `m`); used for pod DNS names
    pub name: String,
    /// Number of job replicas
    pub replicas: i32,
    /// Job template
    pub template: JobTemplateSpec,
}

impl ReplicatedJob {
    /// The pod spec of this job's template
    pub fn pod_spec(&self) -> &PodSpec {
        &self.template.spec.template.spec
    }

    /// Mutable access to the pod spec
    pub fn pod_spec_mut(&mut self) -> &mut PodSpec {
        &mut self.template.spec.template.spec
    }

    /// Mutable access to the pod template labels
    pub fn pod_labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.template.spec.template.metadata.labels
    }
}

/// Job template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplateSpec {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Job spec
    pub spec: JobSpec,
}

/// Batch job spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Pods running at once
    pub parallelism: i32,
    /// Successful pods required
    pub completions: i32,
    /// `Indexed` for stable per-pod identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_mode: Option<String>,
    /// Retries before the job is marked failed
    pub backoff_limit: i32,
    /// Wall clock limit
    pub active_deadline_seconds: i64,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Pod template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Headless service subdomain
    pub subdomain: String,
    /// Restart policy
    pub restart_policy: String,
    /// Use the FQDN as hostname
    #[serde(rename = "setHostnameAsFQDN")]
    pub set_hostname_as_fqdn: bool,
    /// Share one process namespace across containers
    pub share_process_namespace: bool,
    /// Service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Node selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Scheduling affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    /// Containers
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

// =============================================================================
// Container
// =============================================================================

/// Container spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Image pull policy
    pub image_pull_policy: String,
    /// Command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Keep stdin open
    pub stdin: bool,
    /// Allocate a TTY
    pub tty: bool,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

/// Resource limits and requests as quantity strings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    /// Limits
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    /// Requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Container security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// Privileged mode
    pub privileged: bool,
    /// Added Linux capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

/// Linux capabilities
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    /// Capabilities to add
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
}

/// Volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Mount path
    pub mount_path: String,
    /// Read-only mount
    #[serde(default)]
    pub read_only: bool,
}

// =============================================================================
// Volumes
// =============================================================================

/// Pod volume; exactly one source is set
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// Scratch directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
    /// ConfigMap projection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
    /// Secret projection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,
    /// Persistent volume claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
    /// Host path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathVolumeSource>,
}

/// Empty directory source
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmptyDirVolumeSource {}

/// ConfigMap source
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigMapVolumeSource {
    /// ConfigMap name
    pub name: String,
    /// Projected keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<KeyToPath>,
}

/// Projection of one ConfigMap key to a file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyToPath {
    /// Data key
    pub key: String,
    /// Relative file path
    pub path: String,
    /// File mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<i32>,
}

/// Secret source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolumeSource {
    /// Secret name
    pub secret_name: String,
}

/// PVC source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimVolumeSource {
    /// Claim name
    pub claim_name: String,
    /// Read-only
    #[serde(default)]
    pub read_only: bool,
}

/// Host path source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HostPathVolumeSource {
    /// Path on the node
    pub path: String,
}

// =============================================================================
// Affinity
// =============================================================================

/// Pod affinity settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    /// Anti-affinity between pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_anti_affinity: Option<PodAntiAffinity>,
}

/// Pod anti-affinity rules
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodAntiAffinity {
    /// Hard scheduling requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_during_scheduling_ignored_during_execution: Vec<PodAffinityTerm>,
}

/// A pod affinity term
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodAffinityTerm {
    /// Pods this term applies to
    pub label_selector: LabelSelector,
    /// Node label defining the topology domain
    pub topology_key: String,
}

/// Label selector using set-based requirements
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Requirements, ANDed together
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// One set-based label requirement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabelSelectorRequirement {
    /// Label key
    pub key: String,
    /// Operator (`In`, `NotIn`, `Exists`)
    pub operator: String,
    /// Values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}
