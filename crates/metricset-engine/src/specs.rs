//! Descriptors exchanged between metrics, addons and the composer
//!
//! Metrics and addons describe containers and volumes with these types; the
//! composer lowers them into [`k8s`](crate::k8s) objects at the end.

use std::collections::BTreeMap;

use metricset_common::{ContainerResources, MetricSet, MetricSetSpec, SecurityAttributes};

use crate::k8s::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, HostPathVolumeSource, KeyToPath,
    PersistentVolumeClaimVolumeSource, ResourceRequirements, SecretVolumeSource, Volume,
    VolumeMount,
};
use crate::options::value_text;

/// File mode for projected scripts and config map items
pub const EXECUTABLE_MODE: i32 = 0o777;

// =============================================================================
// Set context
// =============================================================================

/// The MetricSet being composed, with its name and namespace resolved
#[derive(Clone, Copy, Debug)]
pub struct SetContext<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub spec: &'a MetricSetSpec,
}

impl<'a> SetContext<'a> {
    pub fn new(name: &'a str, namespace: &'a str, spec: &'a MetricSetSpec) -> Self {
        Self {
            name,
            namespace,
            spec,
        }
    }

    /// Borrow from a MetricSet resource; a missing namespace means `default`
    pub fn from_resource(set: &'a MetricSet) -> Option<Self> {
        let name = set.metadata.name.as_deref()?;
        let namespace = set.metadata.namespace.as_deref().unwrap_or("default");
        Some(Self::new(name, namespace, &set.spec))
    }

    pub fn interactive(&self) -> bool {
        self.spec.logging.interactive
    }
}

// =============================================================================
// Entrypoint scripts
// =============================================================================

/// Logical key for a script path: the file name up to its first `.`
pub fn derive_script_key(path: &str) -> String {
    let base = basename(path);
    base.split('.').next().unwrap_or(base).to_string()
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// A container's entrypoint: three ordered text blocks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntrypointScript {
    /// Logical key used in the scripts config map
    pub name: String,
    /// Absolute path where the script is mounted
    pub path: String,
    pub pre: String,
    pub command: String,
    pub post: String,
}

impl EntrypointScript {
    /// A script mounted at `path`, keyed by [`derive_script_key`]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: derive_script_key(&path),
            path,
            ..Default::default()
        }
    }

    /// A script with an explicit key
    pub fn named(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_pre(mut self, pre: impl Into<String>) -> Self {
        self.pre = pre.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_post(mut self, post: impl Into<String>) -> Self {
        self.post = post.into();
        self
    }

    /// File name under the scripts mount
    pub fn file_name(&self) -> &str {
        basename(&self.path)
    }

    /// Final script text: pre, command, post, in that order
    pub fn render(&self) -> String {
        format!("{}\n{}\n{}\n", self.pre, self.command, self.post)
    }

    /// Config map projection for this script
    pub fn key_to_path(&self) -> KeyToPath {
        KeyToPath {
            key: self.name.clone(),
            path: self.file_name().to_string(),
            mode: Some(EXECUTABLE_MODE),
        }
    }
}

// =============================================================================
// Containers
// =============================================================================

/// A container contributed by a metric or addon
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerSpec {
    /// Owning replicated job; empty means every job
    pub job_name: String,
    pub name: String,
    pub image: String,
    pub working_dir: Option<String>,
    /// Explicit command; empty runs the entrypoint script with bash
    pub command: Vec<String>,
    pub entrypoint: EntrypointScript,
    /// The entrypoint must be materialised in the scripts config map
    pub needs_write: bool,
    pub resources: ContainerResources,
    pub attributes: SecurityAttributes,
}

impl ContainerSpec {
    /// Command the container runs
    pub fn effective_command(&self) -> Vec<String> {
        if self.command.is_empty() {
            vec!["/bin/bash".to_string(), self.entrypoint.path.clone()]
        } else {
            self.command.clone()
        }
    }

    /// True when the container belongs in the job named `job`
    pub fn belongs_to(&self, job: &str) -> bool {
        self.job_name.is_empty() || self.job_name == job
    }
}

/// Lower declared resources to Kubernetes quantity strings
pub fn resource_requirements(resources: &ContainerResources) -> Option<ResourceRequirements> {
    if resources.is_empty() {
        return None;
    }
    let lower = |map: &BTreeMap<String, metricset_common::IntOrString>| {
        map.iter()
            .map(|(k, v)| (k.clone(), value_text(v)))
            .collect::<BTreeMap<_, _>>()
    };
    Some(ResourceRequirements {
        limits: lower(&resources.limits),
        requests: lower(&resources.requests),
    })
}

// =============================================================================
// Volumes
// =============================================================================

/// Where a volume's data comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VolumeSource {
    EmptyDir,
    ConfigMap {
        name: String,
        /// Key to relative path
        items: BTreeMap<String, String>,
    },
    Secret {
        secret_name: String,
    },
    PersistentClaim {
        claim_name: String,
    },
    HostPath {
        path: String,
    },
}

/// A volume contributed by an addon
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub source: VolumeSource,
    /// Mount into every container of the job
    pub mount: bool,
    pub path: String,
    pub read_only: bool,
}

impl VolumeSpec {
    pub fn new(name: impl Into<String>, source: VolumeSource, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            mount: true,
            path: path.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Pod volume for this spec
    pub fn to_volume(&self) -> Volume {
        let mut volume = Volume {
            name: self.name.clone(),
            ..Default::default()
        };
        match &self.source {
            VolumeSource::EmptyDir => volume.empty_dir = Some(EmptyDirVolumeSource {}),
            VolumeSource::ConfigMap { name, items } => {
                volume.config_map = Some(ConfigMapVolumeSource {
                    name: name.clone(),
                    items: items
                        .iter()
                        .map(|(key, path)| KeyToPath {
                            key: key.clone(),
                            path: path.clone(),
                            mode: None,
                        })
                        .collect(),
                })
            }
            VolumeSource::Secret { secret_name } => {
                volume.secret = Some(SecretVolumeSource {
                    secret_name: secret_name.clone(),
                })
            }
            VolumeSource::PersistentClaim { claim_name } => {
                volume.persistent_volume_claim = Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim_name.clone(),
                    read_only: self.read_only,
                })
            }
            VolumeSource::HostPath { path } => {
                volume.host_path = Some(HostPathVolumeSource { path: path.clone() })
            }
        }
        volume
    }

    /// Container mount, if this volume is mounted
    pub fn to_mount(&self) -> Option<VolumeMount> {
        self.mount.then(|| VolumeMount {
            name: self.name.clone(),
            mount_path: self.path.clone(),
            read_only: self.read_only,
        })
    }
}
