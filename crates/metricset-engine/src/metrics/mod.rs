//! The Metric protocol and built-in metrics
//!
//! A metric describes one benchmark: the replicated jobs it needs and the
//! containers (with entrypoint scripts) that run in them. Registries hand out
//! fresh instances, so option state is never shared between compositions.

pub mod custom;
pub mod fio;
pub mod hwloc;
pub mod lammps;
pub mod launcher;
pub mod osu;
pub mod single;

use std::fmt;

use metricset_common::{ContainerResources, MetricDeclaration, SecurityAttributes};

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata::MetricExport;
use crate::options::{DeclaredOptions, OptionBag};
use crate::specs::{ContainerSpec, EntrypointScript, SetContext};
use crate::topology::LAUNCHER_JOB_NAME;

pub use custom::CustomApp;
pub use fio::Fio;
pub use hwloc::Hwloc;
pub use lammps::Lammps;
pub use launcher::LauncherWorker;
pub use osu::OsuBenchmark;

/// Topology a metric uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    /// One job of `pods` replicas running the same container
    SingleApplication,
    /// One launcher pod and `pods - 1` workers sharing a host list
    LauncherWorker,
    /// Single job measuring a storage volume
    StorageGeneric,
    /// The metric builds its own replicated jobs
    Custom,
}

/// Documentation grouping for metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricFamily {
    Network,
    Performance,
    ProxyApp,
    Simulation,
    Storage,
    System,
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Performance => "performance",
            Self::ProxyApp => "proxyapp",
            Self::Simulation => "simulation",
            Self::Storage => "storage",
            Self::System => "system",
        };
        f.write_str(name)
    }
}

/// State every metric carries
#[derive(Clone, Debug)]
pub struct MetricCore {
    pub name: &'static str,
    pub summary: &'static str,
    pub url: &'static str,
    pub family: MetricFamily,
    pub image: String,
    pub workdir: String,
    pub resources: ContainerResources,
    pub attributes: SecurityAttributes,
    pub declared: DeclaredOptions,
}

impl MetricCore {
    pub fn new(
        name: &'static str,
        summary: &'static str,
        family: MetricFamily,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name,
            summary,
            url: "",
            family,
            image: image.into(),
            workdir: String::new(),
            resources: ContainerResources::default(),
            attributes: SecurityAttributes::default(),
            declared: DeclaredOptions::default(),
        }
    }

    pub fn with_url(mut self, url: &'static str) -> Self {
        self.url = url;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Copy container settings and declared options from a declaration
    pub fn apply_declaration(&mut self, decl: &MetricDeclaration) {
        self.resources = decl.resources.clone();
        self.attributes = decl.attributes.security_context.clone();
        self.declared = OptionBag::for_metric(decl).declared();
    }

    /// Metadata document for this metric within `set`
    pub fn export(&self, set: &SetContext<'_>) -> MetricExport {
        MetricExport {
            pods: set.spec.pods,
            completions: set.spec.effective_completions(),
            metric_name: self.name.to_string(),
            metric_description: self.summary.to_string(),
            metric_type: self.family.to_string(),
            metric_options: self.declared.options.clone(),
            metric_list_options: self.declared.list_options.clone(),
            ..Default::default()
        }
    }

    /// A container in `job` running `entrypoint`, with this metric's settings
    pub fn container(
        &self,
        job: impl Into<String>,
        name: impl Into<String>,
        entrypoint: EntrypointScript,
    ) -> ContainerSpec {
        ContainerSpec {
            job_name: job.into(),
            name: name.into(),
            image: self.image.clone(),
            working_dir: (!self.workdir.is_empty()).then(|| self.workdir.clone()),
            entrypoint,
            resources: self.resources.clone(),
            attributes: self.attributes.clone(),
            ..Default::default()
        }
    }
}

/// A pluggable benchmark definition
pub trait Metric: Send + Sync {
    fn core(&self) -> &MetricCore;

    fn core_mut(&mut self) -> &mut MetricCore;

    /// Topology; drives the default jobs and success jobs
    fn kind(&self) -> MetricKind;

    /// Resolve options on top of the metric's defaults
    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()>;

    /// Check resolved options against the set; must not mutate
    fn validate(&self, _set: &SetContext<'_>) -> Validation {
        Validation::Valid
    }

    /// Replicated jobs, without containers or volumes
    ///
    /// Every kind except [`MetricKind::Custom`] has a standard layout; custom
    /// metrics must override this.
    fn replicated_jobs(&self, set: &SetContext<'_>) -> Result<Vec<ReplicatedJob>> {
        Ok(match self.kind() {
            MetricKind::SingleApplication | MetricKind::StorageGeneric => {
                single::replicated_jobs(set)
            }
            MetricKind::LauncherWorker => launcher::replicated_jobs(set),
            MetricKind::Custom => Vec::new(),
        })
    }

    /// Containers with their entrypoint scripts
    fn prepare_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>>;

    /// Jobs whose completion marks the set as successful
    fn success_jobs(&self) -> Vec<String> {
        match self.kind() {
            MetricKind::LauncherWorker => vec![LAUNCHER_JOB_NAME.to_string()],
            _ => Vec::new(),
        }
    }

    /// Whether every pod in the set needs a node to itself
    fn sole_tenancy(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        self.core().name
    }

    fn summary(&self) -> &str {
        self.core().summary
    }

    fn url(&self) -> &str {
        self.core().url
    }

    fn family(&self) -> MetricFamily {
        self.core().family
    }
}

/// Creates a fresh, unconfigured metric
pub type MetricFactory = fn() -> Box<dyn Metric>;

/// Factories for every built-in metric
pub fn builtin() -> Vec<MetricFactory> {
    let factories: [MetricFactory; 5] = [
        || Box::new(Lammps::default()),
        || Box::new(CustomApp::default()),
        || Box::new(Fio::default()),
        || Box::new(Hwloc::default()),
        || Box::new(OsuBenchmark::default()),
    ];
    factories.to_vec()
}
