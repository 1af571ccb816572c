//! Composition of a MetricSet into replicated jobs and entrypoint scripts
//!
//! For each declared metric:
//! - instantiates the metric and its addons from the [`Registry`]
//! - resolves and validates options (addon failures are reported together)
//! - builds the metric's jobs and containers
//! - applies addon volumes, sidecars and entrypoint customizations in
//!   declaration order
//!
//! Then lowers every container to a Kubernetes container, projects the
//! scripts each job needs from the set's config map, and applies set-wide
//! sole tenancy.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use metricset_common::{MetricDeclaration, MetricSet, SCRIPT_MOUNT_PATH};

use crate::addons::{Addon, Named, OptionCarrier};
use crate::error::{EngineError, Result, Validation};
use crate::k8s::{
    Capabilities, ConfigMapVolumeSource, Container, KeyToPath, ReplicatedJob, SecurityContext,
    Volume, VolumeMount,
};
use crate::options::OptionBag;
use crate::registry::Registry;
use crate::script::finish_post;
use crate::specs::{
    resource_requirements, ContainerSpec, EntrypointScript, SetContext, VolumeSpec,
};
use crate::topology::apply_sole_tenancy;

const PULL_POLICY: &str = "IfNotPresent";
const CAP_SYS_PTRACE: &str = "SYS_PTRACE";
const CAP_SYS_ADMIN: &str = "SYS_ADMIN";

/// Composed output for one MetricSet
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composition {
    /// Replicated jobs in declaration order
    pub jobs: Vec<ReplicatedJob>,
    /// Entrypoint scripts by config map key
    pub scripts: BTreeMap<String, EntrypointScript>,
    /// Jobs whose completion marks the set as successful
    pub success_jobs: Vec<String>,
}

impl Composition {
    /// Rendered scripts keyed for the set's config map
    pub fn config_map_data(&self) -> BTreeMap<String, String> {
        self.scripts
            .iter()
            .map(|(key, script)| (key.clone(), script.render()))
            .collect()
    }

    pub fn job(&self, name: &str) -> Option<&ReplicatedJob> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// Everything one metric declaration contributes
struct MetricPlan {
    jobs: Vec<ReplicatedJob>,
    scripts: Vec<EntrypointScript>,
    success_jobs: Vec<String>,
    sole_tenancy: bool,
}

/// Composes MetricSets against a shared registry
///
/// Holds no per-call state, so one composer can serve many threads.
#[derive(Clone, Debug)]
pub struct Composer {
    registry: Arc<Registry>,
}

impl Composer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Composer over the built-in metrics and addons
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(Arc::new(Registry::builtin()?)))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Compose a MetricSet resource
    pub fn compose(&self, set: &MetricSet) -> Result<Composition> {
        let ctx = SetContext::from_resource(set).ok_or_else(|| {
            metricset_common::Error::validation_field("<unnamed>", "metadata.name", "is required")
        })?;
        self.compose_in(&ctx)
    }

    /// Compose a spec with an already resolved name and namespace
    pub fn compose_in(&self, set: &SetContext<'_>) -> Result<Composition> {
        set.spec.validate(set.name)?;
        info!(
            metricset = %set.name,
            namespace = %set.namespace,
            metrics = set.spec.metrics.len(),
            pods = set.spec.pods,
            "composing metricset"
        );

        let mut composition = Composition::default();
        let mut sole_tenancy = false;

        for decl in &set.spec.metrics {
            let plan = self.compose_metric(set, decl)?;
            sole_tenancy |= plan.sole_tenancy;

            for job in plan.jobs {
                if composition.job(&job.name).is_some() {
                    return Err(EngineError::DuplicateJob { job: job.name });
                }
                composition.jobs.push(job);
            }
            for script in plan.scripts {
                insert_script(&mut composition.scripts, script)?;
            }
            for job in plan.success_jobs {
                if !composition.success_jobs.contains(&job) {
                    composition.success_jobs.push(job);
                }
            }
        }

        if sole_tenancy {
            debug!(metricset = %set.name, "applying sole tenancy to every job");
            composition.jobs.iter_mut().for_each(apply_sole_tenancy);
        }

        info!(
            metricset = %set.name,
            jobs = composition.jobs.len(),
            scripts = composition.scripts.len(),
            "composed metricset"
        );
        Ok(composition)
    }

    fn compose_metric(&self, set: &SetContext<'_>, decl: &MetricDeclaration) -> Result<MetricPlan> {
        let mut metric = self.registry.metric(&decl.name)?;
        metric.core_mut().apply_declaration(decl);
        metric.set_options(&OptionBag::for_metric(decl))?;
        if let Some(image) = decl.image.as_deref().filter(|image| !image.is_empty()) {
            metric.core_mut().image = image.to_string();
        }
        debug!(metric = %decl.name, kind = ?metric.kind(), image = %metric.core().image, "configured metric");

        let addons = self.configure_addons(set, decl)?;

        if let Validation::Invalid(reason) = metric.validate(set) {
            warn!(metric = %decl.name, %reason, "metric did not validate");
            return Err(EngineError::metric_validation(&decl.name, reason));
        }

        let mut jobs = metric.replicated_jobs(set)?;
        if jobs.is_empty() {
            return Err(EngineError::NoReplicatedJobs {
                metric: decl.name.clone(),
            });
        }
        let mut containers = metric.prepare_containers(set)?;

        let mut volumes: Vec<VolumeSpec> = Vec::new();
        let mut sidecars: Vec<ContainerSpec> = Vec::new();
        for addon in &addons {
            if let Some(provider) = addon.volumes() {
                for volume in provider.assemble_volumes() {
                    if volumes.iter().any(|v| v.name == volume.name) {
                        warn!(addon = %addon.name(), volume = %volume.name, "skipping duplicate volume");
                        continue;
                    }
                    volumes.push(volume);
                }
            }
            if let Some(provider) = addon.containers() {
                for sidecar in provider.assemble_containers(set)? {
                    let taken = containers
                        .iter()
                        .chain(&sidecars)
                        .any(|c| c.name == sidecar.name);
                    if taken {
                        warn!(addon = %addon.name(), container = %sidecar.name, "skipping duplicate container");
                        continue;
                    }
                    sidecars.push(sidecar);
                }
            }
            if let Some(customizer) = addon.entrypoints() {
                debug!(metric = %decl.name, addon = %addon.name(), "customizing entrypoints");
                customizer.customize_entrypoints(&mut containers, &jobs)?;
            }
        }

        if set.interactive() {
            for container in &mut containers {
                container.entrypoint.post = finish_post(&container.entrypoint.post, true);
            }
        }

        // Metric entrypoints are always written; addon containers only when asked
        let written: Vec<&ContainerSpec> = containers
            .iter()
            .chain(sidecars.iter().filter(|c| c.needs_write))
            .collect();

        for job in &mut jobs {
            place(set, job, &containers, &sidecars, &written, &volumes);
        }

        Ok(MetricPlan {
            scripts: written.iter().map(|c| c.entrypoint.clone()).collect(),
            success_jobs: metric.success_jobs(),
            sole_tenancy: metric.sole_tenancy() || addons.iter().any(|a| a.sole_tenancy()),
            jobs,
        })
    }

    /// Instantiate and validate every addon of a metric
    fn configure_addons(
        &self,
        set: &SetContext<'_>,
        decl: &MetricDeclaration,
    ) -> Result<Vec<Box<dyn Addon>>> {
        let mut addons = Vec::with_capacity(decl.addons.len());
        let mut failures = Vec::new();
        for addon_decl in &decl.addons {
            let mut addon = self.registry.addon(&addon_decl.name)?;
            addon.set_options(&OptionBag::for_addon(addon_decl), set)?;
            if let Validation::Invalid(reason) = addon.validate() {
                warn!(metric = %decl.name, addon = %addon_decl.name, %reason, "addon did not validate");
                failures.push(format!("{}: {reason}", addon_decl.name));
            }
            addons.push(addon);
        }
        if !failures.is_empty() {
            return Err(EngineError::AddonValidation {
                metric: decl.name.clone(),
                failures,
            });
        }
        Ok(addons)
    }
}

/// Add a script, allowing a repeated key only with identical content
fn insert_script(
    scripts: &mut BTreeMap<String, EntrypointScript>,
    script: EntrypointScript,
) -> Result<()> {
    match scripts.get(&script.name) {
        Some(existing) if existing.render() != script.render() => Err(EngineError::ScriptConflict {
            key: script.name,
        }),
        Some(_) => Ok(()),
        None => {
            scripts.insert(script.name.clone(), script);
            Ok(())
        }
    }
}

/// Put the containers and volumes belonging to `job` into its pod
fn place(
    set: &SetContext<'_>,
    job: &mut ReplicatedJob,
    containers: &[ContainerSpec],
    sidecars: &[ContainerSpec],
    written: &[&ContainerSpec],
    volumes: &[VolumeSpec],
) {
    let mut mounts = vec![VolumeMount {
        name: set.name.to_string(),
        mount_path: SCRIPT_MOUNT_PATH.to_string(),
        read_only: true,
    }];
    mounts.extend(volumes.iter().filter_map(VolumeSpec::to_mount));

    let items: BTreeMap<&str, KeyToPath> = written
        .iter()
        .filter(|c| c.belongs_to(&job.name))
        .map(|c| (c.entrypoint.name.as_str(), c.entrypoint.key_to_path()))
        .collect();

    let name = job.name.clone();
    let pod = job.pod_spec_mut();
    pod.containers = containers
        .iter()
        .chain(sidecars)
        .filter(|c| c.belongs_to(&name))
        .map(|c| lower_container(c, &mounts))
        .collect();

    pod.volumes = std::iter::once(Volume {
        name: set.name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: set.name.to_string(),
            items: items.into_values().collect(),
        }),
        ..Default::default()
    })
    .chain(volumes.iter().map(VolumeSpec::to_volume))
    .collect();
}

fn lower_container(spec: &ContainerSpec, mounts: &[VolumeMount]) -> Container {
    Container {
        name: spec.name.clone(),
        image: spec.image.clone(),
        image_pull_policy: PULL_POLICY.to_string(),
        command: spec.effective_command(),
        working_dir: spec.working_dir.clone(),
        stdin: true,
        tty: true,
        resources: resource_requirements(&spec.resources),
        volume_mounts: mounts.to_vec(),
        security_context: security_context(spec),
    }
}

fn security_context(spec: &ContainerSpec) -> Option<SecurityContext> {
    let attributes = &spec.attributes;
    let add: Vec<String> = [
        (attributes.allow_ptrace, CAP_SYS_PTRACE),
        (attributes.allow_admin, CAP_SYS_ADMIN),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, cap)| cap.to_string())
    .collect();

    if !attributes.privileged && add.is_empty() {
        return None;
    }
    Some(SecurityContext {
        privileged: attributes.privileged,
        capabilities: (!add.is_empty()).then_some(Capabilities { add }),
    })
}
