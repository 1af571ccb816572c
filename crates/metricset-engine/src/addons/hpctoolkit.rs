//! `perf-hpctoolkit`: sample the metric command with `hpcrun`

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata;
use crate::options::{DeclaredOptions, OptionBag};
use crate::specs::{ContainerSpec, SetContext, VolumeSpec};

use super::spack::{SpackView, ViewHooks};
use super::{
    export, Addon, AddonFamily, ContainerProvider, EntrypointCustomizer, Named, OptionCarrier,
    VolumeProvider,
};

pub const IMAGE: &str = "ghcr.io/converged-computing/metric-hpctoolkit-view:latest";

#[derive(Clone, Debug)]
pub struct HpcToolkit {
    declared: DeclaredOptions,
    view: SpackView,
    /// Event list handed to `hpcrun`, e.g. `-e IO`
    events: String,
}

impl Default for HpcToolkit {
    fn default() -> Self {
        Self {
            declared: DeclaredOptions::default(),
            view: SpackView::new("hpctoolkit", IMAGE),
            events: String::new(),
        }
    }
}

impl HpcToolkit {
    fn hooks(&self) -> ViewHooks {
        ViewHooks {
            wait_for: vec!["${viewbin}/hpcrun".to_string()],
            before_start: vec![
                "# Allow sampling of kernel events".to_string(),
                "echo \"-1\" | tee /proc/sys/kernel/perf_event_paranoid".to_string(),
                format!("events=\"{}\"", self.events),
            ],
            ..Default::default()
        }
    }
}

impl Named for HpcToolkit {
    fn name(&self) -> &str {
        "perf-hpctoolkit"
    }

    fn family(&self) -> AddonFamily {
        AddonFamily::Performance
    }

    fn description(&self) -> &str {
        "performance tools for measurement and analysis"
    }
}

impl OptionCarrier for HpcToolkit {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.declared = options.declared();
        options.assign_string("events", &mut self.events)?;
        self.view.set_options(options)
    }

    fn validate(&self) -> Validation {
        Validation::check(!self.events.trim().is_empty(), || {
            "perf-hpctoolkit requires events".to_string()
        })
        .and(|| self.view.validate())
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.declared
    }
}

impl VolumeProvider for HpcToolkit {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        self.view.volumes()
    }
}

impl ContainerProvider for HpcToolkit {
    fn assemble_containers(&self, _set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        self.view.containers()
    }
}

impl EntrypointCustomizer for HpcToolkit {
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
    ) -> Result<()> {
        let meta = metadata::addon_metadata(&export(self))?;
        let pre = self.view.wait_block(&meta, &self.hooks())?;
        self.view.customize(&pre, containers, jobs, |entrypoint| {
            entrypoint.command = format!("hpcrun $events {}", entrypoint.command);
        })
    }
}

impl Addon for HpcToolkit {
    fn volumes(&self) -> Option<&dyn VolumeProvider> {
        Some(self)
    }

    fn containers(&self) -> Option<&dyn ContainerProvider> {
        Some(self)
    }

    fn entrypoints(&self) -> Option<&dyn EntrypointCustomizer> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::COLLECTION_START;
    use crate::specs::EntrypointScript;
    use crate::topology::{assemble_replicated_job, JobShape};
    use metricset_common::{AddonDeclaration, MetricSetSpec};

    fn configured(decl: &AddonDeclaration) -> HpcToolkit {
        let spec = MetricSetSpec::default();
        let set = SetContext::new("bench", "default", &spec);
        let mut addon = HpcToolkit::default();
        addon
            .set_options(&OptionBag::for_addon(decl), &set)
            .unwrap();
        addon
    }

    #[test]
    fn events_are_required() {
        let addon = configured(&AddonDeclaration::new("perf-hpctoolkit"));
        assert_eq!(
            addon.validate(),
            Validation::invalid("perf-hpctoolkit requires events")
        );
    }

    #[test]
    fn command_runs_under_hpcrun() {
        let addon =
            configured(&AddonDeclaration::new("perf-hpctoolkit").with_option("events", "-e IO"));
        let spec = MetricSetSpec::default();
        let set = SetContext::new("bench", "default", &spec);
        let jobs = vec![assemble_replicated_job(&set, &JobShape::single(&set))];
        let mut containers = vec![ContainerSpec {
            job_name: "m".to_string(),
            name: "app".to_string(),
            entrypoint: EntrypointScript::new("/metrics_operator/app-entrypoint.sh")
                .with_command("./app"),
            ..Default::default()
        }];
        addon.customize_entrypoints(&mut containers, &jobs).unwrap();

        let entrypoint = &containers[0].entrypoint;
        assert_eq!(entrypoint.command, "hpcrun $events ./app");
        let events = entrypoint.pre.find("events=\"-e IO\"").unwrap();
        assert!(events < entrypoint.pre.find(COLLECTION_START).unwrap());
        assert!(entrypoint.pre.contains("goshare-wait-fs -p ${viewbin}/hpcrun\n"));
    }
}
