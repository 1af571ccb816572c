//! `perf-mpitrace`: preload libmpitrace from a shared spack view

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

pub const IMAGE: &str = "ghcr.io/converged-computing/metric-mpitrace:rocky";

#[derive(Clone, Debug)]
pub struct MpiTrace {
    declared: DeclaredOptions,
    view: SpackView,
}

impl Default for MpiTrace {
    fn default() -> Self {
        Self {
            declared: DeclaredOptions::default(),
            view: SpackView::new("mpitrace", IMAGE),
        }
    }
}

impl MpiTrace {
    fn hooks() -> ViewHooks {
        ViewHooks {
            variables: vec!["libmpitraceso=${viewbase}/view/lib/libmpitrace.so".to_string()],
            wait_for: vec!["${libmpitraceso}".to_string()],
            ..Default::default()
        }
    }
}

impl Named for MpiTrace {
    fn name(&self) -> &str {
        "perf-mpitrace"
    }

    fn family(&self) -> AddonFamily {
        AddonFamily::Performance
    }

    fn description(&self) -> &str {
        "library for measuring communication in distributed-memory parallel applications that use MPI"
    }
}

impl OptionCarrier for MpiTrace {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.declared = options.declared();
        self.view.set_options(options)
    }

    fn validate(&self) -> Validation {
        self.view.validate()
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.declared
    }
}

impl VolumeProvider for MpiTrace {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        self.view.volumes()
    }
}

impl ContainerProvider for MpiTrace {
    fn assemble_containers(&self, _set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        self.view.containers()
    }
}

impl EntrypointCustomizer for MpiTrace {
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
    ) -> Result<()> {
        let meta = metadata::addon_metadata(&export(self))?;
        let pre = self.view.wait_block(&meta, &Self::hooks())?;
        self.view.customize(&pre, containers, jobs, |entrypoint| {
            entrypoint.command = format!(
                "export LD_PRELOAD=${{libmpitraceso}}\n{}\nunset LD_PRELOAD",
                entrypoint.command
            );
        })
    }
}

impl Addon for MpiTrace {
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
    use crate::specs::EntrypointScript;
    use crate::topology::{assemble_replicated_job, JobShape};
    use metricset_common::{AddonDeclaration, MetricSetSpec};

    #[test]
    fn wraps_command_with_preload() {
        let spec = MetricSetSpec::default();
        let set = SetContext::new("bench", "default", &spec);
        let mut addon = MpiTrace::default();
        let decl = AddonDeclaration::new("perf-mpitrace").with_option("mount", "/opt/mnt");
        addon
            .set_options(&OptionBag::for_addon(&decl), &set)
            .unwrap();
        assert!(addon.validate().is_valid());

        let jobs = vec![assemble_replicated_job(&set, &JobShape::single(&set))];
        let mut containers = vec![ContainerSpec {
            job_name: "m".to_string(),
            name: "app".to_string(),
            entrypoint: EntrypointScript::new("/metrics_operator/app-entrypoint.sh")
                .with_command("mpirun app"),
            ..Default::default()
        }];
        addon.customize_entrypoints(&mut containers, &jobs).unwrap();

        let entrypoint = &containers[0].entrypoint;
        assert_eq!(
            entrypoint.command,
            "export LD_PRELOAD=${libmpitraceso}\nmpirun app\nunset LD_PRELOAD"
        );
        assert!(entrypoint.pre.contains("viewbase=\"/opt/mnt\"\n"));
        assert!(entrypoint
            .pre
            .contains("goshare-wait-fs -p ${libmpitraceso}\n"));
    }

    #[test]
    fn contributes_sidecar_and_volume() {
        let spec = MetricSetSpec::default();
        let set = SetContext::new("bench", "default", &spec);
        let addon = MpiTrace::default();
        let sidecars = addon.assemble_containers(&set).unwrap();
        assert_eq!(sidecars[0].name, "mpitrace");
        assert_eq!(sidecars[0].image, IMAGE);
        assert_eq!(addon.assemble_volumes()[0].path, "/opt/share");
    }
}
