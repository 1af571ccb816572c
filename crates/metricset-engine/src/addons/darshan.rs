//! `perf-darshan`: I/O characterization with a preloaded darshan runtime

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata;
use crate::options::{DeclaredOptions, OptionBag};
use crate::script::append_post;
use crate::specs::{ContainerSpec, SetContext, VolumeSpec};

use super::spack::{SpackView, ViewHooks};
use super::{
    export, Addon, AddonFamily, ContainerProvider, EntrypointCustomizer, Named, OptionCarrier,
    VolumeProvider,
};

pub const IMAGE: &str = "ghcr.io/converged-computing/metric-darshan-view:ubuntu";
pub const DEFAULT_OUTPUT: &str = "darshan-result";

#[derive(Clone, Debug)]
pub struct Darshan {
    declared: DeclaredOptions,
    view: SpackView,
    /// Log file written by the instrumented run
    output: String,
}

impl Default for Darshan {
    fn default() -> Self {
        Self {
            declared: DeclaredOptions::default(),
            view: SpackView::new("darshan", IMAGE),
            output: DEFAULT_OUTPUT.to_string(),
        }
    }
}

impl Darshan {
    fn hooks(&self) -> ViewHooks {
        ViewHooks {
            variables: vec!["libdarshan=$viewbase/view/lib/libdarshan.so".to_string()],
            wait_for: vec!["${libdarshan}".to_string()],
            after_start: vec![
                "export LD_LIBRARY_PATH=$viewbase/view/lib".to_string(),
                format!("export DARSHAN_LOGFILE={}", self.output),
                "export LD_PRELOAD=$libdarshan".to_string(),
            ],
            ..Default::default()
        }
    }
}

impl Named for Darshan {
    fn name(&self) -> &str {
        "perf-darshan"
    }

    fn family(&self) -> AddonFamily {
        AddonFamily::Performance
    }

    fn description(&self) -> &str {
        "lightweight I/O characterization tool that transparently captures I/O access pattern information from HPC applications"
    }
}

impl OptionCarrier for Darshan {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.declared = options.declared();
        options.assign_string("output", &mut self.output)?;
        self.view.set_options(options)
    }

    fn validate(&self) -> Validation {
        self.view.validate().and(|| {
            Validation::check(!self.output.trim().is_empty(), || {
                "perf-darshan output must not be empty".to_string()
            })
        })
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.declared
    }
}

impl VolumeProvider for Darshan {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        self.view.volumes()
    }
}

impl ContainerProvider for Darshan {
    fn assemble_containers(&self, _set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        self.view.containers()
    }
}

impl EntrypointCustomizer for Darshan {
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
    ) -> Result<()> {
        let meta = metadata::addon_metadata(&export(self))?;
        let pre = self.view.wait_block(&meta, &self.hooks())?;
        self.view.customize(&pre, containers, jobs, |entrypoint| {
            entrypoint.post = append_post(&entrypoint.post, "unset LD_PRELOAD");
        })
    }
}

impl Addon for Darshan {
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
    use crate::metadata::{HOLD_OPEN, SEPARATOR};
    use crate::specs::EntrypointScript;
    use crate::topology::{assemble_replicated_job, JobShape};
    use metricset_common::{AddonDeclaration, MetricSetSpec};

    #[test]
    fn preloads_after_separator_and_unsets_before_hold_open() {
        let spec = MetricSetSpec::default();
        let set = SetContext::new("bench", "default", &spec);
        let mut addon = Darshan::default();
        let decl = AddonDeclaration::new("perf-darshan").with_option("output", "/tmp/run.darshan");
        addon
            .set_options(&OptionBag::for_addon(&decl), &set)
            .unwrap();

        let jobs = vec![assemble_replicated_job(&set, &JobShape::single(&set))];
        let mut containers = vec![ContainerSpec {
            job_name: "m".to_string(),
            name: "io".to_string(),
            entrypoint: EntrypointScript::new("/metrics_operator/io-entrypoint.sh")
                .with_command("ior")
                .with_post(format!("\necho done\n{HOLD_OPEN}\n")),
            ..Default::default()
        }];
        addon.customize_entrypoints(&mut containers, &jobs).unwrap();

        let entrypoint = &containers[0].entrypoint;
        assert_eq!(entrypoint.command, "ior");
        let separator = entrypoint.pre.find(SEPARATOR).unwrap();
        let preload = entrypoint.pre.find("export LD_PRELOAD=$libdarshan").unwrap();
        assert!(separator < preload);
        assert!(entrypoint
            .pre
            .contains("export DARSHAN_LOGFILE=/tmp/run.darshan\n"));
        assert_eq!(
            entrypoint.post,
            format!("\necho done\nunset LD_PRELOAD\n{HOLD_OPEN}\n")
        );
    }

    #[test]
    fn empty_output_is_invalid() {
        let spec = MetricSetSpec::default();
        let set = SetContext::new("bench", "default", &spec);
        let mut addon = Darshan::default();
        let decl = AddonDeclaration::new("perf-darshan").with_option("output", " ");
        addon
            .set_options(&OptionBag::for_addon(&decl), &set)
            .unwrap();
        assert!(!addon.validate().is_valid());
    }
}
