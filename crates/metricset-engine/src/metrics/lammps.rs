//! LAMMPS molecular dynamics, run across a launcher and workers

use crate::error::{Result, Validation};
use crate::options::OptionBag;
use crate::specs::{ContainerSpec, SetContext};

use super::{LauncherWorker, Metric, MetricCore, MetricFamily, MetricKind};

const IMAGE: &str = "ghcr.io/converged-computing/metric-lammps:latest";
const WORKDIR: &str = "/opt/lammps/examples/reaxff/HNS";
const COMMAND: &str = "mpirun --hostfile ./hostlist.txt -np 2 --map-by socket lmp -v x 2 -v y 2 -v z 2 -in in.reaxc.hns -nocite";

/// `app-lammps`
#[derive(Clone, Debug)]
pub struct Lammps {
    core: MetricCore,
    lw: LauncherWorker,
}

impl Default for Lammps {
    fn default() -> Self {
        Self {
            core: MetricCore::new(
                "app-lammps",
                "LAMMPS molecular dynamic simulation",
                MetricFamily::Simulation,
                IMAGE,
            )
            .with_url("https://www.lammps.org")
            .with_workdir(WORKDIR),
            lw: LauncherWorker::new(COMMAND),
        }
    }
}

impl Metric for Lammps {
    fn core(&self) -> &MetricCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MetricCore {
        &mut self.core
    }

    fn kind(&self) -> MetricKind {
        MetricKind::LauncherWorker
    }

    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        self.lw.set_options(&mut self.core, options)
    }

    fn validate(&self, set: &SetContext<'_>) -> Validation {
        self.lw.validate(&self.core, set)
    }

    fn prepare_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        self.lw.prepare_containers(&self.core, set)
    }

    fn sole_tenancy(&self) -> bool {
        self.lw.sole_tenancy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricset_common::{MetricDeclaration, MetricSetSpec};

    #[test]
    fn defaults_run_the_hns_example() {
        let spec = MetricSetSpec {
            pods: 2,
            ..Default::default()
        };
        let set = SetContext::new("lammps", "default", &spec);
        let metric = Lammps::default();
        let containers = metric.prepare_containers(&set).unwrap();
        let launcher = &containers[0];
        assert_eq!(launcher.image, IMAGE);
        assert_eq!(launcher.working_dir.as_deref(), Some(WORKDIR));
        assert_eq!(launcher.entrypoint.command, COMMAND);
        assert_eq!(metric.success_jobs(), vec!["l"]);
        assert!(!metric.sole_tenancy());
    }

    #[test]
    fn sole_tenancy_option() {
        let mut metric = Lammps::default();
        let decl = MetricDeclaration::new("app-lammps").with_option("soleTenancy", "true");
        metric.set_options(&OptionBag::for_metric(&decl)).unwrap();
        assert!(metric.sole_tenancy());
    }

    #[test]
    fn metadata_carries_declared_options() {
        let spec = MetricSetSpec {
            pods: 2,
            ..Default::default()
        };
        let set = SetContext::new("lammps", "default", &spec);
        let decl = MetricDeclaration::new("app-lammps").with_option("command", "lmp -in in.test");
        let mut metric = Lammps::default();
        metric.core_mut().apply_declaration(&decl);
        metric.set_options(&OptionBag::for_metric(&decl)).unwrap();
        let containers = metric.prepare_containers(&set).unwrap();
        assert!(containers[0]
            .entrypoint
            .pre
            .contains(r#"\"metricOptions\":{\"command\":\"lmp -in in.test\"}"#));
        assert_eq!(containers[0].entrypoint.command, "lmp -in in.test");
    }
}
