//! A user supplied application run across a launcher and workers
//!
//! The command is also written to `./problem.sh` so wrapping tools can call it.

use tracing::warn;

use crate::error::{Result, Validation};
use crate::options::OptionBag;
use crate::specs::{ContainerSpec, SetContext};

use super::{LauncherWorker, Metric, MetricCore, MetricFamily, MetricKind};

/// `app-custom`
#[derive(Clone, Debug)]
pub struct CustomApp {
    core: MetricCore,
    lw: LauncherWorker,
}

impl Default for CustomApp {
    fn default() -> Self {
        Self {
            core: MetricCore::new(
                "app-custom",
                "Provide a custom application for MPI trace",
                MetricFamily::ProxyApp,
                "",
            )
            .with_url("https://converged-computing.github.io/metrics-operator"),
            lw: LauncherWorker {
                write_problem: true,
                ..Default::default()
            },
        }
    }
}

impl Metric for CustomApp {
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
        if self.core.image.is_empty() {
            warn!(metric = %self.core.name, "no image given, the launcher and workers will not start");
        }
        self.lw.validate(&self.core, set)
    }

    fn prepare_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        self.lw.prepare_containers(&self.core, set)
    }

    fn sole_tenancy(&self) -> bool {
        self.lw.sole_tenancy
    }
}
