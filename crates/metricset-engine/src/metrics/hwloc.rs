//! Hardware locality inspection with hwloc tools

use minijinja::context;

use crate::error::{Result, Validation};
use crate::metadata::{self, COLLECTION_END, COLLECTION_START, SEPARATOR};
use crate::options::OptionBag;
use crate::script;
use crate::specs::{ContainerSpec, SetContext};

use super::{single, Metric, MetricCore, MetricFamily, MetricKind};

const IMAGE: &str = "ghcr.io/converged-computing/metric-hwloc:latest";

const PRE_TEMPLATE: &str = r#"#!/bin/bash
echo "{{ metadata }}"
. /root/.profile
export PATH=/opt/view/bin:$PATH
echo "{{ collection_start }}"
"#;

const POST_TEMPLATE: &str = r#"echo "{{ collection_end }}"
ls
{{ interactive }}
"#;

/// `sys-hwloc`
#[derive(Clone, Debug)]
pub struct Hwloc {
    core: MetricCore,
    commands: Vec<String>,
}

impl Default for Hwloc {
    fn default() -> Self {
        Self {
            core: MetricCore::new(
                "sys-hwloc",
                "install hwloc for inspecting hardware locality",
                MetricFamily::System,
                IMAGE,
            )
            .with_url("https://github.com/open-mpi/hwloc"),
            commands: vec![
                "lstopo architecture.png".to_string(),
                "hwloc-ls machine.xml".to_string(),
            ],
        }
    }
}

impl Metric for Hwloc {
    fn core(&self) -> &MetricCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MetricCore {
        &mut self.core
    }

    fn kind(&self) -> MetricKind {
        MetricKind::SingleApplication
    }

    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        if let Some(commands) = options.list("command")? {
            self.commands = commands;
        }
        Ok(())
    }

    fn validate(&self, _set: &SetContext<'_>) -> Validation {
        Validation::check(!self.commands.is_empty(), || {
            "sys-hwloc needs at least one command".to_string()
        })
    }

    fn prepare_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        let pre = script::render(
            "hwloc-pre",
            PRE_TEMPLATE,
            context! {
                metadata => metadata::metric_metadata(&self.core.export(set))?,
                collection_start => COLLECTION_START,
            },
        )?;
        let command = self
            .commands
            .iter()
            .map(|command| format!("echo {command}\n{command}\necho '{SEPARATOR}'"))
            .collect::<Vec<_>>()
            .join("\n");
        let post = script::render(
            "hwloc-post",
            POST_TEMPLATE,
            context! {
                collection_end => COLLECTION_END,
                interactive => metadata::interactive(set.interactive()),
            },
        )?;
        Ok(vec![single::container(&self.core, pre, command, post)])
    }
}
