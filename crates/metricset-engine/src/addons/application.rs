//! `application`: run an extra container next to the metric

use std::collections::BTreeMap;

use metricset_common::{ContainerResources, IntOrString};

use crate::error::{Result, Validation};
use crate::options::{DeclaredOptions, OptionBag};
use crate::specs::{ContainerSpec, EntrypointScript, SetContext};

use super::{Addon, AddonFamily, ContainerProvider, Named, OptionCarrier};

pub const DEFAULT_NAME: &str = "app-addon";

#[derive(Clone, Debug)]
pub struct ApplicationAddon {
    declared: DeclaredOptions,
    image: String,
    /// Container name
    name: String,
    command: String,
    workdir: String,
    privileged: bool,
    sole_tenancy: bool,
    resources: ContainerResources,
}

impl Default for ApplicationAddon {
    fn default() -> Self {
        Self {
            declared: DeclaredOptions::default(),
            image: String::new(),
            name: DEFAULT_NAME.to_string(),
            command: String::new(),
            workdir: String::new(),
            privileged: false,
            sole_tenancy: false,
            resources: ContainerResources::default(),
        }
    }
}

fn quantities(options: &OptionBag<'_>, key: &str) -> Result<BTreeMap<String, IntOrString>> {
    Ok(options
        .map(key)?
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, IntOrString::String(v)))
        .collect())
}

impl Named for ApplicationAddon {
    fn name(&self) -> &str {
        "application"
    }

    fn family(&self) -> AddonFamily {
        AddonFamily::Application
    }

    fn description(&self) -> &str {
        "basic application (container) type"
    }
}

impl OptionCarrier for ApplicationAddon {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.declared = options.declared();
        options.assign_string("image", &mut self.image)?;
        options.assign_string("name", &mut self.name)?;
        options.assign_string("command", &mut self.command)?;
        options.assign_string("workdir", &mut self.workdir)?;
        options.assign_flag("privileged", &mut self.privileged)?;
        options.assign_flag("soleTenancy", &mut self.sole_tenancy)?;
        self.resources = ContainerResources {
            limits: quantities(options, "resourceLimits")?,
            requests: quantities(options, "resourceRequests")?,
        };
        Ok(())
    }

    fn validate(&self) -> Validation {
        Validation::check(!self.image.is_empty(), || {
            "the application addon requires a container 'image'".to_string()
        })
        .and(|| {
            Validation::check(!self.command.trim().is_empty(), || {
                "the application addon requires a container 'command'".to_string()
            })
        })
        .and(|| {
            Validation::check(!self.name.is_empty(), || {
                "the application addon requires a container 'name'".to_string()
            })
        })
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.declared
    }
}

impl ContainerProvider for ApplicationAddon {
    fn assemble_containers(&self, _set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        let mut container = ContainerSpec {
            name: self.name.clone(),
            image: self.image.clone(),
            working_dir: (!self.workdir.is_empty()).then(|| self.workdir.clone()),
            command: self.command.split_whitespace().map(str::to_string).collect(),
            entrypoint: EntrypointScript::new(format!(
                "{}{}-entrypoint.sh",
                metricset_common::SCRIPT_MOUNT_PATH,
                self.name
            )),
            resources: self.resources.clone(),
            ..Default::default()
        };
        container.attributes.privileged = self.privileged;
        Ok(vec![container])
    }
}

impl Addon for ApplicationAddon {
    fn containers(&self) -> Option<&dyn ContainerProvider> {
        Some(self)
    }

    fn sole_tenancy(&self) -> bool {
        self.sole_tenancy
    }
}
