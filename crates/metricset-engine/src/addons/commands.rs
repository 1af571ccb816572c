//! Addons that customize a metric's entrypoints with user supplied shell

use minijinja::context;

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata;
use crate::options::{DeclaredOptions, OptionBag};
use crate::script::{self, append_post, append_pre, wrap_command, Target};
use crate::specs::{ContainerSpec, SetContext};

use super::{export, Addon, AddonFamily, EntrypointCustomizer, Named, OptionCarrier};

const PRE_TEMPLATE: &str = r#"
echo "{{ metadata }}"
{{ pre_block }}
"#;

/// Options shared by `commands` and `perf-commands`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandBlocks {
    pub target: Target,
    pub prefix: String,
    pub suffix: String,
    pub pre_block: String,
    pub post_block: String,
}

impl CommandBlocks {
    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        self.target = Target::from_options(options)?;
        options.assign_string("prefix", &mut self.prefix)?;
        options.assign_string("suffix", &mut self.suffix)?;
        options.assign_string("preBlock", &mut self.pre_block)?;
        options.assign_string("postBlock", &mut self.post_block)?;
        Ok(())
    }

    fn validate(&self, name: &str) -> Validation {
        let any = [&self.prefix, &self.suffix, &self.pre_block, &self.post_block]
            .iter()
            .any(|s| !s.is_empty());
        Validation::check(any, || {
            format!("{name} requires one of prefix, suffix, preBlock or postBlock")
        })
    }

    /// Rewrite every selected container; `extra` runs on each one afterwards
    fn apply<F>(
        &self,
        meta: &str,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
        mut extra: F,
    ) -> Result<()>
    where
        F: FnMut(&mut ContainerSpec),
    {
        let pre = script::render(
            "commands-pre",
            PRE_TEMPLATE,
            context! { metadata => meta, pre_block => self.pre_block },
        )?;
        self.target.for_each_selected(containers, jobs, |container| {
            let entrypoint = &mut container.entrypoint;
            entrypoint.pre = append_pre(&entrypoint.pre, &pre);
            if !self.post_block.is_empty() {
                entrypoint.post = append_post(&entrypoint.post, &format!("\n{}", self.post_block));
            }
            entrypoint.command = wrap_command(&entrypoint.command, &self.prefix, &self.suffix);
            extra(container);
            Ok(())
        })
    }
}

// =============================================================================
// commands
// =============================================================================

/// `commands`: prefix/suffix the command and add pre/post blocks
#[derive(Clone, Debug, Default)]
pub struct CommandAddon {
    declared: DeclaredOptions,
    blocks: CommandBlocks,
}

impl Named for CommandAddon {
    fn name(&self) -> &str {
        "commands"
    }

    fn family(&self) -> AddonFamily {
        AddonFamily::Application
    }

    fn description(&self) -> &str {
        "customize a metric's entrypoints"
    }
}

impl OptionCarrier for CommandAddon {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.declared = options.declared();
        self.blocks.set_options(options)
    }

    fn validate(&self) -> Validation {
        self.blocks.validate(self.name())
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.declared
    }
}

impl EntrypointCustomizer for CommandAddon {
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
    ) -> Result<()> {
        let meta = metadata::addon_metadata(&export(self))?;
        self.blocks.apply(&meta, containers, jobs, |_| {})
    }
}

impl Addon for CommandAddon {
    fn entrypoints(&self) -> Option<&dyn EntrypointCustomizer> {
        Some(self)
    }
}

// =============================================================================
// perf-commands
// =============================================================================

/// `perf-commands`: like `commands`, and grants SYS_PTRACE and SYS_ADMIN
#[derive(Clone, Debug, Default)]
pub struct PerfCommandAddon {
    declared: DeclaredOptions,
    blocks: CommandBlocks,
}

impl Named for PerfCommandAddon {
    fn name(&self) -> &str {
        "perf-commands"
    }

    fn family(&self) -> AddonFamily {
        AddonFamily::Performance
    }

    fn description(&self) -> &str {
        "customize a metric's entrypoints expecting performance tracing (adding ptrace and admin caps)"
    }
}

impl OptionCarrier for PerfCommandAddon {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.declared = options.declared();
        self.blocks.set_options(options)
    }

    fn validate(&self) -> Validation {
        self.blocks.validate(self.name())
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.declared
    }
}

impl EntrypointCustomizer for PerfCommandAddon {
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
    ) -> Result<()> {
        let meta = metadata::addon_metadata(&export(self))?;
        self.blocks.apply(&meta, containers, jobs, |container| {
            container.attributes.allow_ptrace = true;
            container.attributes.allow_admin = true;
        })
    }
}

impl Addon for PerfCommandAddon {
    fn entrypoints(&self) -> Option<&dyn EntrypointCustomizer> {
        Some(self)
    }
}
