//! Addon capabilities and built-in addons
//!
//! Addons are composed from small capability traits rather than a shared
//! base type. Every addon is [`Named`] and an [`OptionCarrier`]; the rest are
//! opt-in and exposed through the accessor methods on [`Addon`]:
//!
//! - [`VolumeProvider`]: extra pod volumes
//! - [`ContainerProvider`]: extra containers (sidecars)
//! - [`EntrypointCustomizer`]: rewrites the metric's own entrypoints
//!
//! The composer calls them in declaration order for each metric.

pub mod application;
pub mod commands;
pub mod darshan;
pub mod hpctoolkit;
pub mod mpitrace;
pub mod spack;
pub mod volumes;

use std::fmt;

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata::MetricExport;
use crate::options::{DeclaredOptions, OptionBag};
use crate::specs::{ContainerSpec, SetContext, VolumeSpec};

pub use application::ApplicationAddon;
pub use commands::{CommandAddon, PerfCommandAddon};
pub use darshan::Darshan;
pub use hpctoolkit::HpcToolkit;
pub use mpitrace::MpiTrace;
pub use volumes::{
    ConfigMapVolume, EmptyVolume, HostPathVolume, PersistentClaimVolume, SecretVolume,
};

/// Documentation grouping for addons
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddonFamily {
    Performance,
    Volume,
    Application,
}

impl fmt::Display for AddonFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Performance => "performance",
            Self::Volume => "volume",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// Identity of an addon
pub trait Named {
    fn name(&self) -> &str;
    fn family(&self) -> AddonFamily;
    fn description(&self) -> &str;
}

/// Option state of an addon
pub trait OptionCarrier {
    /// Resolve options on top of defaults
    fn set_options(&mut self, options: &OptionBag<'_>, set: &SetContext<'_>) -> Result<()>;

    /// Check resolved options; must not mutate
    fn validate(&self) -> Validation {
        Validation::Valid
    }

    /// Options as declared, for metadata
    fn declared(&self) -> &DeclaredOptions;
}

/// Contributes pod volumes
pub trait VolumeProvider {
    fn assemble_volumes(&self) -> Vec<VolumeSpec>;
}

/// Contributes extra containers
pub trait ContainerProvider {
    fn assemble_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>>;
}

/// Rewrites entrypoints of the metric's containers
///
/// Implementations append to `pre`/`post` and wrap `command`; they never
/// replace existing content.
pub trait EntrypointCustomizer {
    fn customize_entrypoints(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
    ) -> Result<()>;
}

/// A pluggable modifier attached to a metric
pub trait Addon: Named + OptionCarrier + Send + Sync {
    fn volumes(&self) -> Option<&dyn VolumeProvider> {
        None
    }

    fn containers(&self) -> Option<&dyn ContainerProvider> {
        None
    }

    fn entrypoints(&self) -> Option<&dyn EntrypointCustomizer> {
        None
    }

    /// Whether every pod in the set needs a node to itself
    fn sole_tenancy(&self) -> bool {
        false
    }
}

/// Metadata document for an addon
pub fn export<A: Named + OptionCarrier + ?Sized>(addon: &A) -> MetricExport {
    let declared = addon.declared();
    MetricExport {
        metric_name: addon.name().to_string(),
        metric_description: addon.description().to_string(),
        metric_options: declared.options.clone(),
        metric_list_options: declared.list_options.clone(),
        ..Default::default()
    }
}

/// Creates a fresh, unconfigured addon
pub type AddonFactory = fn() -> Box<dyn Addon>;

/// Factories for every built-in addon
pub fn builtin() -> Vec<AddonFactory> {
    let factories: [AddonFactory; 11] = [
        || Box::new(CommandAddon::default()),
        || Box::new(PerfCommandAddon::default()),
        || Box::new(ApplicationAddon::default()),
        || Box::new(MpiTrace::default()),
        || Box::new(Darshan::default()),
        || Box::new(HpcToolkit::default()),
        || Box::new(ConfigMapVolume::default()),
        || Box::new(SecretVolume::default()),
        || Box::new(HostPathVolume::default()),
        || Box::new(PersistentClaimVolume::default()),
        || Box::new(EmptyVolume::default()),
    ];
    factories.to_vec()
}
