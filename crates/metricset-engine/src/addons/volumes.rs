//! Volume addons: mount existing cluster storage into every metric pod

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, Validation};
use crate::options::{DeclaredOptions, OptionBag};
use crate::specs::{SetContext, VolumeSource, VolumeSpec};

use super::{Addon, AddonFamily, Named, OptionCarrier, VolumeProvider};

/// Options every volume addon shares
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeBase {
    declared: DeclaredOptions,
    /// Unique volume name
    pub name: String,
    /// Mount path in the containers
    pub path: String,
    pub read_only: bool,
}

impl VolumeBase {
    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        self.declared = options.declared();
        options.assign_string("name", &mut self.name)?;
        options.assign_string("path", &mut self.path)?;
        options.assign_flag("readOnly", &mut self.read_only)?;
        Ok(())
    }

    fn validate(&self, addon: &str) -> Validation {
        Validation::check(!self.name.is_empty(), || {
            format!("{addon} requires a 'name' for a unique container mount")
        })
        .and(|| {
            Validation::check(!self.path.is_empty(), || {
                format!("{addon} requires a 'path' for the container mount")
            })
        })
    }

    fn spec(&self, source: VolumeSource) -> VolumeSpec {
        VolumeSpec::new(&self.name, source, &self.path).read_only(self.read_only)
    }
}

/// Parent directory of a mount path, `/` for top level paths
fn parent_dir(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => "/".to_string(),
    }
}

fn required(value: &str, addon: &str, key: &str) -> Validation {
    Validation::check(!value.is_empty(), || format!("{addon} requires a '{key}'"))
}

macro_rules! volume_addon {
    ($ty:ident, $name:literal, $description:literal) => {
        impl Named for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn family(&self) -> AddonFamily {
                AddonFamily::Volume
            }

            fn description(&self) -> &str {
                $description
            }
        }

        impl Addon for $ty {
            fn volumes(&self) -> Option<&dyn VolumeProvider> {
                Some(self)
            }
        }
    };
}

// =============================================================================
// volume-cm
// =============================================================================

/// An existing config map, projected item by item
#[derive(Clone, Debug, Default)]
pub struct ConfigMapVolume {
    base: VolumeBase,
    config_map_name: String,
    /// Key to relative path
    items: BTreeMap<String, String>,
}

volume_addon!(ConfigMapVolume, "volume-cm", "config map volume type");

impl OptionCarrier for ConfigMapVolume {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.base.set_options(options)?;
        options.assign_string("configMapName", &mut self.config_map_name)?;
        self.items = options.map("items")?.unwrap_or_default();
        Ok(())
    }

    fn validate(&self) -> Validation {
        required(&self.config_map_name, self.name(), "configMapName")
            .and(|| {
                Validation::check(!self.items.is_empty(), || {
                    "volume-cm requires at least one entry in mapOptions items".to_string()
                })
            })
            .and(|| self.base.validate(self.name()))
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.base.declared
    }
}

impl VolumeProvider for ConfigMapVolume {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        let source = VolumeSource::ConfigMap {
            name: self.config_map_name.clone(),
            items: self.items.clone(),
        };
        vec![VolumeSpec::new(&self.base.name, source, parent_dir(&self.base.path)).read_only(true)]
    }
}

// =============================================================================
// volume-secret
// =============================================================================

/// An existing secret
#[derive(Clone, Debug, Default)]
pub struct SecretVolume {
    base: VolumeBase,
    secret_name: String,
}

volume_addon!(SecretVolume, "volume-secret", "secret volume type");

impl OptionCarrier for SecretVolume {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.base.set_options(options)?;
        options.assign_string("secretName", &mut self.secret_name)
    }

    fn validate(&self) -> Validation {
        required(&self.secret_name, self.name(), "secretName")
            .and(|| self.base.validate(self.name()))
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.base.declared
    }
}

impl VolumeProvider for SecretVolume {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        vec![self.base.spec(VolumeSource::Secret {
            secret_name: self.secret_name.clone(),
        })]
    }
}

// =============================================================================
// volume-hostpath
// =============================================================================

/// A directory on the node
#[derive(Clone, Debug, Default)]
pub struct HostPathVolume {
    base: VolumeBase,
    host_path: String,
}

volume_addon!(HostPathVolume, "volume-hostpath", "host path volume type");

impl OptionCarrier for HostPathVolume {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.base.set_options(options)?;
        options.assign_string("hostPath", &mut self.host_path)
    }

    fn validate(&self) -> Validation {
        required(&self.host_path, self.name(), "hostPath").and(|| self.base.validate(self.name()))
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.base.declared
    }
}

impl VolumeProvider for HostPathVolume {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        vec![self.base.spec(VolumeSource::HostPath {
            path: self.host_path.clone(),
        })]
    }
}

// =============================================================================
// volume-pvc
// =============================================================================

/// An existing persistent volume claim
#[derive(Clone, Debug, Default)]
pub struct PersistentClaimVolume {
    base: VolumeBase,
    claim_name: String,
}

volume_addon!(
    PersistentClaimVolume,
    "volume-pvc",
    "persistent volume claim volume type"
);

impl OptionCarrier for PersistentClaimVolume {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.base.set_options(options)?;
        options.assign_string("claimName", &mut self.claim_name)
    }

    fn validate(&self) -> Validation {
        required(&self.claim_name, self.name(), "claimName")
            .and(|| self.base.validate(self.name()))
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.base.declared
    }
}

impl VolumeProvider for PersistentClaimVolume {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        vec![self.base.spec(VolumeSource::PersistentClaim {
            claim_name: self.claim_name.clone(),
        })]
    }
}

// =============================================================================
// volume-empty
// =============================================================================

/// Scratch space shared by the containers of a pod
#[derive(Clone, Debug, Default)]
pub struct EmptyVolume {
    base: VolumeBase,
}

volume_addon!(EmptyVolume, "volume-empty", "empty volume type");

impl OptionCarrier for EmptyVolume {
    fn set_options(&mut self, options: &OptionBag<'_>, _set: &SetContext<'_>) -> Result<()> {
        self.base.set_options(options)
    }

    fn validate(&self) -> Validation {
        self.base.validate(self.name())
    }

    fn declared(&self) -> &DeclaredOptions {
        &self.base.declared
    }
}

impl VolumeProvider for EmptyVolume {
    fn assemble_volumes(&self) -> Vec<VolumeSpec> {
        vec![self.base.spec(VolumeSource::EmptyDir)]
    }
}
