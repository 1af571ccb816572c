//! Name to factory tables for metrics and addons
//!
//! A [`Registry`] is built once and is immutable afterwards, so a single
//! instance can be shared across threads. Lookups always return a fresh,
//! unconfigured instance.

use std::collections::BTreeMap;

use tracing::debug;

use crate::addons::{self, Addon, AddonFactory, Named};
use crate::error::{EngineError, Result};
use crate::metrics::{self, Metric, MetricFactory};

/// Immutable table of known metrics and addons
#[derive(Clone, Default)]
pub struct Registry {
    metrics: BTreeMap<String, MetricFactory>,
    addons: BTreeMap<String, AddonFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("metrics", &self.metrics.keys().collect::<Vec<_>>())
            .field("addons", &self.addons.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding every built-in metric and addon
    pub fn builtin() -> Result<Self> {
        let builder = metrics::builtin()
            .into_iter()
            .try_fold(Self::builder(), RegistryBuilder::metric)?;
        let builder = addons::builtin()
            .into_iter()
            .try_fold(builder, RegistryBuilder::addon)?;
        Ok(builder.build())
    }

    /// Fresh metric instance for `name`
    pub fn metric(&self, name: &str) -> Result<Box<dyn Metric>> {
        self.metrics
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::UnknownMetric {
                name: name.to_string(),
            })
    }

    /// Fresh addon instance for `name`
    pub fn addon(&self, name: &str) -> Result<Box<dyn Addon>> {
        self.addons
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::UnknownAddon {
                name: name.to_string(),
            })
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn addon_names(&self) -> impl Iterator<Item = &str> {
        self.addons.keys().map(String::as_str)
    }
}

/// Collects factories; a name may only be registered once per kind
#[derive(Default)]
pub struct RegistryBuilder {
    metrics: BTreeMap<String, MetricFactory>,
    addons: BTreeMap<String, AddonFactory>,
}

impl RegistryBuilder {
    pub fn metric(mut self, factory: MetricFactory) -> Result<Self> {
        let name = factory().name().to_string();
        if self.metrics.contains_key(&name) {
            return Err(EngineError::DuplicateRegistration {
                kind: "metric",
                name,
            });
        }
        debug!(metric = %name, "registered metric");
        self.metrics.insert(name, factory);
        Ok(self)
    }

    pub fn addon(mut self, factory: AddonFactory) -> Result<Self> {
        let name = factory().name().to_string();
        if self.addons.contains_key(&name) {
            return Err(EngineError::DuplicateRegistration {
                kind: "addon",
                name,
            });
        }
        debug!(addon = %name, "registered addon");
        self.addons.insert(name, factory);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            metrics: self.metrics,
            addons: self.addons,
        }
    }
}
