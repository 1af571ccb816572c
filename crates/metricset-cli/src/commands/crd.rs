//! Print the MetricSet CustomResourceDefinition

use kube::CustomResourceExt;
use metricset_common::MetricSet;

use crate::Result;

/// Render the CRD manifest as YAML
pub fn manifest() -> Result<String> {
    Ok(serde_yaml::to_string(&MetricSet::crd())?)
}

pub fn run() -> Result<()> {
    print!("{}", manifest()?);
    Ok(())
}
