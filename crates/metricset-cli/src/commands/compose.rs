//! Compose a MetricSet manifest into jobs and scripts
//!
//! Reads a MetricSet from YAML (or JSON), composes it with the built-in
//! registry and prints the replicated jobs together with the scripts config
//! map. Optionally writes each rendered script to a directory as well.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use metricset_common::MetricSet;
use metricset_engine::k8s::ReplicatedJob;
use metricset_engine::{Composer, Composition};

use super::OutputFormat;
use crate::{Error, Result};

/// Compose a MetricSet manifest
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// MetricSet manifest (YAML or JSON)
    #[arg(short, long, env = "METRICSET_FILE")]
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub output: OutputFormat,

    /// Also write each rendered entrypoint script into this directory
    #[arg(long)]
    pub scripts_dir: Option<PathBuf>,
}

/// Scripts config map for the set
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScriptsConfigMap {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
}

/// Document printed by `metricset compose`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeOutput {
    pub name: String,
    pub namespace: String,
    pub replicated_jobs: Vec<ReplicatedJob>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub success_jobs: Vec<String>,
    pub config_map: ScriptsConfigMap,
}

/// Parse a MetricSet manifest
pub fn parse_manifest(text: &str) -> Result<MetricSet> {
    let set: MetricSet = serde_yaml::from_str(text)?;
    if set.metadata.name.as_deref().unwrap_or_default().is_empty() {
        return Err(Error::invalid_manifest("metadata.name is required"));
    }
    Ok(set)
}

/// Compose a parsed MetricSet into the printed document
pub fn compose(composer: &Composer, set: &MetricSet) -> Result<(ComposeOutput, Composition)> {
    let composition = composer.compose(set)?;
    let name = set.metadata.name.clone().unwrap_or_default();
    let namespace = set
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let output = ComposeOutput {
        config_map: ScriptsConfigMap {
            name: name.clone(),
            namespace: namespace.clone(),
            data: composition.config_map_data(),
        },
        name,
        namespace,
        replicated_jobs: composition.jobs.clone(),
        success_jobs: composition.success_jobs.clone(),
    };
    Ok((output, composition))
}

/// Write every rendered script under `dir`, named by its mount file name
pub fn write_scripts(dir: &Path, composition: &Composition) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(composition.scripts.len());
    for script in composition.scripts.values() {
        let path = dir.join(script.file_name());
        fs::write(&path, script.render())?;
        make_executable(&path)?;
        debug!(path = %path.display(), key = %script.name, "wrote script");
        written.push(path);
    }
    Ok(written)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

pub fn run(args: ComposeArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file).map_err(|source| Error::ReadManifest {
        path: args.file.clone(),
        source,
    })?;
    let set = parse_manifest(&text)?;
    let composer = Composer::builtin()?;
    let (output, composition) = compose(&composer, &set)?;

    if let Some(dir) = &args.scripts_dir {
        let written = write_scripts(dir, &composition)?;
        info!(dir = %dir.display(), scripts = written.len(), "wrote entrypoint scripts");
    }

    print!("{}", args.output.render(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LAMMPS: &str = r#"
apiVersion: flux-framework.org/v1alpha2
kind: MetricSet
metadata:
  name: lammps
  namespace: bench
spec:
  pods: 3
  metrics:
    - name: app-lammps
      options:
        command: mpirun -np 3 lmp -in in.reaxc.hns
      addons:
        - name: commands
          options:
            target: w
            preBlock: echo worker ready
"#;

    #[test]
    fn composes_manifest_into_jobs_and_scripts() {
        let set = parse_manifest(LAMMPS).unwrap();
        let composer = Composer::builtin().unwrap();
        let (output, _) = compose(&composer, &set).unwrap();

        assert_eq!(output.name, "lammps");
        assert_eq!(output.namespace, "bench");
        let jobs: Vec<&str> = output
            .replicated_jobs
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(jobs, vec!["l", "w"]);
        assert_eq!(output.success_jobs, vec!["l"]);
        assert!(output.config_map.data["launcher"].contains("mpirun -np 3 lmp"));
        assert!(output.config_map.data["worker"].contains("echo worker ready"));

        let yaml = OutputFormat::Yaml.render(&output).unwrap();
        assert!(yaml.contains("replicatedJobs:"));
        assert!(yaml.contains("setHostnameAsFQDN: true"));
    }

    #[rstest]
    #[case::missing_name("kind: MetricSet\napiVersion: flux-framework.org/v1alpha2\nmetadata: {}\nspec:\n  metrics: []\n")]
    #[case::not_yaml_mapping("- just\n- a list\n")]
    fn rejects_bad_manifests(#[case] text: &str) {
        assert!(parse_manifest(text).is_err());
    }

    #[test]
    fn unknown_metric_is_reported() {
        let text = LAMMPS.replace("app-lammps", "does-not-exist");
        let set = parse_manifest(&text).unwrap();
        let composer = Composer::builtin().unwrap();
        let err = compose(&composer, &set).unwrap_err();
        assert_eq!(err.to_string(), "does-not-exist is not a registered Metric type");
    }

    #[test]
    fn writes_scripts_by_file_name() {
        let set = parse_manifest(LAMMPS).unwrap();
        let composer = Composer::builtin().unwrap();
        let (_, composition) = compose(&composer, &set).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let written = write_scripts(dir.path(), &composition).unwrap();
        let names: Vec<String> = written
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["launcher.sh", "worker.sh"]);
        let launcher = fs::read_to_string(dir.path().join("launcher.sh")).unwrap();
        assert_eq!(launcher, composition.scripts["launcher"].render());
    }
}
