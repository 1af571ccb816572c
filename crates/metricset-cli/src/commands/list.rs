//! List registered metrics and addons

use clap::{Args, ValueEnum};
use serde::Serialize;

use metricset_engine::addons::Named;
use metricset_engine::metrics::Metric;
use metricset_engine::Registry;

use super::print_table;
use crate::Result;

/// List the metric and addon catalogue
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: ListFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// One catalogue row
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub kind: &'static str,
    pub name: String,
    pub family: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// Metrics then addons, each sorted by name
pub fn catalogue(registry: &Registry) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for name in registry.metric_names() {
        let metric = registry.metric(name)?;
        entries.push(Entry {
            kind: "metric",
            name: name.to_string(),
            family: metric.family().to_string(),
            description: metric.summary().to_string(),
            url: metric.url().to_string(),
        });
    }
    for name in registry.addon_names() {
        let addon = registry.addon(name)?;
        entries.push(Entry {
            kind: "addon",
            name: name.to_string(),
            family: addon.family().to_string(),
            description: addon.description().to_string(),
            url: String::new(),
        });
    }
    Ok(entries)
}

pub fn run(args: ListArgs) -> Result<()> {
    let registry = Registry::builtin()?;
    let entries = catalogue(&registry)?;
    match args.output {
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        ListFormat::Table => {
            let rows: Vec<Vec<String>> = entries
                .into_iter()
                .map(|e| vec![e.kind.to_string(), e.name, e.family, e.description, e.url])
                .collect();
            print_table(&["KIND", "NAME", "FAMILY", "DESCRIPTION", "URL"], &rows);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_lists_metrics_before_addons() {
        let registry = Registry::builtin().unwrap();
        let entries = catalogue(&registry).unwrap();
        let first_addon = entries.iter().position(|e| e.kind == "addon").unwrap();
        assert!(entries[..first_addon].iter().all(|e| e.kind == "metric"));

        let lammps = entries.iter().find(|e| e.name == "app-lammps").unwrap();
        assert_eq!(lammps.family, "simulation");
        assert_eq!(lammps.url, "https://www.lammps.org");
        let pvc = entries.iter().find(|e| e.name == "volume-pvc").unwrap();
        assert_eq!(pvc.family, "volume");
        assert_eq!(pvc.description, "persistent volume claim volume type");
        assert!(pvc.url.is_empty());
    }

    #[test]
    fn json_rows_omit_empty_urls() {
        let registry = Registry::builtin().unwrap();
        let entries = catalogue(&registry).unwrap();
        let json = serde_json::to_value(&entries).unwrap();
        let rows = json.as_array().unwrap();
        let fio = rows.iter().find(|row| row["name"] == "io-fio").unwrap();
        assert_eq!(fio["url"], "https://fio.readthedocs.io/en/latest/fio_doc.html");
        let cm = rows.iter().find(|row| row["name"] == "volume-cm").unwrap();
        assert!(cm.get("url").is_none());
    }
}
