//! Flexible IO Tester against a directory (usually a mounted volume)

use minijinja::context;

use crate::error::{Result, Validation};
use crate::metadata::{self, COLLECTION_END, COLLECTION_START, SEPARATOR};
use crate::options::OptionBag;
use crate::script;
use crate::specs::{ContainerSpec, SetContext};

use super::{single, Metric, MetricCore, MetricFamily, MetricKind};

const IMAGE: &str = "ghcr.io/converged-computing/metric-fio:latest";

const PRE_TEMPLATE: &str = r#"#!/bin/bash

echo "{{ metadata }}"
# Directory (and filename) for test assuming other storage mounts
filename={{ directory }}/test-$(cat /dev/urandom | tr -cd 'a-f0-9' | head -c 32)
command="fio --randrepeat=1 --ioengine=libaio --direct=1 --gtod_reduce=1 --name={{ testname }} --bs={{ blocksize }} --iodepth={{ iodepth }} --readwrite=randrw --rwmixread=75 --size={{ size }} --filename=$filename --output-format=json"
echo "FIO COMMAND START"
echo $command
echo "FIO COMMAND END"
echo "{{ collection_start }}"
echo "{{ separator }}"
"#;

const POST_TEMPLATE: &str = r#"echo "{{ collection_end }}"
rm -rf $filename
{{ interactive }}
"#;

/// `io-fio`
#[derive(Clone, Debug)]
pub struct Fio {
    core: MetricCore,
    testname: String,
    blocksize: String,
    iodepth: i32,
    size: String,
    directory: String,
}

impl Default for Fio {
    fn default() -> Self {
        Self {
            core: MetricCore::new(
                "io-fio",
                "Flexible IO Tester (FIO)",
                MetricFamily::Storage,
                IMAGE,
            )
            .with_url("https://fio.readthedocs.io/en/latest/fio_doc.html"),
            testname: "test".to_string(),
            blocksize: "4k".to_string(),
            iodepth: 64,
            size: "4G".to_string(),
            directory: "/tmp".to_string(),
        }
    }
}

impl Metric for Fio {
    fn core(&self) -> &MetricCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MetricCore {
        &mut self.core
    }

    fn kind(&self) -> MetricKind {
        MetricKind::StorageGeneric
    }

    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        options.assign_string("testname", &mut self.testname)?;
        options.assign_string("blocksize", &mut self.blocksize)?;
        options.assign_string("size", &mut self.size)?;
        options.assign_string("directory", &mut self.directory)?;
        if let Some(iodepth) = options.int("iodepth")? {
            self.iodepth = iodepth;
        }
        Ok(())
    }

    fn validate(&self, _set: &SetContext<'_>) -> Validation {
        Validation::check(self.iodepth > 0, || {
            format!("iodepth must be positive, got {}", self.iodepth)
        })
        .and(|| {
            Validation::check(!self.directory.is_empty(), || {
                "directory cannot be empty".to_string()
            })
        })
    }

    fn prepare_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        let export = metadata::MetricExport {
            storage_volume_path: Some(self.directory.clone()),
            ..self.core.export(set)
        };
        let pre = script::render(
            "fio-pre",
            PRE_TEMPLATE,
            context! {
                metadata => metadata::metric_metadata(&export)?,
                directory => self.directory,
                testname => self.testname,
                blocksize => self.blocksize,
                iodepth => self.iodepth,
                size => self.size,
                collection_start => COLLECTION_START,
                separator => SEPARATOR,
            },
        )?;
        let post = script::render(
            "fio-post",
            POST_TEMPLATE,
            context! {
                collection_end => COLLECTION_END,
                interactive => metadata::interactive(set.interactive()),
            },
        )?;
        Ok(vec![single::container(
            &self.core,
            pre,
            "$command".to_string(),
            post,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricset_common::{MetricDeclaration, MetricSetSpec};

    #[test]
    fn options_flow_into_the_command() {
        let decl = MetricDeclaration::new("io-fio")
            .with_option("size", "1G")
            .with_int_option("iodepth", 8)
            .with_option("directory", "/data");
        let mut metric = Fio::default();
        metric.set_options(&OptionBag::for_metric(&decl)).unwrap();

        let spec = MetricSetSpec::default();
        let set = SetContext::new("io", "default", &spec);
        assert!(metric.validate(&set).is_valid());
        let containers = metric.prepare_containers(&set).unwrap();
        let script = containers[0].entrypoint.render();
        assert!(script.contains("--iodepth=8"));
        assert!(script.contains("--size=1G"));
        assert!(script.contains("--bs=4k"));
        assert!(script.contains("filename=/data/test-"));
        assert!(script.contains("storageVolumePath"));
        assert!(script.find("$command").unwrap() < script.find(COLLECTION_END).unwrap());
        assert!(script.find(COLLECTION_END).unwrap() < script.find("rm -rf $filename").unwrap());
    }

    #[test]
    fn string_iodepth_must_be_numeric() {
        let decl = MetricDeclaration::new("io-fio").with_option("iodepth", "deep");
        let mut metric = Fio::default();
        assert!(metric.set_options(&OptionBag::for_metric(&decl)).is_err());
    }

    #[test]
    fn single_job_topology() {
        let spec = MetricSetSpec {
            pods: 2,
            ..Default::default()
        };
        let set = SetContext::new("io", "default", &spec);
        let jobs = Fio::default().replicated_jobs(&set).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "m");
        assert_eq!(Fio::default().kind(), MetricKind::StorageGeneric);
    }
}
