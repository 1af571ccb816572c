//! Replicated job shapes, pod labels, host lists and sole tenancy

use std::collections::BTreeMap;

use crate::k8s::{
    Affinity, JobSpec, JobTemplateSpec, LabelSelector, LabelSelectorRequirement, ObjectMeta,
    PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, ReplicatedJob,
};
use crate::specs::SetContext;

/// Job name for single replicated job topologies
pub const SINGLE_JOB_NAME: &str = "m";

/// Launcher job name (also the letter in launcher pod hostnames)
pub const LAUNCHER_JOB_NAME: &str = "l";

/// Worker job name
pub const WORKER_JOB_NAME: &str = "w";

/// Retries before a job is marked failed
pub const BACKOFF_LIMIT: i32 = 100;

/// Pod label marking pods that require a node to themselves
pub const TENANCY_LABEL: &str = "metrics-operator-tenancy";

/// Value of [`TENANCY_LABEL`] for sole tenancy
pub const SOLE_TENANCY: &str = "sole-tenancy";

/// Node topology key used for anti-affinity
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

const INDEXED: &str = "Indexed";

/// Parameters for one replicated job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobShape {
    pub name: String,
    /// Pods running in parallel
    pub pods: i32,
    pub completions: i32,
    /// Force indexed completion even for a single pod
    pub always_indexed: bool,
    pub share_process_namespace: bool,
}

impl JobShape {
    pub fn new(name: impl Into<String>, pods: i32) -> Self {
        Self {
            name: name.into(),
            pods,
            completions: pods,
            always_indexed: false,
            share_process_namespace: false,
        }
    }

    /// The default `m` job spanning every pod of the set
    pub fn single(set: &SetContext<'_>) -> Self {
        Self {
            completions: set.spec.effective_completions(),
            share_process_namespace: true,
            ..Self::new(SINGLE_JOB_NAME, set.spec.pods)
        }
    }

    pub fn indexed(mut self) -> Self {
        self.always_indexed = true;
        self
    }

    fn completion_mode(&self) -> Option<String> {
        (self.always_indexed || self.pods > 1).then(|| INDEXED.to_string())
    }
}

/// Labels put on every pod of the set
pub fn pod_labels(set: &SetContext<'_>) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), set.name.to_string()),
        ("cluster-name".to_string(), set.name.to_string()),
        ("metricset-name".to_string(), set.name.to_string()),
        ("namespace".to_string(), set.namespace.to_string()),
    ])
}

/// Build a replicated job with no containers or volumes yet
pub fn assemble_replicated_job(set: &SetContext<'_>, shape: &JobShape) -> ReplicatedJob {
    let spec = set.spec;
    let pod_meta = ObjectMeta {
        labels: pod_labels(set),
        annotations: spec.pod.annotations.clone(),
        ..ObjectMeta::new(set.name, set.namespace)
    };

    ReplicatedJob {
        name: shape.name.clone(),
        replicas: 1,
        template: JobTemplateSpec {
            metadata: ObjectMeta::new(set.name, set.namespace),
            spec: JobSpec {
                parallelism: shape.pods,
                completions: shape.completions,
                completion_mode: shape.completion_mode(),
                backoff_limit: BACKOFF_LIMIT,
                active_deadline_seconds: spec.deadline_seconds,
                template: PodTemplateSpec {
                    metadata: pod_meta,
                    spec: PodSpec {
                        subdomain: spec.service_name.clone(),
                        restart_policy: "OnFailure".to_string(),
                        set_hostname_as_fqdn: !spec.dont_set_fqdn,
                        share_process_namespace: shape.share_process_namespace,
                        service_account_name: spec.pod.service_account_name.clone(),
                        node_selector: spec.pod.node_selector.clone(),
                        ..Default::default()
                    },
                },
            },
        },
    }
}

/// Stable DNS name of one pod
pub fn host_name(set: &SetContext<'_>, job: &str, index: i32) -> String {
    format!(
        "{}-{}-0-{}.{}.{}.svc.cluster.local",
        set.name, job, index, set.spec.service_name, set.namespace
    )
}

/// Launcher host followed by `pods - 1` worker hosts
pub fn host_list(set: &SetContext<'_>) -> Vec<String> {
    std::iter::once(host_name(set, LAUNCHER_JOB_NAME, 0))
        .chain((0..set.spec.pods - 1).map(|i| host_name(set, WORKER_JOB_NAME, i)))
        .collect()
}

/// Host list as hostfile text, one host per line
pub fn host_file(set: &SetContext<'_>) -> String {
    host_list(set)
        .into_iter()
        .map(|host| host + "\n")
        .collect()
}

/// Require one pod per node for this job
///
/// Idempotent: applying twice leaves a single anti-affinity term.
pub fn apply_sole_tenancy(job: &mut ReplicatedJob) {
    job.pod_labels_mut()
        .insert(TENANCY_LABEL.to_string(), SOLE_TENANCY.to_string());
    job.pod_spec_mut().affinity = Some(Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: vec![PodAffinityTerm {
                label_selector: LabelSelector {
                    match_expressions: vec![LabelSelectorRequirement {
                        key: TENANCY_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: vec![SOLE_TENANCY.to_string()],
                    }],
                },
                topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            }],
        }),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricset_common::MetricSetSpec;
    use rstest::rstest;

    fn spec(pods: i32) -> MetricSetSpec {
        MetricSetSpec {
            pods,
            ..Default::default()
        }
    }

    #[test]
    fn host_list_has_launcher_then_workers() {
        let spec = spec(4);
        let set = SetContext::new("bench", "perf", &spec);
        let hosts = host_list(&set);
        assert_eq!(
            hosts,
            vec![
                "bench-l-0-0.ms.perf.svc.cluster.local",
                "bench-w-0-0.ms.perf.svc.cluster.local",
                "bench-w-0-1.ms.perf.svc.cluster.local",
                "bench-w-0-2.ms.perf.svc.cluster.local",
            ]
        );
        assert_eq!(host_file(&set).lines().count(), 4);
        assert_eq!(host_file(&set), host_file(&set));
    }

    #[test]
    fn job_carries_set_settings() {
        let mut spec = spec(3);
        spec.dont_set_fqdn = true;
        spec.service_name = "svc".to_string();
        spec.pod.service_account_name = Some("runner".to_string());
        spec.pod
            .annotations
            .insert("a".to_string(), "b".to_string());
        let set = SetContext::new("bench", "perf", &spec);
        let job = assemble_replicated_job(&set, &JobShape::single(&set));

        assert_eq!(job.name, "m");
        assert_eq!(job.replicas, 1);
        let job_spec = &job.template.spec;
        assert_eq!(job_spec.parallelism, 3);
        assert_eq!(job_spec.completions, 3);
        assert_eq!(job_spec.backoff_limit, 100);
        assert_eq!(job_spec.active_deadline_seconds, 31_500_000);
        let pod = job.pod_spec();
        assert_eq!(pod.subdomain, "svc");
        assert!(!pod.set_hostname_as_fqdn);
        assert!(pod.share_process_namespace);
        assert_eq!(pod.restart_policy, "OnFailure");
        assert_eq!(pod.service_account_name.as_deref(), Some("runner"));
        let meta = &job.template.spec.template.metadata;
        assert_eq!(meta.labels["metricset-name"], "bench");
        assert_eq!(meta.labels["namespace"], "perf");
        assert_eq!(meta.annotations["a"], "b");
    }

    #[rstest]
    #[case::single_pod(1, false, None)]
    #[case::many_pods(2, false, Some("Indexed"))]
    #[case::forced(1, true, Some("Indexed"))]
    fn completion_mode(#[case] pods: i32, #[case] forced: bool, #[case] mode: Option<&str>) {
        let spec = spec(pods);
        let set = SetContext::new("bench", "default", &spec);
        let mut shape = JobShape::new("m", pods);
        if forced {
            shape = shape.indexed();
        }
        let job = assemble_replicated_job(&set, &shape);
        assert_eq!(job.template.spec.completion_mode.as_deref(), mode);
    }

    #[test]
    fn sole_tenancy_is_idempotent() {
        let spec = spec(2);
        let set = SetContext::new("bench", "default", &spec);
        let mut job = assemble_replicated_job(&set, &JobShape::new("l", 1));
        apply_sole_tenancy(&mut job);
        apply_sole_tenancy(&mut job);
        let anti = job
            .pod_spec()
            .affinity
            .as_ref()
            .and_then(|a| a.pod_anti_affinity.as_ref())
            .unwrap();
        assert_eq!(anti.required_during_scheduling_ignored_during_execution.len(), 1);
        assert_eq!(
            anti.required_during_scheduling_ignored_during_execution[0].topology_key,
            "kubernetes.io/hostname"
        );
        assert_eq!(
            job.template.spec.template.metadata.labels[TENANCY_LABEL],
            "sole-tenancy"
        );
    }
}
