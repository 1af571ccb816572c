//! Helpers for metrics that run one container in a single replicated job

use crate::k8s::ReplicatedJob;
use crate::specs::{ContainerSpec, EntrypointScript, SetContext};
use crate::topology::{assemble_replicated_job, JobShape, SINGLE_JOB_NAME};

use super::MetricCore;

/// Mount path of a single-job metric's entrypoint
pub fn entrypoint_path(metric: &str) -> String {
    format!("{}{metric}-entrypoint.sh", metricset_common::SCRIPT_MOUNT_PATH)
}

/// The `m` job spanning all pods of the set
pub fn replicated_jobs(set: &SetContext<'_>) -> Vec<ReplicatedJob> {
    vec![assemble_replicated_job(set, &JobShape::single(set))]
}

/// The metric's container in the `m` job, named after the metric
pub fn container(core: &MetricCore, pre: String, command: String, post: String) -> ContainerSpec {
    let script = EntrypointScript::new(entrypoint_path(core.name))
        .with_pre(pre)
        .with_command(command)
        .with_post(post);
    core.container(SINGLE_JOB_NAME, core.name, script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricFamily;
    use metricset_common::MetricSetSpec;

    #[test]
    fn container_is_named_after_metric() {
        let core = MetricCore::new("sys-test", "test", MetricFamily::System, "img");
        let c = container(&core, "pre".into(), "cmd".into(), "post".into());
        assert_eq!(c.job_name, "m");
        assert_eq!(c.name, "sys-test");
        assert_eq!(c.entrypoint.path, "/metrics_operator/sys-test-entrypoint.sh");
        assert_eq!(c.entrypoint.name, "sys-test-entrypoint");
    }

    #[test]
    fn one_job_with_all_pods() {
        let spec = MetricSetSpec {
            pods: 3,
            completions: Some(2),
            ..Default::default()
        };
        let set = SetContext::new("bench", "default", &spec);
        let jobs = replicated_jobs(&set);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].template.spec.parallelism, 3);
        assert_eq!(jobs[0].template.spec.completions, 2);
        assert!(jobs[0].pod_spec().share_process_namespace);
    }
}
