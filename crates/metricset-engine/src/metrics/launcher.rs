//! Launcher/worker topology shared by MPI-style application metrics
//!
//! One launcher pod runs the measured command against a host file listing
//! every pod; worker pods start sshd and block until the launcher finishes.

use minijinja::context;

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata::{self, COLLECTION_END, COLLECTION_START, HOLD_OPEN, SEPARATOR};
use crate::options::OptionBag;
use crate::script;
use crate::specs::{ContainerSpec, EntrypointScript, SetContext};
use crate::topology::{
    assemble_replicated_job, host_list, JobShape, LAUNCHER_JOB_NAME, WORKER_JOB_NAME,
};

use super::MetricCore;

pub const LAUNCHER_SCRIPT: &str = "/metrics_operator/launcher.sh";
pub const WORKER_SCRIPT: &str = "/metrics_operator/worker.sh";
pub const LAUNCHER_CONTAINER: &str = "launcher";
pub const WORKER_CONTAINER: &str = "workers";

const PREFIX_TEMPLATE: &str = r#"#!/bin/bash
# Start ssh daemon
/usr/sbin/sshd -D &
echo "{{ metadata }}"
{% if workdir %}
# Change directory to where we will run (and write hostfile)
cd {{ workdir }}
{% endif %}
# Write the hosts file
cat <<EOF > ./hostlist.txt
{{ hosts }}
EOF
{% if problem %}
# Write the command file
cat <<EOF > ./problem.sh
#!/bin/bash
{{ problem }}
EOF
chmod +x ./problem.sh
{% endif %}
{% if setup %}
{{ setup }}
{% endif %}

# Allow network to ready
echo "Sleeping for 10 seconds waiting for network..."
sleep 10
echo "{{ collection_start }}"
"#;

const LAUNCHER_PRE_TEMPLATE: &str = r#"{{ prefix }}
echo "{{ separator }}"
"#;

const LAUNCHER_POST_TEMPLATE: &str = r#"
echo "{{ collection_end }}"
{{ interactive }}
"#;

/// Launcher job with one pod, then the worker job with `pods - 1`
pub fn replicated_jobs(set: &SetContext<'_>) -> Vec<ReplicatedJob> {
    let mut jobs = vec![assemble_replicated_job(
        set,
        &JobShape::new(LAUNCHER_JOB_NAME, 1).indexed(),
    )];
    let workers = set.spec.pods - 1;
    if workers > 0 {
        jobs.push(assemble_replicated_job(
            set,
            &JobShape::new(WORKER_JOB_NAME, workers).indexed(),
        ));
    }
    jobs
}

/// Options and behaviour common to launcher/worker metrics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LauncherWorker {
    /// Command the launcher runs
    pub command: String,
    pub sole_tenancy: bool,
    /// Also write the command to `./problem.sh` before the run
    pub write_problem: bool,
    /// Shell run on every pod once the host list exists
    pub setup: String,
}

impl LauncherWorker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Resolve `command`, `workdir` and `soleTenancy`
    pub fn set_options(&mut self, core: &mut MetricCore, options: &OptionBag<'_>) -> Result<()> {
        options.assign_string("command", &mut self.command)?;
        options.assign_string("workdir", &mut core.workdir)?;
        options.assign_flag("soleTenancy", &mut self.sole_tenancy)?;
        Ok(())
    }

    pub fn validate(&self, core: &MetricCore, set: &SetContext<'_>) -> Validation {
        Validation::check(set.spec.pods >= 2, || {
            format!(
                "pods for a launcher/worker app must be >= 2, got {}",
                set.spec.pods
            )
        })
        .and(|| {
            Validation::check(!self.command.trim().is_empty(), || {
                format!("{} requires a command", core.name)
            })
        })
    }

    fn common_prefix(&self, core: &MetricCore, set: &SetContext<'_>) -> Result<String> {
        let metadata = metadata::metric_metadata(&core.export(set))?;
        let problem = if self.write_problem {
            self.command.as_str()
        } else {
            ""
        };
        script::render(
            "launcher-worker-prefix",
            PREFIX_TEMPLATE,
            context! {
                metadata,
                workdir => core.workdir,
                hosts => host_list(set).join("\n"),
                problem,
                setup => self.setup,
                collection_start => COLLECTION_START,
            },
        )
    }

    /// Launcher and worker containers with their entrypoints
    pub fn prepare_containers(
        &self,
        core: &MetricCore,
        set: &SetContext<'_>,
    ) -> Result<Vec<ContainerSpec>> {
        let prefix = self.common_prefix(core, set)?;
        let interactive = metadata::interactive(set.interactive());

        let launcher = EntrypointScript::new(LAUNCHER_SCRIPT)
            .with_pre(script::render(
                "launcher-pre",
                LAUNCHER_PRE_TEMPLATE,
                context! { prefix => &prefix, separator => SEPARATOR },
            )?)
            .with_command(self.command.clone())
            .with_post(script::render(
                "launcher-post",
                LAUNCHER_POST_TEMPLATE,
                context! { collection_end => COLLECTION_END, interactive },
            )?);

        let worker = EntrypointScript::new(WORKER_SCRIPT)
            .with_pre(prefix)
            .with_command(HOLD_OPEN)
            .with_post(interactive);

        Ok(vec![
            core.container(LAUNCHER_JOB_NAME, LAUNCHER_CONTAINER, launcher),
            core.container(WORKER_JOB_NAME, WORKER_CONTAINER, worker),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricFamily;
    use metricset_common::{MetricDeclaration, MetricSetSpec};

    fn core() -> MetricCore {
        MetricCore::new("app-test", "test app", MetricFamily::ProxyApp, "app:latest")
            .with_workdir("/opt/app")
    }

    fn spec(pods: i32) -> MetricSetSpec {
        MetricSetSpec {
            pods,
            ..Default::default()
        }
    }

    #[test]
    fn options_override_defaults() {
        let mut core = core();
        let mut lw = LauncherWorker::new("default");
        let decl = MetricDeclaration::new("app-test")
            .with_option("command", "mpirun app")
            .with_option("workdir", "/work")
            .with_option("soleTenancy", "yes");
        lw.set_options(&mut core, &OptionBag::for_metric(&decl))
            .unwrap();
        assert_eq!(lw.command, "mpirun app");
        assert_eq!(core.workdir, "/work");
        assert!(lw.sole_tenancy);
    }

    #[test]
    fn requires_two_pods() {
        let lw = LauncherWorker::new("run");
        let one = spec(1);
        let set = SetContext::new("bench", "default", &one);
        assert!(!lw.validate(&core(), &set).is_valid());
        let two = spec(2);
        let set = SetContext::new("bench", "default", &two);
        assert!(lw.validate(&core(), &set).is_valid());
    }

    #[test]
    fn requires_a_command() {
        let lw = LauncherWorker::new("  ");
        let spec = spec(2);
        let set = SetContext::new("bench", "default", &spec);
        assert_eq!(
            lw.validate(&core(), &set),
            Validation::invalid("app-test requires a command")
        );
    }

    #[test]
    fn jobs_split_launcher_and_workers() {
        let spec = spec(4);
        let set = SetContext::new("bench", "default", &spec);
        let jobs = replicated_jobs(&set);
        let shape: Vec<(&str, i32)> = jobs
            .iter()
            .map(|j| (j.name.as_str(), j.template.spec.parallelism))
            .collect();
        assert_eq!(shape, vec![("l", 1), ("w", 3)]);
        assert!(jobs
            .iter()
            .all(|j| j.template.spec.completion_mode.as_deref() == Some("Indexed")));
    }

    #[test]
    fn launcher_script_has_hosts_and_sentinels_in_order() {
        let spec = spec(3);
        let set = SetContext::new("bench", "default", &spec);
        let containers = LauncherWorker::new("mpirun app")
            .prepare_containers(&core(), &set)
            .unwrap();
        let launcher = containers[0].entrypoint.render();

        let hosts = "cat <<EOF > ./hostlist.txt\n\
            bench-l-0-0.ms.default.svc.cluster.local\n\
            bench-w-0-0.ms.default.svc.cluster.local\n\
            bench-w-0-1.ms.default.svc.cluster.local\n\
            EOF\n";
        assert!(launcher.contains(hosts), "{launcher}");
        assert!(launcher.starts_with("#!/bin/bash\n"));
        assert!(launcher.contains("cd /opt/app\n"));
        assert!(!launcher.contains("problem.sh"));

        let order = [
            "METADATA START",
            COLLECTION_START,
            SEPARATOR,
            "mpirun app",
            COLLECTION_END,
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| launcher.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{launcher}");
    }

    #[test]
    fn worker_blocks_and_problem_file_is_optional() {
        let spec = spec(2);
        let set = SetContext::new("bench", "default", &spec);
        let lw = LauncherWorker {
            write_problem: true,
            ..LauncherWorker::new("./run.sh --size 4")
        };
        let containers = lw.prepare_containers(&core(), &set).unwrap();
        let worker = &containers[1];
        assert_eq!(worker.job_name, "w");
        assert_eq!(worker.name, "workers");
        assert_eq!(worker.entrypoint.command, HOLD_OPEN);
        assert_eq!(worker.entrypoint.path, WORKER_SCRIPT);
        assert!(worker.entrypoint.pre.contains(
            "cat <<EOF > ./problem.sh\n#!/bin/bash\n./run.sh --size 4\nEOF\nchmod +x ./problem.sh\n"
        ));
    }

    #[test]
    fn interactive_adds_hold_open_to_launcher_post() {
        let mut spec = spec(2);
        spec.logging.interactive = true;
        let set = SetContext::new("bench", "default", &spec);
        let containers = LauncherWorker::new("run")
            .prepare_containers(&core(), &set)
            .unwrap();
        assert!(containers[0].entrypoint.post.ends_with("sleep infinity\n"));
    }
}
