//! OSU MPI micro-benchmarks run from a launcher across worker pods
//!
//! Point-to-point and one-sided benchmarks run on exactly two pods using the
//! first two lines of the host list; collective and startup benchmarks use
//! every pod and `$np` ranks.

use minijinja::context;
use tracing::warn;

use crate::error::{Result, Validation};
use crate::metadata::SEPARATOR;
use crate::options::OptionBag;
use crate::script;
use crate::specs::{ContainerSpec, SetContext};

use super::{LauncherWorker, Metric, MetricCore, MetricFamily, MetricKind};

const IMAGE: &str = "ghcr.io/converged-computing/metric-osu-benchmark:latest";

const BUILD_DIR: &str = "/opt/osu-benchmark/build.openmpi/libexec/osu-micro-benchmarks/mpi";

const HOSTFILE: &str = "./hostlist.txt";
const PAIRS_HOSTFILE: &str = "./hostlist-pairs.txt";
const PAIR_FLAGS: &str = "-np 2 -map-by ppr:1:node";
const ALL_FLAGS: &str = "-np $np -map-by ppr:$tasks:node -rank-by core";

const SETUP_TEMPLATE: &str = r#"# Ranks default to nproc on every pod
np={{ tasks }}
pods={{ pods }}
tasks=$(nproc)
if [[ $np -eq 0 ]]; then
    np=$(( $pods*$tasks ))
fi
echo "Number of tasks (nproc on one node) is $tasks"
echo "Number of tasks total (across $pods nodes) is $np"
head -2 {{ hostfile }} > {{ pairs }}"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Suite {
    OneSided,
    PointToPoint,
    Collective,
    Startup,
}

impl Suite {
    fn dir(self) -> &'static str {
        match self {
            Self::OneSided => "one-sided",
            Self::PointToPoint => "pt2pt",
            Self::Collective => "collective",
            Self::Startup => "startup",
        }
    }
}

/// One runnable benchmark binary
#[derive(Clone, Copy, Debug)]
struct Benchmark {
    name: &'static str,
    suite: Suite,
    /// Runs on exactly two pods
    pairs: bool,
}

const fn pair(name: &'static str, suite: Suite) -> Benchmark {
    Benchmark {
        name,
        suite,
        pairs: true,
    }
}

const fn all(name: &'static str, suite: Suite) -> Benchmark {
    Benchmark {
        name,
        suite,
        pairs: false,
    }
}

const BENCHMARKS: &[Benchmark] = &[
    pair("osu_get_acc_latency", Suite::OneSided),
    pair("osu_acc_latency", Suite::OneSided),
    pair("osu_fop_latency", Suite::OneSided),
    pair("osu_get_latency", Suite::OneSided),
    pair("osu_put_latency", Suite::OneSided),
    pair("osu_cas_latency", Suite::OneSided),
    pair("osu_get_bw", Suite::OneSided),
    pair("osu_put_bibw", Suite::OneSided),
    pair("osu_put_bw", Suite::OneSided),
    all("osu_allreduce", Suite::Collective),
    all("osu_allgather", Suite::Collective),
    all("osu_allgatherv", Suite::Collective),
    all("osu_alltoall", Suite::Collective),
    all("osu_alltoallv", Suite::Collective),
    all("osu_barrier", Suite::Collective),
    all("osu_bcast", Suite::Collective),
    all("osu_gather", Suite::Collective),
    all("osu_gatherv", Suite::Collective),
    all("osu_iallgather", Suite::Collective),
    all("osu_iallgatherv", Suite::Collective),
    all("osu_iallreduce", Suite::Collective),
    all("osu_ialltoall", Suite::Collective),
    all("osu_ialltoallv", Suite::Collective),
    all("osu_ialltoallw", Suite::Collective),
    all("osu_ibarrier", Suite::Collective),
    all("osu_ibcast", Suite::Collective),
    all("osu_igather", Suite::Collective),
    all("osu_igatherv", Suite::Collective),
    all("osu_ireduce", Suite::Collective),
    all("osu_iscatter", Suite::Collective),
    all("osu_iscatterv", Suite::Collective),
    all("osu_reduce", Suite::Collective),
    all("osu_reduce_scatter", Suite::Collective),
    all("osu_scatter", Suite::Collective),
    all("osu_scatterv", Suite::Collective),
    pair("osu_latency", Suite::PointToPoint),
    pair("osu_bibw", Suite::PointToPoint),
    pair("osu_bw", Suite::PointToPoint),
    pair("osu_latency_mp", Suite::PointToPoint),
    pair("osu_latency_mt", Suite::PointToPoint),
    all("osu_mbw_mr", Suite::PointToPoint),
    all("osu_multi_lat", Suite::PointToPoint),
    all("osu_hello", Suite::Startup),
    all("osu_init", Suite::Startup),
];

/// Run when no `commands` are listed
const DEFAULTS: &[&str] = &[
    "osu_get_acc_latency",
    "osu_acc_latency",
    "osu_fop_latency",
    "osu_get_latency",
    "osu_put_latency",
    "osu_allreduce",
    "osu_latency",
    "osu_bibw",
    "osu_bw",
];

fn lookup(name: &str) -> Option<Benchmark> {
    BENCHMARKS.iter().copied().find(|b| b.name == name)
}

/// `network-osu-benchmark`
#[derive(Clone, Debug)]
pub struct OsuBenchmark {
    core: MetricCore,
    benchmarks: Vec<Benchmark>,
    /// Total ranks for collective runs; 0 means pods times nproc
    tasks: i32,
    /// Overrides the per-benchmark mpirun flags
    flags: String,
    timed: bool,
    sole_tenancy: bool,
}

impl Default for OsuBenchmark {
    fn default() -> Self {
        Self {
            core: MetricCore::new(
                "network-osu-benchmark",
                "point to point MPI benchmarks",
                MetricFamily::Network,
                IMAGE,
            )
            .with_url("https://mvapich.cse.ohio-state.edu/benchmarks/"),
            benchmarks: Vec::new(),
            tasks: 0,
            flags: String::new(),
            timed: false,
            sole_tenancy: true,
        }
    }
}

impl OsuBenchmark {
    fn add(&mut self, benchmark: Benchmark) {
        if !self.benchmarks.iter().any(|b| b.name == benchmark.name) {
            self.benchmarks.push(benchmark);
        }
    }

    /// One mpirun line per selected benchmark
    fn runs(&self) -> Vec<String> {
        let mpirun = if self.timed { "time mpirun" } else { "mpirun" };
        self.benchmarks
            .iter()
            .map(|b| {
                let (hostfile, default_flags) = if b.pairs {
                    (PAIRS_HOSTFILE, PAIR_FLAGS)
                } else {
                    (HOSTFILE, ALL_FLAGS)
                };
                let flags = if self.flags.is_empty() {
                    default_flags
                } else {
                    self.flags.as_str()
                };
                format!(
                    "{mpirun} --hostfile {hostfile} --allow-run-as-root {flags} {BUILD_DIR}/{}/{}",
                    b.suite.dir(),
                    b.name
                )
            })
            .collect()
    }

    /// Every run echoed then executed, with a separator between runs
    fn command(&self) -> String {
        self.runs()
            .iter()
            .map(|line| format!("echo \"{line}\"\n{line}"))
            .collect::<Vec<_>>()
            .join(&format!("\necho \"{SEPARATOR}\"\n"))
    }

    fn launcher(&self, set: &SetContext<'_>) -> Result<LauncherWorker> {
        let setup = script::render(
            "osu-setup",
            SETUP_TEMPLATE,
            context! {
                tasks => self.tasks,
                pods => set.spec.pods,
                hostfile => HOSTFILE,
                pairs => PAIRS_HOSTFILE,
            },
        )?;
        Ok(LauncherWorker {
            setup,
            sole_tenancy: self.sole_tenancy,
            ..LauncherWorker::new(self.command())
        })
    }
}

impl Metric for OsuBenchmark {
    fn core(&self) -> &MetricCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MetricCore {
        &mut self.core
    }

    fn kind(&self) -> MetricKind {
        MetricKind::LauncherWorker
    }

    fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        for name in options.list("commands")?.unwrap_or_default() {
            match lookup(&name) {
                Some(benchmark) => self.add(benchmark),
                None => warn!(metric = %self.core.name, benchmark = %name, "skipping unknown benchmark"),
            }
        }
        if self.benchmarks.is_empty() {
            DEFAULTS.iter().filter_map(|name| lookup(name)).for_each(|b| self.add(b));
        }
        if options.flag("all")?.unwrap_or(false) {
            BENCHMARKS.iter().for_each(|b| self.add(*b));
        }
        if let Some(tasks) = options.int("tasks")? {
            self.tasks = tasks;
        }
        options.assign_string("flags", &mut self.flags)?;
        options.assign_flag("timed", &mut self.timed)?;
        options.assign_flag("soleTenancy", &mut self.sole_tenancy)?;
        Ok(())
    }

    fn validate(&self, set: &SetContext<'_>) -> Validation {
        Validation::check(!self.benchmarks.is_empty(), || {
            "network-osu-benchmark requires at least one command".to_string()
        })
        .and(|| {
            Validation::check(self.tasks >= 0, || {
                format!("tasks cannot be negative, got {}", self.tasks)
            })
        })
        .and(|| LauncherWorker::new(self.command()).validate(&self.core, set))
    }

    fn prepare_containers(&self, set: &SetContext<'_>) -> Result<Vec<ContainerSpec>> {
        self.launcher(set)?.prepare_containers(&self.core, set)
    }

    fn sole_tenancy(&self) -> bool {
        self.sole_tenancy
    }
}
