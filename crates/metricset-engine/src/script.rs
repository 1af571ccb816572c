//! Entrypoint script assembly
//!
//! Blocks are rendered from named-field `minijinja` templates. Addons only
//! ever append to `pre`/`post` and wrap `command`, so several addons can stack
//! on the same container. In interactive mode the post block ends with exactly
//! one hold-open directive no matter how many addons tried to add one.

use std::sync::OnceLock;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::k8s::ReplicatedJob;
use crate::metadata::HOLD_OPEN;
use crate::options::OptionBag;
use crate::specs::ContainerSpec;

// =============================================================================
// Templates
// =============================================================================

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env
    })
}

/// Render a script template with named fields
///
/// Undefined fields are an error rather than an empty string.
pub fn render<S: Serialize>(name: &str, source: &str, ctx: S) -> Result<String> {
    environment()
        .render_named_str(name, source, ctx)
        .map_err(|e| EngineError::template(name, e))
}

// =============================================================================
// Block helpers
// =============================================================================

/// Remove trailing hold-open directives; reports whether any were found
pub fn strip_hold_open(block: &str) -> (&str, bool) {
    let mut rest = block.trim_end();
    let mut found = false;
    while let Some(before) = rest.strip_suffix(HOLD_OPEN) {
        if !(before.is_empty() || before.ends_with(char::is_whitespace)) {
            break;
        }
        found = true;
        rest = before.trim_end();
    }
    (rest, found)
}

/// Append `block` to a post block, keeping a single trailing hold-open
pub fn append_post(post: &str, block: &str) -> String {
    let (base, held) = strip_hold_open(post);
    let joined = format!("{base}\n{block}");
    let (body, held_again) = strip_hold_open(&joined);
    if held || held_again {
        format!("{body}\n{HOLD_OPEN}\n")
    } else {
        joined
    }
}

/// Append `block` to a pre block
pub fn append_pre(pre: &str, block: &str) -> String {
    format!("{pre}\n{block}")
}

/// Normalise a post block for the interactive setting
///
/// When interactive, the block ends with exactly one hold-open directive.
/// Otherwise it is returned unchanged.
pub fn finish_post(post: &str, interactive: bool) -> String {
    if !interactive {
        return post.to_string();
    }
    let (body, _) = strip_hold_open(post);
    format!("{body}\n{HOLD_OPEN}\n")
}

/// Wrap a command as `prefix cmd suffix` when either side is set
pub fn wrap_command(command: &str, prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() && suffix.is_empty() {
        command.to_string()
    } else {
        format!("{prefix} {command} {suffix}")
    }
}

// =============================================================================
// Targeting
// =============================================================================

/// Which containers an addon rewrites
///
/// Empty fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Target {
    /// Replicated job name
    pub job: String,
    /// Container name
    pub container: String,
}

impl Target {
    pub fn new(job: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            container: container.into(),
        }
    }

    /// Read `target` and `containerTarget`
    pub fn from_options(options: &OptionBag<'_>) -> Result<Self> {
        Ok(Self {
            job: options.string("target")?.unwrap_or_default(),
            container: options.string("containerTarget")?.unwrap_or_default(),
        })
    }

    /// True when `container` in `job` should be rewritten
    pub fn selects(&self, container: &ContainerSpec, job: &ReplicatedJob) -> bool {
        container.job_name == job.name
            && (self.job.is_empty() || self.job == job.name)
            && (self.container.is_empty() || self.container == container.name)
    }

    /// Apply `rewrite` to every selected container, once each
    pub fn for_each_selected<F>(
        &self,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
        mut rewrite: F,
    ) -> Result<()>
    where
        F: FnMut(&mut ContainerSpec) -> Result<()>,
    {
        for container in containers.iter_mut() {
            if jobs.iter().any(|job| self.selects(container, job)) {
                rewrite(container)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{assemble_replicated_job, JobShape};
    use crate::specs::SetContext;
    use metricset_common::MetricSetSpec;
    use minijinja::context;
    use rstest::rstest;

    #[test]
    fn render_uses_named_fields() {
        let out = render(
            "greeting",
            "cd {{ workdir }}\n{% if extra %}\necho {{ extra }}\n{% endif %}\ndone\n",
            context! { workdir => "/opt", extra => "hi" },
        )
        .unwrap();
        assert_eq!(out, "cd /opt\necho hi\ndone\n");
    }

    #[test]
    fn render_rejects_undefined_fields() {
        let err = render("broken", "{{ missing }}", context! {}).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[rstest]
    #[case::none("echo done", "echo done", false)]
    #[case::single("echo done\nsleep infinity\n", "echo done", true)]
    #[case::stacked("echo done\nsleep infinity\n\nsleep infinity\n", "echo done", true)]
    #[case::only("sleep infinity", "", true)]
    #[case::not_a_directive("xsleep infinity", "xsleep infinity", false)]
    fn strips_hold_open(#[case] input: &str, #[case] body: &str, #[case] found: bool) {
        assert_eq!(strip_hold_open(input), (body, found));
    }

    #[test]
    fn append_post_keeps_one_hold_open() {
        let post = "\necho end\nsleep infinity\n";
        let once = append_post(post, "echo cleanup");
        assert_eq!(once, "\necho end\necho cleanup\nsleep infinity\n");
        let twice = append_post(&once, "echo more\nsleep infinity");
        assert_eq!(twice.matches(HOLD_OPEN).count(), 1);
        assert!(twice.ends_with("echo more\nsleep infinity\n"));
    }

    #[test]
    fn append_post_without_hold_open_is_plain_append() {
        assert_eq!(append_post("echo end", "echo cleanup"), "echo end\necho cleanup");
    }

    #[test]
    fn finish_post_only_touches_interactive() {
        assert_eq!(finish_post("echo end\n", false), "echo end\n");
        assert_eq!(finish_post("echo end\n", true), "echo end\nsleep infinity\n");
        assert_eq!(
            finish_post("echo end\nsleep infinity\nsleep infinity\n", true),
            "echo end\nsleep infinity\n"
        );
    }

    #[rstest]
    #[case::no_wrap("lmp", "", "", "lmp")]
    #[case::prefix("lmp", "time", "", "time lmp ")]
    #[case::both("lmp", "time", "> out.log", "time lmp > out.log")]
    fn wraps_command(
        #[case] command: &str,
        #[case] prefix: &str,
        #[case] suffix: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(wrap_command(command, prefix, suffix), expected);
    }

    #[test]
    fn nested_wrapping_follows_declaration_order() {
        let inner = wrap_command("lmp", "first", "");
        let outer = wrap_command(&inner, "second", "");
        assert_eq!(outer, "second first lmp  ");
    }

    fn jobs() -> Vec<ReplicatedJob> {
        let spec = MetricSetSpec {
            pods: 2,
            ..Default::default()
        };
        let set = SetContext::new("bench", "default", &spec);
        vec![
            assemble_replicated_job(&set, &JobShape::new("l", 1)),
            assemble_replicated_job(&set, &JobShape::new("w", 1)),
        ]
    }

    fn container(job: &str, name: &str) -> ContainerSpec {
        ContainerSpec {
            job_name: job.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::wildcard(Target::default(), vec!["launcher", "workers", "sidecar"])]
    #[case::worker_job(Target::new("w", ""), vec!["workers", "sidecar"])]
    #[case::named_container(Target::new("", "workers"), vec!["workers"])]
    #[case::job_and_container(Target::new("l", "workers"), vec![])]
    #[case::unknown_job(Target::new("x", ""), vec![])]
    fn targeting(#[case] target: Target, #[case] expected: Vec<&str>) {
        let jobs = jobs();
        let mut containers = vec![
            container("l", "launcher"),
            container("w", "workers"),
            container("w", "sidecar"),
            container("other", "orphan"),
        ];
        target
            .for_each_selected(&mut containers, &jobs, |c| {
                c.entrypoint.pre.push_str("touched");
                Ok(())
            })
            .unwrap();
        let touched: Vec<&str> = containers
            .iter()
            .filter(|c| c.entrypoint.pre == "touched")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(touched, expected);
    }
}
