//! Spack view software delivery shared by performance tool addons
//!
//! A sidecar container copies a pre-built spack view into an `emptyDir`
//! volume and touches a marker file when done. The metric's containers wait
//! for the marker, put the view on their `PATH` and then run the tool.

use minijinja::context;

use crate::error::{Result, Validation};
use crate::k8s::ReplicatedJob;
use crate::metadata::{COLLECTION_START, SEPARATOR};
use crate::options::OptionBag;
use crate::script::{self, append_pre, Target};
use crate::specs::{ContainerSpec, EntrypointScript, VolumeSource, VolumeSpec};

/// Default mount point of the shared view
pub const DEFAULT_MOUNT: &str = "/opt/share";

/// Marker file written by the sidecar once the copy completes
pub const DONE_MARKER: &str = "metrics-operator-done.txt";

const COPY_TEMPLATE: &str = r#"#!/bin/bash
# Extra setup (optional) for a spack view
{{ setup }}
echo "Moving content from /opt/view to be in shared volume at {{ mount }}"
view=$(ls /opt/views/._view/)
view="/opt/views/._view/${view}"

# Give a little extra wait time
sleep 10

viewroot="{{ mount }}"
mkdir -p $viewroot/view
# We have to move both of these paths
cp -R ${view}/* $viewroot/view
cp -R /opt/software $viewroot/

# This is a marker to indicate the copy is done
touch $viewroot/{{ done_marker }}

# Sleep forever, the application needs to run and end
echo "Sleeping forever so {{ mount }} can be shared and use for {{ tool }}."
sleep infinity
"#;

const WAIT_TEMPLATE: &str = r#"
echo "{{ metadata }}"
# Ensure the software exists before anything else
wget -q https://github.com/converged-computing/goshare/releases/download/2023-09-06/wait-fs
chmod +x ./wait-fs
mv ./wait-fs /usr/bin/goshare-wait-fs

# Ensure spack view is on the path, wherever it is mounted
viewbase="{{ mount }}"
software="${viewbase}/software"
viewbin="${viewbase}/view/bin"
{% for line in variables %}
{{ line }}
{% endfor %}
# Important to add AFTER in case software in container duplicated
export PATH=$PATH:${viewbin}

# Wait for software directory, and give it time
goshare-wait-fs -p ${software}

# Wait for copy to finish
sleep 10

# Copy mount software to /opt/software
cp -R {{ mount }}/software /opt/software

# Wait for the tool and the marker indicating the copy is done
{% for path in wait_for %}
goshare-wait-fs -p {{ path }}
{% endfor %}
goshare-wait-fs -p ${viewbase}/{{ done_marker }}

# A small extra wait time to be conservative
sleep 5
{% for line in before_start %}
{{ line }}
{% endfor %}
echo "{{ collection_start }}"
echo "{{ separator }}"
{% for line in after_start %}
{{ line }}
{% endfor %}
{% if workdir %}
workdir="{{ workdir }}"
echo "Changing directory to ${workdir}"
cd ${workdir}
{% endif %}
"#;

/// Tool specific lines woven into the shared wait block
#[derive(Clone, Debug, Default)]
pub struct ViewHooks {
    /// Shell variables defined once the view paths are known
    pub variables: Vec<String>,
    /// Paths to wait for besides the done marker
    pub wait_for: Vec<String>,
    /// Lines run right before the collection start sentinel
    pub before_start: Vec<String>,
    /// Lines run right after the separator
    pub after_start: Vec<String>,
}

/// Options and artifacts of one spack view tool
#[derive(Clone, Debug)]
pub struct SpackView {
    /// Tool name: volume, sidecar container and script key
    pub tool: &'static str,
    pub image: String,
    pub mount: String,
    pub workdir: String,
    pub setup: String,
    pub privileged: bool,
    pub target: Target,
}

impl SpackView {
    pub fn new(tool: &'static str, image: impl Into<String>) -> Self {
        Self {
            tool,
            image: image.into(),
            mount: DEFAULT_MOUNT.to_string(),
            workdir: String::new(),
            setup: String::new(),
            privileged: false,
            target: Target::default(),
        }
    }

    pub fn entrypoint_path(&self) -> String {
        format!(
            "{}{}-entrypoint.sh",
            metricset_common::SCRIPT_MOUNT_PATH,
            self.tool
        )
    }

    pub fn set_options(&mut self, options: &OptionBag<'_>) -> Result<()> {
        options.assign_string("image", &mut self.image)?;
        options.assign_string("mount", &mut self.mount)?;
        options.assign_string("workdir", &mut self.workdir)?;
        options.assign_string("setup", &mut self.setup)?;
        options.assign_flag("privileged", &mut self.privileged)?;
        self.target = Target::from_options(options)?;
        Ok(())
    }

    pub fn validate(&self) -> Validation {
        Validation::check(self.mount.starts_with('/'), || {
            format!("{} mount must be an absolute path, got '{}'", self.tool, self.mount)
        })
        .and(|| {
            Validation::check(!self.image.is_empty(), || {
                format!("{} requires an image", self.tool)
            })
        })
    }

    /// The shared view volume
    pub fn volumes(&self) -> Vec<VolumeSpec> {
        vec![VolumeSpec::new(self.tool, VolumeSource::EmptyDir, &self.mount)]
    }

    /// The sidecar that copies the view into the shared volume
    pub fn containers(&self) -> Result<Vec<ContainerSpec>> {
        let copy = script::render(
            "spack-view-copy",
            COPY_TEMPLATE,
            context! {
                setup => self.setup,
                mount => self.mount,
                tool => self.tool,
                done_marker => DONE_MARKER,
            },
        )?;
        let mut container = ContainerSpec {
            name: self.tool.to_string(),
            image: self.image.clone(),
            entrypoint: EntrypointScript::named(self.tool, self.entrypoint_path()).with_pre(copy),
            needs_write: true,
            ..Default::default()
        };
        container.attributes.privileged = self.privileged;
        Ok(vec![container])
    }

    /// Block that waits for the view and starts collection
    pub fn wait_block(&self, metadata: &str, hooks: &ViewHooks) -> Result<String> {
        script::render(
            "spack-view-wait",
            WAIT_TEMPLATE,
            context! {
                metadata,
                mount => self.mount,
                workdir => self.workdir,
                variables => hooks.variables,
                wait_for => hooks.wait_for,
                before_start => hooks.before_start,
                after_start => hooks.after_start,
                done_marker => DONE_MARKER,
                collection_start => COLLECTION_START,
                separator => SEPARATOR,
            },
        )
    }

    /// Append `pre` to every selected container, then apply `rewrite`
    pub fn customize<F>(
        &self,
        pre: &str,
        containers: &mut [ContainerSpec],
        jobs: &[ReplicatedJob],
        mut rewrite: F,
    ) -> Result<()>
    where
        F: FnMut(&mut EntrypointScript),
    {
        self.target.for_each_selected(containers, jobs, |container| {
            container.entrypoint.pre = append_pre(&container.entrypoint.pre, pre);
            rewrite(&mut container.entrypoint);
            Ok(())
        })
    }
}
