use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::workflow::paths::RemotePaths;

/// Flags the script always sets itself, dropped from caller-supplied flags
pub const RESERVED_FLAGS: [&str; 3] = ["--skip_bids_validation", "--fs-license-file", "--anat-only"];

/// FMRIPrep container on the cluster
static SINGULARITY_IMAGE: &str = "/scratch/mri/singularityimages/fmriprep_24.1.1.sif";

/// Shared TemplateFlow cache so templates aren't downloaded for every job
static TEMPLATEFLOW_HOME: &str = "/scratch/mri/.cache/templateflow";

/// A JobPath is the path to a rendered job script that's uploaded and submitted via sbatch
pub struct JobPath {
    pub path: PathBuf,
}

/// Caller options that change the rendered script
pub struct JobScript<'a> {
    pub anat_only: bool,
    pub flags: &'a str,
}

impl JobScript<'_> {
    /// Render the script for this workflow and write it to `<dir>/<workflow id>.slurm`
    ///
    /// An existing script with the same name is overwritten.
    pub fn create(&self, paths: &RemotePaths, dir: &Path) -> Result<JobPath> {
        let content = self.render(paths)?;
        let path = dir.join(paths.script_name());
        fs::write(&path, content).with_context(|| format!("Can't write job script {}", path.display()))?;
        info!("File '{}' has been created", path.display());
        Ok(JobPath { path })
    }

    /// Render the complete submission script using TinyTemplate
    pub fn render(&self, paths: &RemotePaths) -> Result<String> {
        /// included submission script template
        static SCRIPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/fmriprep.slurm"));
        let mut tt = TinyTemplate::new();
        // flags and paths are shell text, not HTML
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template("script", SCRIPT).context("Template")?;

        let context = ScriptContext {
            workflow_id: paths.workflow_id().to_string(),
            time_now: Utc::now().to_string(),
            image: SINGULARITY_IMAGE.to_string(),
            templateflow_home: TEMPLATEFLOW_HOME.to_string(),
            license: paths.license(),
            workspace: paths.workspace(),
            input_dir: paths.input(),
            freesurfer_dir: paths.freesurfer_output(),
            fmriprep_dir: paths.fmriprep_output(),
            trailing_flags: self.trailing_flags(),
        };

        tt.render("script", &context).context("Rendered job script")
    }

    /// `--anat-only` when requested, followed by the caller's flags minus reserved ones
    fn trailing_flags(&self) -> String {
        let mut flags: Vec<&str> = Vec::new();
        if self.anat_only {
            flags.push("--anat-only");
        }
        flags.extend(filter_flags(self.flags));
        flags.join(" ")
    }
}

/// Rendering context for the submission script
#[derive(Serialize)]
struct ScriptContext {
    workflow_id: String,
    time_now: String,
    image: String,
    templateflow_home: String,
    license: String,
    workspace: String,
    input_dir: String,
    freesurfer_dir: String,
    fmriprep_dir: String,
    trailing_flags: String,
}

/// Split free-form flags on whitespace and drop reserved ones
///
/// A reserved flag is matched on its name, so `--fs-license-file=/x` is dropped too. A bare
/// `--fs-license-file` also takes its following value with it.
pub fn filter_flags(flags: &str) -> Vec<&str> {
    let mut kept = Vec::new();
    let mut tokens = flags.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        let name = token.split('=').next().unwrap_or(token);
        if !RESERVED_FLAGS.contains(&name) {
            kept.push(token);
            continue;
        }
        if token == "--fs-license-file" {
            // skip the detached value, if there is one
            tokens.next_if(|value| !value.starts_with('-'));
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> RemotePaths {
        RemotePaths::new("mri", "wf-3")
    }

    /// The line after `--no-submm-recon \` holds the optional flags
    fn trailing_line(script: &str) -> &str {
        let mut lines = script.lines().skip_while(|l| !l.contains("--no-submm-recon"));
        lines.next();
        lines.next().unwrap_or_default().trim()
    }

    #[test]
    fn reserved_flags_are_stripped() {
        assert_eq!(filter_flags("--anat-only --verbose --fs-license-file=/x"), vec!["--verbose"]);
        assert_eq!(filter_flags("--skip_bids_validation --low-mem"), vec!["--low-mem"]);
        assert_eq!(filter_flags("--fs-license-file /x --low-mem"), vec!["--low-mem"]);
        assert!(filter_flags("").is_empty());
    }

    #[test]
    fn unreserved_flags_are_untouched() {
        assert_eq!(
            filter_flags("--output-spaces MNI152NLin2009cAsym:res-2 -vv"),
            vec!["--output-spaces", "MNI152NLin2009cAsym:res-2", "-vv"]
        );
    }

    #[test]
    fn script_trailing_section_keeps_only_extra_flags() {
        let job = JobScript { anat_only: false, flags: "--anat-only --verbose --fs-license-file=/x" };
        let script = job.render(&paths()).unwrap();
        assert_eq!(trailing_line(&script), "--verbose");
    }

    #[test]
    fn anat_only_is_set_once() {
        let job = JobScript { anat_only: true, flags: "--anat-only" };
        let script = job.render(&paths()).unwrap();
        assert_eq!(trailing_line(&script), "--anat-only");
        assert_eq!(script.matches("--anat-only").count(), 1);
    }

    #[test]
    fn script_points_at_workspace() {
        let job = JobScript { anat_only: false, flags: "" };
        let script = job.render(&paths()).unwrap();
        assert!(script.starts_with("#!/bin/bash -l"));
        assert!(script.contains("#SBATCH -o slurm-wf-3.out"));
        assert!(script.contains("#SBATCH -e slurm-wf-3.err"));
        assert!(script.contains("export SINGULARITYENV_FS_LICENSE='/scratch/mri/wf-3/license.txt'"));
        assert!(script.contains("INPUT_DIR='/scratch/mri/wf-3/input'"));
        assert!(script.contains("SINGULARITY_IMG=/scratch/mri/singularityimages/fmriprep_24.1.1.sif"));
        assert!(script.contains("\"$INPUT_DIR\":/data:ro"));
        assert_eq!(trailing_line(&script), "");
    }

    #[test]
    fn create_writes_named_script() {
        let tmp = tempfile::tempdir().unwrap();
        let job = JobScript { anat_only: false, flags: "--verbose" };
        let written = job.create(&paths(), tmp.path()).unwrap();
        assert_eq!(written.path, tmp.path().join("wf-3.slurm"));
        let content = fs::read_to_string(&written.path).unwrap();
        assert_eq!(trailing_line(&content), "--verbose");
    }
}
