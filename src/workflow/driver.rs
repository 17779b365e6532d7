use std::fs;
use std::path::Path;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::discovery::ResourceDiscovery;
use crate::remote::{Connector, Transfer};
use crate::retry::retry_forever;
use crate::slurm::client::{Completion, Slurm};
use crate::slurm::job::JobScript;
use crate::workflow::context::{WorkflowContext, WorkflowIdentity};
use crate::workflow::quota::{parse_scratch_usage, QUOTA_COMMAND};
use crate::workflow::{Step, PIPELINE};

static SEPARATOR: &str = "_________________________________________________________\n";

/// Conditions that end the run immediately instead of being retried
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("could not fetch the /scratch space info")]
    ScratchUsageUnknown,
    #[error("/scratch space is full ({0}% used)")]
    ScratchFull(u32),
}

/// Drives one FMRIPrep job through the cluster
pub struct Workflow<'a> {
    config: &'a Config,
    connector: &'a dyn Connector,
    transfer: &'a dyn Transfer,
    discovery: &'a dyn ResourceDiscovery,
    slurm: Slurm,
    ctx: WorkflowContext,
}

impl<'a> Workflow<'a> {
    pub fn new(
        config: &'a Config,
        connector: &'a dyn Connector,
        transfer: &'a dyn Transfer,
        discovery: &'a dyn ResourceDiscovery,
    ) -> Self {
        let identity = WorkflowIdentity {
            workflow_id: config.workflow_id.clone(),
            username: config.cluster.username.clone(),
            hostname: config.cluster.hostname.clone(),
            port: config.cluster.port,
        };
        Workflow {
            config,
            connector,
            transfer,
            discovery,
            slurm: Slurm::new(&config.cluster.slurm_bin),
            ctx: WorkflowContext::new(identity),
        }
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    /// Run every step in order and report how the job ended
    ///
    /// Blocks until the job has left the queue and cleanup has finished. Only a full or unreadable
    /// scratch quota returns early.
    pub fn run(&mut self) -> Result<Completion, WorkflowError> {
        info!("Starting workflow {}", self.ctx.identity.workflow_id);
        for step in PIPELINE {
            info!("Executing step: {step}");
            self.execute(step)?;
        }
        info!("Workflow {} finished: {}", self.ctx.identity.workflow_id, self.ctx.completion);
        Ok(self.ctx.completion)
    }

    fn execute(&mut self, step: Step) -> Result<(), WorkflowError> {
        let delay = self.config.timing.retry_delay;
        match step {
            Step::Discover => retry_forever(delay, || self.discover()),
            Step::Connect => retry_forever(delay, || self.connect()),
            Step::CheckQuota => return self.check_quota(),
            Step::CreateWorkspace => retry_forever(delay, || self.create_workspace()),
            Step::StageInput => retry_forever(delay, || self.stage_input()),
            Step::StageLicense => retry_forever(delay, || self.stage_license()),
            Step::WriteSubmitScript => retry_forever(delay, || self.write_submit_script()),
            Step::UploadScript => retry_forever(delay, || self.upload_script()),
            Step::Submit => retry_forever(delay, || self.submit()),
            Step::PollUntilDone => retry_forever(delay, || self.poll_until_done()),
            Step::FetchResults => retry_forever(delay, || self.fetch_results()),
            Step::Cleanup => {
                retry_forever(delay, || self.remove_artifacts());
                // closing is attempted once, never retried
                self.close_session();
            }
        }
        Ok(())
    }

    fn discover(&mut self) -> Result<()> {
        let job = &self.config.job;
        let found = self.discovery.find_auxiliary_resources(job.project_id.as_deref(), &job.session_label);
        info!("Auxiliary freesurfer resources found: {found}");
        self.ctx.resource_found = found;
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        let session = self.connector.connect().context("Connecting to cluster")?;
        self.ctx.attach_session(session)
    }

    /// Stop the run if scratch is full or its usage can't be read
    ///
    /// Running `myquota` is retried like any other command, the verdict on its output is not.
    fn check_quota(&mut self) -> Result<(), WorkflowError> {
        let delay = self.config.timing.retry_delay;
        let usage = retry_forever(delay, || self.scratch_usage());

        let fatal = match usage {
            Some(used) if used < 100 => {
                info!("/scratch has enough space ({used}% used), proceeding");
                return Ok(());
            }
            Some(used) => WorkflowError::ScratchFull(used),
            None => WorkflowError::ScratchUsageUnknown,
        };

        error!("{fatal}, exiting");
        self.close_session();
        Err(fatal)
    }

    fn scratch_usage(&mut self) -> Result<Option<u32>> {
        let output = self.ctx.session()?.exec(QUOTA_COMMAND).context("Running myquota")?;
        Ok(parse_scratch_usage(&output.stdout))
    }

    /// Recreate an empty workspace, removing whatever an earlier run with this id left behind
    fn create_workspace(&mut self) -> Result<()> {
        let paths = self.ctx.paths();
        let workspace = paths.workspace();
        let session = self.ctx.session()?;

        let check = session.exec(&format!("test -d {workspace} && echo 'exists'"))?;
        if check.stdout.trim() == "exists" {
            session.exec(&format!("rm -rf {workspace}"))?;
            info!("Removed existing directory {workspace}");
        }

        let created = session.exec(&format!("mkdir -p {}", paths.input()))?;
        if !created.success() {
            bail!("Can't create {}: {}", paths.input(), created.stderr.trim());
        }
        info!("Created directory {}", paths.input());
        Ok(())
    }

    fn stage_input(&mut self) -> Result<()> {
        let paths = self.ctx.paths();
        let local = &self.config.local;
        self.transfer.send(&local.input_dir, &paths.workspace())?;
        if self.ctx.resource_found {
            self.transfer.send(&local.freesurfer_staging(), &paths.input_contents())?;
        }
        Ok(())
    }

    fn stage_license(&mut self) -> Result<()> {
        let paths = self.ctx.paths();
        self.transfer.send(&self.config.local.license, &paths.license())
    }

    fn write_submit_script(&mut self) -> Result<()> {
        let paths = self.ctx.paths();
        let job = JobScript { anat_only: self.config.job.anat_only, flags: &self.config.job.flags };
        self.ctx.script = Some(job.create(&paths, &self.config.local.script_dir)?);
        Ok(())
    }

    fn upload_script(&mut self) -> Result<()> {
        let home = self.ctx.paths().home();
        let script = self.ctx.script.as_ref().ok_or_else(|| anyhow!("No job script to upload"))?;
        self.transfer.send(&script.path, &home)
    }

    fn submit(&mut self) -> Result<()> {
        let script = self.ctx.paths().script();
        let job_id = self
            .slurm
            .submit(self.ctx.session()?, &script)?
            .ok_or_else(|| anyhow!("sbatch did not return a job id"))?;
        info!("SLURM job id: {job_id}");
        self.ctx.job_id = Some(job_id);
        Ok(())
    }

    /// Block until the job is no longer listed by squeue, there is no upper bound
    fn poll_until_done(&mut self) -> Result<()> {
        let job_id = self.ctx.job_id.ok_or_else(|| anyhow!("No job id to wait for"))?;
        let interval = self.config.timing.poll_interval;
        while self.slurm.is_still_queued(self.ctx.session()?, job_id)? {
            debug!("Job {job_id} still queued, checking again in {} seconds", interval.as_secs());
            thread::sleep(interval);
        }
        info!("Job {job_id} has left the queue");
        Ok(())
    }

    /// Fetch the job logs, classify the outcome and, on success, the result trees
    fn fetch_results(&mut self) -> Result<()> {
        let job_id = self.ctx.job_id.ok_or_else(|| anyhow!("No job id to fetch results for"))?;
        let paths = self.ctx.paths();
        let local = &self.config.local;

        self.transfer.fetch(&paths.stdout(), &local.log_dir)?;
        self.transfer.fetch(&paths.stderr(), &local.log_dir)?;

        let completion = self.slurm.has_finished_successfully(self.ctx.session()?, job_id)?;
        self.ctx.completion = completion;

        println!("{SEPARATOR}");
        print_log(&local.log_dir.join(paths.stdout_name()));

        if completion == Completion::Succeeded {
            self.transfer.fetch(&format!("{}/*", paths.fmriprep_output()), &local.fmriprep_out)?;
            self.transfer.fetch(&format!("{}/*", paths.freesurfer_output()), &local.freesurfer_out)?;
        } else {
            println!("{SEPARATOR}");
            print_log(&local.log_dir.join(paths.stderr_name()));
            println!("{SEPARATOR}");
        }
        Ok(())
    }

    /// Delete the workspace, script and job logs from the cluster
    fn remove_artifacts(&mut self) -> Result<()> {
        for path in self.ctx.paths().artifacts() {
            self.delete(&path)?;
        }
        Ok(())
    }

    /// Remove a remote directory tree or file, whichever `path` is
    fn delete(&mut self, path: &str) -> Result<()> {
        let session = self.ctx.session()?;
        let kind = session.exec(&format!("[ -d {path} ] && echo 'directory' || echo 'file'"))?;
        match kind.stdout.trim() {
            "directory" => {
                session.exec(&format!("rm -rf {path}"))?;
                info!("Removed directory {path}");
            }
            "file" => {
                session.exec(&format!("rm -f {path}"))?;
                info!("Removed file {path}");
            }
            other => warn!("Path {path} is neither a directory nor a file ({other:?}), nothing to delete"),
        }
        Ok(())
    }

    fn close_session(&mut self) {
        match self.ctx.close_session() {
            Some(Ok(())) => info!("Connection to {} closed", self.ctx.identity.hostname),
            Some(Err(err)) => warn!("Closing the connection failed: {err:#}"),
            None => warn!("No open connection to close"),
        }
    }
}

/// Print a fetched log file verbatim
fn print_log(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => print!("{content}"),
        Err(err) => warn!("Can't read log file {}: {}", path.display(), err),
    }
}
