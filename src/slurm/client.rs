use std::fmt;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::remote::RemoteSession;

/// Scheduler-assigned job number
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What is known about how the job ended
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Completion {
    /// the job hasn't been classified yet
    #[default]
    Unknown,
    Succeeded,
    Failed,
}

impl Completion {
    /// Process exit status for this outcome: only success exits 0
    pub fn exit_code(&self) -> u8 {
        match self {
            Completion::Succeeded => 0,
            Completion::Unknown | Completion::Failed => 1,
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Completion::Unknown => write!(f, "unknown"),
            Completion::Succeeded => write!(f, "succeeded"),
            Completion::Failed => write!(f, "failed"),
        }
    }
}

/// Take the trailing run of digits from sbatch output, e.g. "Submitted batch job 11"
pub fn parse_job_id(output: &str) -> Option<JobId> {
    let trimmed = output.trim();
    let digits = trimmed.len() - trimmed.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    trimmed[trimmed.len() - digits..].parse::<u64>().ok().map(JobId)
}

/// A job is live while squeue prints anything besides its header line
pub fn is_listed(squeue_output: &str) -> bool {
    squeue_output.lines().count() > 1
}

/// Any FAILED state in the accounting record marks the job as failed
///
/// CANCELLED, TIMEOUT and OUT_OF_MEMORY are not FAILED and count as success here.
pub fn classify_accounting(sacct_output: &str) -> Completion {
    if sacct_output.contains("FAILED") {
        Completion::Failed
    } else {
        Completion::Succeeded
    }
}

/// SLURM commands run on the login node through the workflow's session
#[derive(Debug, Clone)]
pub struct Slurm {
    bin: String,
}

impl Slurm {
    pub fn new(bin: &str) -> Self {
        Slurm { bin: bin.trim_end_matches('/').to_string() }
    }

    fn command(&self, name: &str) -> String {
        format!("{}/{}", self.bin, name)
    }

    /// Submit a script that already exists on the cluster
    ///
    /// Returns `None` if sbatch didn't print a job id.
    pub fn submit(&self, session: &mut dyn RemoteSession, script: &str) -> Result<Option<JobId>> {
        let cmd = format!("{} {}", self.command("sbatch"), script);
        info!("Running sbatch {script}");
        let output = session.exec(&cmd).context("Running sbatch")?;

        let stdout = output.stdout.trim();
        info!("{stdout}");
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            warn!("sbatch reported an error: {stderr}");
        }

        Ok(parse_job_id(stdout))
    }

    /// Is the job still pending or running?
    pub fn is_still_queued(&self, session: &mut dyn RemoteSession, job: JobId) -> Result<bool> {
        let cmd = format!("{} -j {}", self.command("squeue"), job);
        let output = session.exec(&cmd).context("Running squeue")?;
        Ok(is_listed(&output.stdout))
    }

    /// Classify a job that has left the queue using its accounting record
    pub fn has_finished_successfully(&self, session: &mut dyn RemoteSession, job: JobId) -> Result<Completion> {
        let cmd = format!("{} -j {} -o state", self.command("sacct"), job);
        let output = session.exec(&cmd).context("Running sacct")?;
        if !output.success() {
            bail!("sacct exited with {:?}: {}", output.status, output.stderr.trim());
        }

        let completion = classify_accounting(&output.stdout);
        match completion {
            Completion::Failed => warn!("Error occurred during job execution: job {job} failed"),
            _ => info!("Job {job} completed successfully"),
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CommandOutput;

    /// Replays one canned output and remembers the command it was asked to run
    struct Canned {
        output: CommandOutput,
        commands: Vec<String>,
    }

    impl Canned {
        fn stdout(stdout: &str) -> Self {
            Canned {
                output: CommandOutput { stdout: stdout.to_string(), status: Some(0), ..Default::default() },
                commands: Vec::new(),
            }
        }
    }

    impl RemoteSession for Canned {
        fn exec(&mut self, command: &str) -> Result<CommandOutput> {
            self.commands.push(command.to_string());
            Ok(self.output.clone())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn job_id_from_sbatch_output() {
        assert_eq!(parse_job_id("Submitted batch job 482913"), Some(JobId(482913)));
        assert_eq!(parse_job_id("Submitted batch job 11\n"), Some(JobId(11)));
        assert_eq!(parse_job_id("sbatch: error: invalid partition"), None);
        assert_eq!(parse_job_id(""), None);
    }

    #[test]
    fn queue_listing_with_only_header_means_gone() {
        let header = "JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)";
        assert!(is_listed(&format!("{header}\n482913 compute wf mri R 1:00 1 cn01\n")));
        assert!(!is_listed(header));
        assert!(!is_listed(""));
    }

    #[test]
    fn accounting_failed_anywhere_is_failure() {
        assert_eq!(classify_accounting("     State \n---------- \n COMPLETED \n    FAILED \n"), Completion::Failed);
        assert_eq!(classify_accounting("     State \n---------- \n COMPLETED \n"), Completion::Succeeded);
        assert_eq!(classify_accounting(""), Completion::Succeeded);
    }

    #[test]
    fn only_success_exits_zero() {
        assert_eq!(Completion::Succeeded.exit_code(), 0);
        assert_eq!(Completion::Failed.exit_code(), 1);
        assert_eq!(Completion::Unknown.exit_code(), 1);
    }

    #[test]
    fn submit_runs_sbatch_from_configured_bin() {
        let mut session = Canned::stdout("Submitted batch job 99\n");
        let slurm = Slurm::new("/opt/slurm/default/bin/");
        let job = slurm.submit(&mut session, "/home/mri/wf.slurm").unwrap();
        assert_eq!(job, Some(JobId(99)));
        assert_eq!(session.commands, vec!["/opt/slurm/default/bin/sbatch /home/mri/wf.slurm"]);
    }

    #[test]
    fn accounting_query_filters_by_job() {
        let mut session = Canned::stdout("State\n----------\nCOMPLETED\n");
        let slurm = Slurm::new("/opt/slurm/default/bin");
        let completion = slurm.has_finished_successfully(&mut session, JobId(5)).unwrap();
        assert_eq!(completion, Completion::Succeeded);
        assert_eq!(session.commands, vec!["/opt/slurm/default/bin/sacct -j 5 -o state"]);
    }

    #[test]
    fn failing_sacct_is_an_error() {
        let mut session = Canned::stdout("");
        session.output.status = Some(1);
        let slurm = Slurm::new("/opt/slurm/default/bin");
        assert!(slurm.has_finished_successfully(&mut session, JobId(5)).is_err());
    }
}
