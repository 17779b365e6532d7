use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use log::{error, info};

use fmriprep_relay::config::{
    ClusterConfig, Config, JobOptions, LocalLayout, Timing, XnatConfig, DEFAULT_HOSTNAME, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT, DEFAULT_SLURM_BIN, DEFAULT_USERNAME, DEFAULT_XNAT_URL,
};
use fmriprep_relay::discovery::xnat::XnatClient;
use fmriprep_relay::remote::openssh::OpenSshConnector;
use fmriprep_relay::remote::rsync::Rsync;
use fmriprep_relay::remote::SshTarget;
use fmriprep_relay::retry::DEFAULT_RETRY_DELAY;
use fmriprep_relay::workflow::Workflow;

/// Run FMRIPrep on the Jubail cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Unique id scoping every remote path of this run
    #[arg(long, env = "XNAT_WORKFLOW_ID")]
    workflow_id: String,

    /// Session label to process, e.g. 'Subject_0017_ses_01'
    #[arg(long)]
    session_label: String,

    /// Project label to process, e.g. 'NYU_HBN'
    #[arg(long)]
    project_id: Option<String>,

    /// Extra FMRIPrep flags, reserved flags the job script sets itself are ignored
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    flags: String,

    /// Run FMRIPrep only for anatomical data ('true' or 'false')
    #[arg(long, default_value = "false", value_parser = parse_bool, action = ArgAction::Set)]
    anat_only: bool,

    /// Cluster login node
    #[arg(long, default_value = DEFAULT_HOSTNAME)]
    hostname: String,

    /// SSH port of the login node
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Cluster account owning the workspace and job files
    #[arg(long, default_value = DEFAULT_USERNAME)]
    username: String,

    /// Private key for ssh and rsync, ssh's defaults are used if unset
    #[arg(long)]
    identity_file: Option<PathBuf>,

    /// Directory holding sbatch, squeue and sacct on the cluster
    #[arg(long, default_value = DEFAULT_SLURM_BIN)]
    slurm_bin: String,

    /// XNAT server searched for freesurfer resources
    #[arg(long, default_value = DEFAULT_XNAT_URL)]
    xnat_url: String,

    /// XNAT user name
    #[arg(long, env = "XNAT_USER", hide_env_values = true)]
    xnat_user: Option<String>,

    /// XNAT password
    #[arg(long, env = "XNAT_PASS", hide_env_values = true)]
    xnat_pass: Option<String>,

    /// Local BIDS input directory
    #[arg(long, default_value = "/input")]
    input_dir: PathBuf,

    /// Where discovered freesurfer resources are downloaded
    #[arg(long, default_value = "/app")]
    staging_dir: PathBuf,

    /// Freesurfer license file
    #[arg(long, default_value = "/opt/fs")]
    license: PathBuf,

    /// Where job stdout and stderr are fetched
    #[arg(long, default_value = "/temp_files")]
    log_dir: PathBuf,

    /// Where FMRIPrep derivatives of a successful job are fetched
    #[arg(long, default_value = "/fmriprep")]
    fmriprep_out: PathBuf,

    /// Where freesurfer outputs of a successful job are fetched
    #[arg(long, default_value = "/freesurfer")]
    freesurfer_out: PathBuf,

    /// Where the job script is written before upload
    #[arg(long, default_value = ".")]
    script_dir: PathBuf,

    /// Seconds to wait before retrying a failed step
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY.as_secs())]
    retry_delay_secs: u64,

    /// Seconds between scheduler queue checks
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    poll_interval_secs: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            workflow_id: args.workflow_id,
            job: JobOptions {
                session_label: args.session_label,
                project_id: args.project_id,
                anat_only: args.anat_only,
                flags: args.flags,
            },
            cluster: ClusterConfig {
                hostname: args.hostname,
                port: args.port,
                username: args.username,
                identity_file: args.identity_file,
                slurm_bin: args.slurm_bin,
            },
            xnat: XnatConfig { url: args.xnat_url, user: args.xnat_user, password: args.xnat_pass },
            local: LocalLayout {
                input_dir: args.input_dir,
                staging_dir: args.staging_dir,
                license: args.license,
                log_dir: args.log_dir,
                fmriprep_out: args.fmriprep_out,
                freesurfer_out: args.freesurfer_out,
                script_dir: args.script_dir,
            },
            timing: Timing {
                retry_delay: Duration::from_secs(args.retry_delay_secs),
                poll_interval: Duration::from_secs(args.poll_interval_secs),
            },
        }
    }
}

/// Accepts true/t/1 and false/f/0 in any case
fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(format!("Invalid boolean value: '{value}'. Use 'true' or 'false'.")),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from(Args::parse());
    info!("Running FMRIPrep workflow {} for session {}", config.workflow_id, config.job.session_label);

    let target = SshTarget::from(&config.cluster);
    let connector = OpenSshConnector::new(target.clone(), &config.workflow_id);
    let transfer = Rsync::new(target);
    let discovery = match XnatClient::new(&config.xnat, config.local.staging_dir.clone()) {
        Ok(client) => client,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut workflow = Workflow::new(&config, &connector, &transfer, &discovery);
    match workflow.run() {
        Ok(completion) => ExitCode::from(completion.exit_code()),
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values() {
        for yes in ["true", "T", "1", "TRUE"] {
            assert_eq!(parse_bool(yes), Ok(true));
        }
        for no in ["false", "f", "0", "False"] {
            assert_eq!(parse_bool(no), Ok(false));
        }
        assert!(parse_bool("yes").is_err());
    }

    #[test]
    fn args_become_config() {
        let args = Args::parse_from([
            "fmriprep-relay",
            "--workflow-id",
            "wf-1",
            "--session-label",
            "Subject_0017_ses_01",
            "--anat-only",
            "t",
            "--flags",
            "--verbose --low-mem",
        ]);
        let config = Config::from(args);
        assert_eq!(config.workflow_id, "wf-1");
        assert!(config.job.anat_only);
        assert_eq!(config.job.flags, "--verbose --low-mem");
        assert_eq!(config.cluster.port, 22);
        assert_eq!(config.cluster.hostname, ClusterConfig::default().hostname);
        assert_eq!(config.xnat.url, XnatConfig::default().url);
        assert_eq!(config.timing.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.timing.poll_interval, Duration::from_secs(120));
    }

    #[test]
    fn args_are_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn every_flag_has_help() {
        use clap::CommandFactory;
        let command = Args::command();
        for arg in command.get_arguments() {
            if matches!(arg.get_id().as_str(), "help" | "version") {
                continue;
            }
            assert!(arg.get_help().is_some(), "--{} has no help text", arg.get_id());
        }
    }
}
