use std::path::PathBuf;
use std::time::Duration;

/// How often the scheduler queue is checked while a job is pending
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

pub const DEFAULT_HOSTNAME: &str = "jubail.abudhabi.nyu.edu";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_USERNAME: &str = "mri";
pub const DEFAULT_SLURM_BIN: &str = "/opt/slurm/default/bin";
pub const DEFAULT_XNAT_URL: &str = "http://10.230.12.52";

/// Everything a workflow run needs to know besides its collaborators
#[derive(Debug, Clone)]
pub struct Config {
    pub workflow_id: String,
    pub job: JobOptions,
    pub cluster: ClusterConfig,
    pub xnat: XnatConfig,
    pub local: LocalLayout,
    pub timing: Timing,
}

/// Per-run FMRIPrep options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub session_label: String,
    pub project_id: Option<String>,
    pub anat_only: bool,
    /// free-form extra FMRIPrep flags, reserved flags are removed when rendering
    pub flags: String,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    /// private key used for both the control session and rsync, ssh defaults if unset
    pub identity_file: Option<PathBuf>,
    /// directory holding sbatch, squeue and sacct on the cluster
    pub slurm_bin: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            identity_file: None,
            slurm_bin: DEFAULT_SLURM_BIN.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct XnatConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for XnatConfig {
    fn default() -> Self {
        XnatConfig {
            url: DEFAULT_XNAT_URL.to_string(),
            user: None,
            password: None,
        }
    }
}

/// Local paths read from or written to by the pipeline
#[derive(Debug, Clone)]
pub struct LocalLayout {
    /// BIDS input tree, copied as a whole into the workspace
    pub input_dir: PathBuf,
    /// discovered resources are downloaded into `<staging_dir>/freesurfer`
    pub staging_dir: PathBuf,
    /// freesurfer license, copied to `<workspace>/license.txt`
    pub license: PathBuf,
    /// where the job's stdout and stderr captures are fetched to
    pub log_dir: PathBuf,
    pub fmriprep_out: PathBuf,
    pub freesurfer_out: PathBuf,
    /// where the submission script is written before upload
    pub script_dir: PathBuf,
}

impl LocalLayout {
    pub fn freesurfer_staging(&self) -> PathBuf {
        self.staging_dir.join("freesurfer")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub retry_delay: Duration,
    pub poll_interval: Duration,
}
