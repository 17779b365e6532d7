/// Remote locations for one workflow run
///
/// Every remote path the pipeline touches is derived here from the username and workflow id, so
/// the staging, submission, retrieval and cleanup steps always agree on where things live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePaths {
    username: String,
    workflow_id: String,
}

impl RemotePaths {
    pub fn new(username: &str, workflow_id: &str) -> Self {
        RemotePaths { username: username.to_string(), workflow_id: workflow_id.to_string() }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// `/scratch/<user>`, the quota-limited filesystem
    pub fn scratch_root(&self) -> String {
        format!("/scratch/{}", self.username)
    }

    /// `/home/<user>`, where sbatch runs and job logs land
    pub fn home(&self) -> String {
        format!("/home/{}", self.username)
    }

    /// `/scratch/<user>/<id>`
    pub fn workspace(&self) -> String {
        format!("{}/{}", self.scratch_root(), self.workflow_id)
    }

    pub fn input(&self) -> String {
        format!("{}/input", self.workspace())
    }

    /// Trailing slash so rsync places the copied tree inside the input directory
    pub fn input_contents(&self) -> String {
        format!("{}/", self.input())
    }

    pub fn license(&self) -> String {
        format!("{}/license.txt", self.workspace())
    }

    pub fn fmriprep_output(&self) -> String {
        format!("{}/fmriprep", self.workspace())
    }

    pub fn freesurfer_output(&self) -> String {
        format!("{}/freesurfer", self.workspace())
    }

    /// Name of the submission script, both locally and on the cluster
    pub fn script_name(&self) -> String {
        format!("{}.slurm", self.workflow_id)
    }

    pub fn script(&self) -> String {
        format!("{}/{}", self.home(), self.script_name())
    }

    pub fn stdout_name(&self) -> String {
        format!("slurm-{}.out", self.workflow_id)
    }

    pub fn stderr_name(&self) -> String {
        format!("slurm-{}.err", self.workflow_id)
    }

    pub fn stdout(&self) -> String {
        format!("{}/{}", self.home(), self.stdout_name())
    }

    pub fn stderr(&self) -> String {
        format!("{}/{}", self.home(), self.stderr_name())
    }

    /// Everything the job wrote, in the order it is removed at cleanup
    pub fn artifacts(&self) -> [String; 4] {
        [self.workspace(), self.script(), self.stdout(), self.stderr()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_one_root() {
        let paths = RemotePaths::new("mri", "wf-7");
        assert_eq!(paths.workspace(), "/scratch/mri/wf-7");
        assert_eq!(paths.input_contents(), "/scratch/mri/wf-7/input/");
        assert_eq!(paths.license(), "/scratch/mri/wf-7/license.txt");
        assert_eq!(paths.script(), "/home/mri/wf-7.slurm");
        assert_eq!(paths.stdout(), "/home/mri/slurm-wf-7.out");
        assert_eq!(paths.stderr(), "/home/mri/slurm-wf-7.err");
    }

    #[test]
    fn artifacts_start_with_workspace() {
        let paths = RemotePaths::new("mri", "wf-7");
        let artifacts = paths.artifacts();
        assert_eq!(artifacts[0], paths.workspace());
        assert_eq!(artifacts[3], paths.stderr());
    }
}
