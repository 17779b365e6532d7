use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use log::{debug, info};

use crate::remote::{SshTarget, Transfer};

pub struct Rsync {
    target: SshTarget,
}

impl Rsync {
    pub fn new(target: SshTarget) -> Self {
        Rsync { target }
    }

    /// Value for `rsync -e`
    fn remote_shell(&self) -> String {
        let mut shell = vec!["ssh".to_string()];
        shell.extend(self.target.options());
        shell.join(" ")
    }

    fn run(&self, flags: &str, source: &str, destination: &str) -> Result<()> {
        let mut rsync = Command::new("rsync");
        let cmd = rsync
            .arg(flags)
            .arg("-e")
            .arg(self.remote_shell())
            .arg(source)
            .arg(destination)
            .stdin(Stdio::null());
        debug!("{:?}", &cmd);

        let output = cmd.output().context("Failed to execute rsync")?;
        debug!("{}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            bail!(
                "rsync {source} -> {destination} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Transfer for Rsync {
    fn send(&self, source: &Path, destination: &str) -> Result<()> {
        if !source.exists() {
            bail!("The provided source '{}' does not exist", source.display());
        }
        let remote = self.target.address(destination);
        self.run("-av", &source.display().to_string(), &remote)?;
        info!("Data copied successfully to {remote}");
        Ok(())
    }

    fn fetch(&self, source: &str, destination: &Path) -> Result<()> {
        if !destination.exists() {
            bail!("The provided destination '{}' does not exist", destination.display());
        }
        let remote = self.target.address(source);
        self.run("-avz", &remote, &destination.display().to_string())?;
        info!("Data retrieved successfully to {}", destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn rsync() -> Rsync {
        Rsync::new(SshTarget {
            hostname: "cluster.example.org".to_string(),
            port: 22,
            username: "mri".to_string(),
            identity_file: Some(PathBuf::from("/keys/id_rsa")),
        })
    }

    #[test]
    fn remote_shell_carries_key() {
        assert_eq!(
            rsync().remote_shell(),
            "ssh -p 22 -o BatchMode=yes -o StrictHostKeyChecking=no -i /keys/id_rsa"
        );
    }

    #[test]
    fn missing_source_is_rejected_before_copying() {
        let tmp = tempfile::tempdir().unwrap();
        let err = rsync().send(&tmp.path().join("absent"), "/scratch/mri").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn missing_destination_is_rejected_before_copying() {
        let tmp = tempfile::tempdir().unwrap();
        let err = rsync().fetch("/home/mri/slurm-1.out", &tmp.path().join("absent")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
