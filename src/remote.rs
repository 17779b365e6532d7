//! Capabilities the workflow needs from the cluster login node
//!
//! A [`Connector`] opens one long-lived [`RemoteSession`] used for every shell command, while a
//! [`Transfer`] copies file trees in either direction. The OpenSSH and rsync implementations shell
//! out to the system binaries; tests substitute in-memory fakes.

use std::path::Path;

use anyhow::Result;

/// Multiplexed OpenSSH control sessions
pub mod openssh;

/// rsync over ssh file tree copies
pub mod rsync;

/// Captured result of one remote shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// exit status reported by the remote shell, `None` if killed by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// An authenticated channel to the cluster that runs single commands
pub trait RemoteSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    /// Tear the channel down. Called once, at the end of the workflow.
    fn close(&mut self) -> Result<()>;
}

pub trait Connector {
    fn connect(&self) -> Result<Box<dyn RemoteSession>>;
}

/// Recursive copies between the local filesystem and remote paths on the cluster
pub trait Transfer {
    /// Copy a local file or directory into `destination` on the cluster
    fn send(&self, source: &Path, destination: &str) -> Result<()>;

    /// Copy `source` (which may be a shell glob) from the cluster into a local directory
    fn fetch(&self, source: &str, destination: &Path) -> Result<()>;
}

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub identity_file: Option<std::path::PathBuf>,
}

impl SshTarget {
    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }

    /// `user@host:path`, the address form rsync expects
    pub fn address(&self, path: &str) -> String {
        format!("{}:{}", self.destination(), path)
    }

    /// Options shared by every ssh invocation: non-interactive, key based, host key accepted
    pub fn options(&self) -> Vec<String> {
        let mut opts = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ];
        if let Some(key) = &self.identity_file {
            opts.push("-i".to_string());
            opts.push(key.display().to_string());
        }
        opts
    }
}

impl From<&crate::config::ClusterConfig> for SshTarget {
    fn from(cluster: &crate::config::ClusterConfig) -> Self {
        SshTarget {
            hostname: cluster.hostname.clone(),
            port: cluster.port,
            username: cluster.username.clone(),
            identity_file: cluster.identity_file.clone(),
        }
    }
}
