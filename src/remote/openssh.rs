use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use crate::remote::{CommandOutput, Connector, RemoteSession, SshTarget};

/// ssh exits with 255 when the connection itself failed
const SSH_CONNECTION_ERROR: i32 = 255;

/// Opens a control master connection that later commands are multiplexed over
pub struct OpenSshConnector {
    target: SshTarget,
    socket: PathBuf,
}

impl OpenSshConnector {
    /// The control socket lives in the temp dir and is named after the workflow
    pub fn new(target: SshTarget, workflow_id: &str) -> Self {
        let socket = std::env::temp_dir().join(format!("fmriprep-relay-{workflow_id}.sock"));
        OpenSshConnector { target, socket }
    }
}

impl Connector for OpenSshConnector {
    fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        if self.socket.exists() {
            warn!("Removing stale control socket {}", self.socket.display());
            fs::remove_file(&self.socket)
                .with_context(|| format!("Can't remove {}", self.socket.display()))?;
        }

        let mut ssh = Command::new("ssh");
        let cmd = ssh
            .args(self.target.options())
            .arg("-M")
            .arg("-S")
            .arg(&self.socket)
            .arg("-fN")
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        debug!("{:?}", &cmd);

        // -f forks after authentication, so the status reflects the login itself
        let status = cmd.status().context("Failed to execute ssh")?;
        if !status.success() {
            bail!("ssh control connection to {} exited with {status}", self.target.destination());
        }

        info!("Connected to {} using SSH key", self.target.destination());
        Ok(Box::new(OpenSshSession {
            target: self.target.clone(),
            socket: self.socket.clone(),
            open: true,
        }))
    }
}

pub struct OpenSshSession {
    target: SshTarget,
    socket: PathBuf,
    open: bool,
}

impl RemoteSession for OpenSshSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.open {
            bail!("Session to {} is closed", self.target.destination());
        }

        let mut ssh = Command::new("ssh");
        let cmd = ssh
            .args(self.target.options())
            .arg("-S")
            .arg(&self.socket)
            .arg(self.target.destination())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null());
        debug!("Running remote command: {command}");

        let output = cmd.output().context("Failed to execute ssh")?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        };

        if result.status == Some(SSH_CONNECTION_ERROR) {
            bail!("ssh connection failed: {}", result.stderr.trim());
        }
        Ok(result)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let status = Command::new("ssh")
            .arg("-S")
            .arg(&self.socket)
            .arg("-O")
            .arg("exit")
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("Failed to execute ssh")?;

        if !status.success() {
            bail!("Control master for {} did not exit cleanly ({status})", self.target.destination());
        }
        info!("Closed connection to {}", self.target.destination());
        Ok(())
    }
}
