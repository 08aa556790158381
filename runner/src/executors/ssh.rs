use super::{spawn_with_timeout, RemoteError, RemoteExecutor, RemoteOutput};
use crate::config::ApplianceConfig;
use std::{
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};
use tracing::instrument;

/// Executor that drives the appliance through the system `ssh` and `scp` binaries
#[derive(Clone, Debug)]
pub struct SshClient {
    host: String,
    user: String,
    port: u16,
    identity: Option<PathBuf>,
}

impl SshClient {
    pub fn new(config: &ApplianceConfig) -> Self {
        Self {
            host: config.host.clone(),
            user: config.user.clone(),
            port: config.port,
            identity: config.identity.clone(),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn base(&self, program: &str, port_flag: &str) -> Command {
        let mut command = Command::new(program);
        command
            .args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=no"])
            .arg(port_flag)
            .arg(self.port.to_string());

        if let Some(ref identity) = self.identity {
            command.arg("-i").arg(identity);
        }

        command
    }

    pub(crate) fn ssh_command(&self, command: &str) -> Command {
        let mut ssh = self.base("ssh", "-p");
        ssh.arg(self.destination()).arg("--").arg(command);

        ssh
    }

    pub(crate) fn scp_command(&self, path: &Path, remote_dir: &str) -> Command {
        let mut scp = self.base("scp", "-P");
        scp.arg(path)
            .arg(format!("{}:{}/", self.destination(), remote_dir));

        scp
    }
}

impl RemoteExecutor for SshClient {
    #[instrument(skip(self), fields(host = %self.host), level = "debug")]
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError> {
        spawn_with_timeout(self.ssh_command(command), command, timeout)
    }

    #[instrument(skip(self), fields(host = %self.host), level = "debug")]
    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        let description = format!("scp {}", path.display());
        let output = spawn_with_timeout(self.scp_command(path, remote_dir), &description, None)?;

        if output.success() {
            Ok(())
        } else {
            Err(RemoteError::Transfer {
                path: path.to_path_buf(),
                destination: format!("{}:{remote_dir}", self.host),
                status: output.status,
            })
        }
    }
}
