pub mod local;
pub mod ssh;

#[cfg(test)]
pub mod scripted;

use crate::config::{ApplianceConfig, ConfigErrors};
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace, warn};
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to spawn {program}")]
    Spawn { program: String, source: io::Error },
    #[error("Failed while waiting for `{command}`")]
    Wait { command: String, source: io::Error },
    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with status {status}")]
    Failed {
        command: String,
        status: i32,
        output: String,
    },
    #[error("Failed to copy {path} to {destination}")]
    Transfer {
        path: PathBuf,
        destination: String,
        status: i32,
    },
}

/// Exit status and captured output of one command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteOutput {
    pub status: i32,
    pub output: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs shell commands on the appliance under test
pub trait RemoteExecutor {
    /// run `command` through the remote shell, `None` waits forever
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError>;

    /// copy a local file into a directory on the appliance
    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError>;

    /// like `run`, but a non zero exit status is an error
    fn run_checked(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<RemoteOutput, RemoteError> {
        let output = self.run(command, timeout)?;

        if output.success() {
            Ok(output)
        } else {
            Err(RemoteError::Failed {
                command: command.to_owned(),
                status: output.status,
                output: output.output,
            })
        }
    }
}

impl<T: RemoteExecutor + ?Sized> RemoteExecutor for &T {
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError> {
        (**self).run(command, timeout)
    }

    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        (**self).put_file(path, remote_dir)
    }
}

impl<T: RemoteExecutor + ?Sized> RemoteExecutor for Arc<T> {
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError> {
        (**self).run(command, timeout)
    }

    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        (**self).put_file(path, remote_dir)
    }
}

#[derive(Clone, Debug)]
pub enum Executors {
    Local(local::LocalShell),
    Ssh(ssh::SshClient),
}

impl Executors {
    pub fn load(config: &ApplianceConfig) -> Result<Self, ConfigErrors> {
        match config.executor.as_str() {
            "local" => Ok(Self::Local(local::LocalShell::new())),
            "ssh" => Ok(Self::Ssh(ssh::SshClient::new(config))),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.executor.clone())),
        }
    }
}

impl RemoteExecutor for Executors {
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError> {
        match self {
            Self::Local(executor) => executor.run(command, timeout),
            Self::Ssh(executor) => executor.run(command, timeout),
        }
    }

    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        match self {
            Self::Local(executor) => executor.put_file(path, remote_dir),
            Self::Ssh(executor) => executor.put_file(path, remote_dir),
        }
    }
}

/// `cd <vmdb_dir>; bin/rails runner "<script>"`
pub fn rails_runner(vmdb_dir: &str, script: &str) -> String {
    format!("cd {vmdb_dir}; bin/rails runner \"{script}\"")
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut pipe) = pipe {
            if let Err(error) = pipe.read_to_string(&mut buffer) {
                warn!(error = ?error, "Failed to read command output");
            }
        }

        buffer
    })
}

fn collect(child: &mut Child) -> (JoinHandle<String>, JoinHandle<String>) {
    (drain(child.stdout.take()), drain(child.stderr.take()))
}

fn join(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Spawn `command`, drain its pipes and wait at most `timeout` for it.
///
/// `description` is what ends up in errors and logs, usually the shell
/// command the process runs.
pub(crate) fn spawn_with_timeout(
    mut command: Command,
    description: &str,
    timeout: Option<Duration>,
) -> Result<RemoteOutput, RemoteError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let start = Instant::now();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RemoteError::Spawn { program, source })?;

    // read concurrently, a full pipe would otherwise block the child forever
    let (stdout, stderr) = collect(&mut child);
    let wait_error = |source| RemoteError::Wait {
        command: description.to_owned(),
        source,
    };

    let status = match timeout {
        Some(timeout) => match child.wait_timeout(timeout).map_err(wait_error)? {
            Some(status) => status,
            None => {
                // child hasn't exited yet
                if let Err(error) = child.kill() {
                    warn!(error = ?error, "Failed to kill timed out command");
                }
                if let Err(error) = child.wait() {
                    warn!(error = ?error, "Failed to reap timed out command");
                }

                return Err(RemoteError::Timeout {
                    command: description.to_owned(),
                    timeout,
                });
            }
        },
        None => child.wait().map_err(wait_error)?,
    };

    let output = RemoteOutput {
        // terminated by a signal
        status: status.code().unwrap_or(-1),
        output: join(stdout),
        stderr: join(stderr),
    };

    debug!(
        "Finished `{description}` in {} ms | status: {}",
        start.elapsed().as_millis(),
        output.status
    );
    trace!("Output: {}", output.output);
    if !output.stderr.is_empty() {
        trace!("Stderr: {}", output.stderr);
    }

    Ok(output)
}
