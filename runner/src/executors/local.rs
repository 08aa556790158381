use super::{spawn_with_timeout, RemoteError, RemoteExecutor, RemoteOutput};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};
use tracing::instrument;

/// Executor for a benchmark driver running on the appliance itself
#[derive(Clone, Debug, Default)]
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }
}

impl RemoteExecutor for LocalShell {
    #[instrument(skip(self), level = "debug")]
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError> {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);

        spawn_with_timeout(shell, command, timeout)
    }

    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        let file_name = path.file_name().unwrap_or(path.as_os_str());
        let destination = PathBuf::from(remote_dir).join(file_name);

        fs::copy(path, &destination)
            .map(|_| ())
            .map_err(|error| RemoteError::Transfer {
                path: path.to_path_buf(),
                destination: destination.to_string_lossy().into_owned(),
                status: error.raw_os_error().unwrap_or(-1),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_status() {
        let output = LocalShell::new()
            .run("echo out; echo err >&2; exit 3", Some(Duration::from_secs(10)))
            .unwrap();

        assert_eq!(output.status, 3);
        assert_eq!(output.output, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn times_out() {
        let result = LocalShell::new().run("sleep 5", Some(Duration::from_millis(100)));

        assert!(matches!(result, Err(RemoteError::Timeout { .. })));
    }

    #[test]
    fn put_file_copies_into_directory() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let path = source.path().join("appliance_version");
        fs::write(&path, "5.5.2.4").unwrap();

        LocalShell::new()
            .put_file(&path, &target.path().to_string_lossy())
            .unwrap();

        assert_eq!(
            fs::read_to_string(target.path().join("appliance_version")).unwrap(),
            "5.5.2.4"
        );
    }
}
