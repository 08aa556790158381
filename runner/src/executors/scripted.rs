use super::{RemoteError, RemoteExecutor, RemoteOutput};
use parking_lot::Mutex;
use std::{path::Path, time::Duration};

/// In-memory executor that records every command and answers from a script
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    responses: Mutex<Vec<(String, RemoteOutput)>>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// answer commands containing `pattern`, later rules win
    pub fn respond(&self, pattern: &str, status: i32, output: &str) {
        self.responses.lock().push((
            pattern.to_owned(),
            RemoteOutput {
                status,
                output: output.to_owned(),
                stderr: String::new(),
            },
        ));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// (file name, contents, remote directory) of every uploaded file
    pub fn uploads(&self) -> Vec<(String, String, String)> {
        self.uploads.lock().clone()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn run(&self, command: &str, _timeout: Option<Duration>) -> Result<RemoteOutput, RemoteError> {
        self.commands.lock().push(command.to_owned());

        Ok(self
            .responses
            .lock()
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }

    fn put_file(&self, path: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let contents = std::fs::read_to_string(path).unwrap_or_default();

        self.uploads
            .lock()
            .push((name, contents, remote_dir.to_owned()));

        Ok(())
    }
}
