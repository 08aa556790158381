use crate::{
    config::PbenchConfig,
    executors::{RemoteError, RemoteExecutor},
};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const RESULTS_FILE: &str = "benchmark_results";
pub const VERSION_FILE: &str = "appliance_version";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Failed to stage {path} for upload")]
    Staging { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Idle,
    Collecting,
}

/// Brackets benchmark iterations with pbench tool collection on the appliance.
///
/// A disabled collection turns every call into a logged no-op so callers never
/// have to check the flag themselves.
#[derive(Debug)]
pub struct ToolCollection {
    config: PbenchConfig,
    version: String,
    staging_dir: PathBuf,
    states: BTreeMap<String, CollectionState>,
}

impl ToolCollection {
    /// `staging_dir` holds the files uploaded next to the tool data
    pub fn new(
        config: PbenchConfig,
        version: impl Into<String>,
        staging_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            config,
            version: version.into(),
            staging_dir: staging_dir.as_ref().to_path_buf(),
            states: BTreeMap::new(),
        }
    }

    pub fn state(&self, run: &str, iteration: &str) -> CollectionState {
        self.states
            .get(&Self::key(run, &iteration_id(iteration)))
            .copied()
            .unwrap_or(CollectionState::Idle)
    }

    fn key(run: &str, iteration: &str) -> String {
        format!("{run}/{iteration}")
    }

    fn result_dir(&self, run: &str, iteration: &str) -> String {
        format!("{}/{run}/{iteration}", self.config.agent_dir)
    }

    fn settle(&self) {
        debug!("pbench sleeping: {}", self.config.settle_time);
        thread::sleep(Duration::from_secs(self.config.settle_time));
    }

    /// run a step whose failure is tolerated, pbench tools exit non zero when
    /// there is nothing to clear or kill
    fn step(&self, executor: &impl RemoteExecutor, command: &str) -> Result<(), RemoteError> {
        let output = executor.run(command, Some(COMMAND_TIMEOUT))?;

        if !output.success() {
            warn!(status = output.status, "`{command}` failed: {}", output.output.trim());
        }

        Ok(())
    }

    #[instrument(skip_all, level = "info")]
    fn install(&self, executor: &impl RemoteExecutor) -> Result<(), RemoteError> {
        info!("Installing pbench.");

        let Some(ref install) = self.config.install else {
            warn!("pbench is not installed and pbench.install is not configured");
            return Ok(());
        };

        for (name, url) in install.repos.iter() {
            executor.run_checked(
                &format!("wget -O /etc/yum.repos.d/{name}.repo {url}"),
                Some(COMMAND_TIMEOUT),
            )?;
        }
        executor.run_checked(
            &format!("yum install -y --nogpgcheck {}", install.package),
            Some(COMMAND_TIMEOUT),
        )?;

        // smaller /var volumes, keep the tool data somewhere bigger
        if let Some(ref target) = install.relocate_to {
            let agent_dir = &self.config.agent_dir;

            for command in [
                format!("mkdir -p {target}"),
                format!("mv {agent_dir}/* {target}"),
                format!("rm -rf {agent_dir}"),
                format!("ln -s {target} {agent_dir}"),
            ] {
                executor.run_checked(&command, Some(COMMAND_TIMEOUT))?;
            }
        }

        Ok(())
    }

    /// Install pbench if needed, register the tools and start collecting
    pub fn start(
        &mut self,
        executor: &impl RemoteExecutor,
        run: &str,
        iteration: &str,
    ) -> Result<(), CollectionError> {
        if self.config.disable {
            debug!("pbench start-tools skipped due to pbench.disable set to true.");
            return Ok(());
        }

        let iteration = iteration_id(iteration);
        let probe = executor.run(
            &format!("test -e {}/VERSION", self.config.install_dir),
            Some(COMMAND_TIMEOUT),
        )?;
        if probe.success() {
            debug!("pbench already installed.");
        } else {
            self.install(executor)?;
        }

        info!("Starting pbench");
        self.step(executor, "clear-tools; kill-tools")?;
        for tool in self.config.tools.iter() {
            self.step(
                executor,
                &format!(
                    "register-tool --name={tool} -- --interval={}",
                    self.config.tool_interval
                ),
            )?;
        }

        let directory = self.result_dir(run, &iteration);
        executor.run_checked(&format!("mkdir -p {directory}"), Some(COMMAND_TIMEOUT))?;
        executor.run_checked(
            &format!("start-tools --dir={directory} --iteration={iteration}"),
            Some(COMMAND_TIMEOUT),
        )?;
        self.states
            .insert(Self::key(run, &iteration), CollectionState::Collecting);

        self.settle();

        Ok(())
    }

    /// Stop collecting and store `results` plus the appliance version next to
    /// the tool data
    pub fn stop(
        &mut self,
        executor: &impl RemoteExecutor,
        run: &str,
        iteration: &str,
        results: &str,
    ) -> Result<(), CollectionError> {
        if self.config.disable {
            debug!("pbench stop-tools skipped due to pbench.disable set to true.");
            return Ok(());
        }

        let iteration = iteration_id(iteration);
        let key = Self::key(run, &iteration);
        if self.states.insert(key, CollectionState::Idle) != Some(CollectionState::Collecting) {
            warn!("Stopping pbench for {run}/{iteration} which was never started");
        }

        self.settle();

        info!("Stopping pbench.");
        let directory = self.result_dir(run, &iteration);
        self.step(
            executor,
            &format!("stop-tools --dir={directory} --iteration={iteration}"),
        )?;

        info!("Adding Results to pbench directory tree");
        let results_path = self.stage(RESULTS_FILE, results)?;
        let version_path = self.stage(VERSION_FILE, &self.version)?;
        let remote_dir = format!("{directory}/");
        let uploaded = executor
            .put_file(&results_path, &remote_dir)
            .and_then(|_| executor.put_file(&version_path, &remote_dir));

        if let Err(error) = fs::remove_file(&results_path) {
            warn!(error = ?error, "Failed to remove {}", results_path.display());
        }
        uploaded?;

        info!("Post processing pbench.");
        self.step(
            executor,
            &format!("postprocess-tools --dir={directory} --iteration={iteration}"),
        )?;

        Ok(())
    }

    /// Hand all collected results over to the pbench server, may take a while
    pub fn move_results(&self, executor: &impl RemoteExecutor) -> Result<(), CollectionError> {
        if self.config.disable {
            debug!("pbench move-results skipped due to pbench.disable set to true.");
            return Ok(());
        }

        info!("Moving pbench results.");
        executor.run_checked("move-results", None)?;

        Ok(())
    }

    fn stage(&self, name: &str, contents: &str) -> Result<PathBuf, CollectionError> {
        let path = self.staging_dir.join(name);
        let staging = |source| CollectionError::Staging {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.staging_dir).map_err(staging)?;
        fs::write(&path, contents).map_err(staging)?;

        Ok(path)
    }
}

/// pbench iteration names cannot contain spaces
pub fn iteration_id(iteration: &str) -> String {
    iteration.replace(' ', "_")
}
