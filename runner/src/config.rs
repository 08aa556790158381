use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io::Error, path::PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Config file {0} not found")]
    FileNotFound(PathBuf),
    #[error("Failed to read config file")]
    ReadFailed(#[from] Error),
    #[error("Config is not valid YAML")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks, see the log for details")]
    PreflightFailed,
    #[error("Executor not supported")]
    UnsupportedExecutor(String),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PerfConfig {
    // appliance under test and how to reach it
    pub appliance: ApplianceConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pbench: PbenchConfig,
    #[serde(default)]
    pub codegen: CodegenConfig,
    // iterations per feature and test
    #[serde(default)]
    pub benchmark: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default)]
    pub workload: BTreeMap<String, WorkloadConfig>,
    #[serde(default)]
    pub monitor: MonitorConfig,
    pub grafana: Option<GrafanaConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ApplianceConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    #[serde(default = "default_executor")]
    pub executor: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub identity: Option<PathBuf>,
    #[serde(default = "default_vmdb_dir")]
    pub vmdb_dir: String,
    // version label written into every report row
    #[serde(default = "default_version")]
    pub version: String,
    // vm name of the appliance, used as grafana node
    pub vm_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PbenchConfig {
    #[serde(default)]
    pub disable: bool,
    // seconds between tool samples
    #[serde(default = "default_tool_interval")]
    pub tool_interval: u64,
    // seconds to sleep after start and before stop
    #[serde(default = "default_settle_time")]
    pub settle_time: u64,
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
    #[serde(default = "default_agent_dir")]
    pub agent_dir: String,
    #[serde(default = "default_install_dir")]
    pub install_dir: String,
    pub install: Option<PbenchInstallConfig>,
}

impl Default for PbenchConfig {
    fn default() -> Self {
        Self {
            disable: false,
            tool_interval: default_tool_interval(),
            settle_time: default_settle_time(),
            tools: default_tools(),
            agent_dir: default_agent_dir(),
            install_dir: default_install_dir(),
            install: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PbenchInstallConfig {
    // repo file name -> url, fetched into /etc/yum.repos.d
    pub repos: BTreeMap<String, String>,
    #[serde(default = "default_package")]
    pub package: String,
    // move the agent directory onto a bigger volume and symlink it back
    pub relocate_to: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct CodegenConfig {
    #[serde(default = "default_require")]
    pub require: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: u8,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            require: default_require(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    // seconds the workload runs under the memory monitor
    pub total_time: u64,
    // commands that prepare the appliance before the workload starts
    #[serde(default)]
    pub setup: Vec<String>,
    // seconds the appliance idles after setup, before the measured period
    #[serde(default)]
    pub warmup: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    // seconds between memory polls
    #[serde(default = "default_monitor_interval")]
    pub interval: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_monitor_interval(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct GrafanaConfig {
    pub ip_address: String,
    #[serde(default = "default_grafana_port")]
    pub port: u16,
    #[serde(default = "default_dashboard")]
    pub dashboard: String,
}

impl PerfConfig {
    /// read, parse and preflight a YAML config file
    pub fn load(path: &PathBuf) -> Result<Self, ConfigErrors> {
        if !path.is_file() {
            return Err(ConfigErrors::FileNotFound(path.clone()));
        }

        let mut config = Self::from_yaml(&fs::read_to_string(path)?)?;
        debug!("Loaded config from {}", path.to_string_lossy());

        if config.preflight_checks() {
            Err(ConfigErrors::PreflightFailed)
        } else {
            Ok(config)
        }
    }

    pub fn from_yaml(source: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// iterations configured for a feature/test pair, defaults to one
    pub fn iterations(&self, feature: &str, test: &str) -> usize {
        self.benchmark
            .get(feature)
            .and_then(|tests| tests.get(test))
            .copied()
            .unwrap_or(1)
    }

    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        self.appliance.executor = self.appliance.executor.to_lowercase();
        match self.appliance.executor.as_str() {
            "ssh" => {
                if self.appliance.host.is_empty() {
                    error!("appliance.host must be set for the ssh executor");
                    contains_error = true;
                }
            }
            "local" => {
                if !self.appliance.host.is_empty() {
                    warn!("appliance.host is ignored by the local executor");
                }
            }
            executor => {
                error!(
                    "appliance.executor ({executor}) is not supported, please use `ssh` or `local`"
                );
                contains_error = true;
            }
        }

        if let Some(ref identity) = self.appliance.identity {
            if !identity.is_file() {
                error!(
                    "appliance.identity {} is not a file",
                    identity.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if !self.pbench.disable {
            if self.pbench.tools.is_empty() {
                warn!("pbench.tools is empty. Falling back to the default tool set");
                self.pbench.tools = default_tools();
            }

            if self.pbench.tool_interval == 0 {
                error!("pbench.tool_interval cannot be 0");
                contains_error = true;
            }

            if let Some(ref install) = self.pbench.install {
                if install.repos.is_empty() {
                    error!("pbench.install.repos needs at least one repo file to install from");
                    contains_error = true;
                }
            }
        }

        if self.codegen.log_level > 5 {
            error!(
                "codegen.log_level ({}) is not a valid ActiveRecord log level (0-5)",
                self.codegen.log_level
            );
            contains_error = true;
        }

        for (feature, tests) in self.benchmark.iter() {
            for (test, iterations) in tests.iter() {
                if *iterations == 0 {
                    warn!("benchmark.{feature}.{test} has 0 iterations and will not run");
                }
            }
        }

        for (name, workload) in self.workload.iter() {
            if workload.total_time == 0 {
                error!("workload.{name}.total_time cannot be 0");
                contains_error = true;
            }
        }

        if self.monitor.interval == 0 {
            error!("monitor.interval cannot be 0, the monitor would poll without pause");
            contains_error = true;
        }

        contains_error
    }
}

fn default_executor() -> String {
    "ssh".to_owned()
}

fn default_user() -> String {
    "root".to_owned()
}

fn default_port() -> u16 {
    22
}

fn default_vmdb_dir() -> String {
    "/var/www/miq/vmdb".to_owned()
}

fn default_version() -> String {
    "unknown".to_owned()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_tool_interval() -> u64 {
    1
}

fn default_settle_time() -> u64 {
    5
}

pub fn default_tools() -> Vec<String> {
    ["mpstat", "iostat", "sar", "vmstat", "pidstat"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_agent_dir() -> String {
    "/var/lib/pbench-agent".to_owned()
}

fn default_install_dir() -> String {
    "/opt/pbench-agent".to_owned()
}

fn default_package() -> String {
    "pbench-agent-internal".to_owned()
}

fn default_require() -> Vec<String> {
    vec!["miq-process".to_owned()]
}

fn default_log_level() -> u8 {
    1
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_grafana_port() -> u16 {
    3000
}

fn default_dashboard() -> String {
    "cfme-general-system-performance".to_owned()
}
