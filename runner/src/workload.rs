use crate::{
    config::{GrafanaConfig, PerfConfig},
    executors::{RemoteError, RemoteExecutor},
    monitor::{MemoryMonitor, MonitorError, MonitorReport},
};
use chrono::Utc;
use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

const WORKLOAD_DIRECTORY: &str = "workload";
const PROGRESS_INTERVAL: Duration = Duration::from_secs(300);
const SETUP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Workload {0} is not configured")]
    Unknown(String),
    #[error("Memory monitor failed")]
    Monitor(#[from] MonitorError),
    #[error("Workload step failed")]
    Remote(#[from] RemoteError),
}

/// Labels of one monitored workload scenario
#[derive(Debug, Clone)]
pub struct Workload<'a> {
    pub name: &'a str,
    pub test: &'a str,
    pub providers_tested: &'a str,
}

impl Workload<'_> {
    /// `<log_dir>/workload/<name>-<test>-memory.csv`
    pub fn monitor_path(&self, config: &PerfConfig) -> PathBuf {
        config
            .output
            .log_dir
            .join(WORKLOAD_DIRECTORY)
            .join(format!("{}-{}-memory.csv", self.name, self.test))
    }
}

/// Block the caller for `seconds`
pub fn idle_time(seconds: u64, message: &str) {
    info!("Sleeping {seconds}s for {message}");
    thread::sleep(Duration::from_secs(seconds));
}

/// Sleep `total` in slices, logging progress after each
pub fn wait_total_time(total: Duration, slice: Duration) {
    let start = Instant::now();

    loop {
        let waited = start.elapsed();
        if waited >= total {
            break;
        }

        info!(
            "Time waited: {:.2}/{}",
            waited.as_secs_f64(),
            total.as_secs()
        );
        thread::sleep((total - waited).min(slice));
    }
}

/// Dashboard link covering `from_ms..to_ms` for the appliance node
pub fn grafana_url(
    grafana: Option<&GrafanaConfig>,
    node: Option<&str>,
    from_ms: i64,
    to_ms: i64,
) -> String {
    let (address, port, dashboard) = match grafana {
        Some(grafana) => (
            grafana.ip_address.as_str(),
            grafana.port,
            grafana.dashboard.as_str(),
        ),
        None => ("unset", 3000, "cfme-general-system-performance"),
    };
    let node = node
        .map(|name| name.replace('.', ""))
        .unwrap_or_else(|| "undefined".to_owned());

    format!(
        "http://{address}:{port}/dashboard/db/{dashboard}?from={from_ms}&to={to_ms}&var-Node={node}"
    )
}

/// Run `body` while the appliance memory is monitored.
///
/// The monitor is stopped and the dashboard link logged whether or not
/// `body` succeeds; a failing body wins over a failing monitor.
#[instrument(skip(executor, config, body), level = "info")]
pub fn run_workload<E, F>(
    executor: Arc<E>,
    config: &PerfConfig,
    workload: &Workload,
    body: F,
) -> Result<MonitorReport, WorkloadError>
where
    E: RemoteExecutor + Send + Sync + 'static,
    F: FnOnce(&E) -> Result<(), WorkloadError>,
{
    let from_ms = Utc::now().timestamp_millis();
    info!(
        "Running {} {} with {}",
        workload.name, workload.test, workload.providers_tested
    );

    let monitor = MemoryMonitor::start(
        executor.clone(),
        Duration::from_secs(config.monitor.interval),
        &workload.monitor_path(config),
    )?;

    let outcome = body(executor.as_ref());

    let cleanup = Instant::now();
    debug!("Started cleaning up monitoring thread.");
    let report = monitor.stop();
    info!(
        "Finished cleaning up monitoring thread in {:?}",
        cleanup.elapsed()
    );
    info!(
        "Grafana URL: {}",
        grafana_url(
            config.grafana.as_ref(),
            config.appliance.vm_name.as_deref(),
            from_ms,
            Utc::now().timestamp_millis(),
        )
    );

    match (outcome, report) {
        (Ok(()), report) => Ok(report?),
        (Err(error), Ok(_)) => Err(error),
        (Err(error), Err(monitor_error)) => {
            error!(error = ?monitor_error, "Memory monitor failed during a failed workload");
            Err(error)
        }
    }
}

/// Prepare the appliance with the configured setup commands, then leave it
/// alone for the configured total time
pub fn idle_workload<E>(
    executor: Arc<E>,
    config: &PerfConfig,
    workload: &Workload,
    total_time: Option<u64>,
) -> Result<MonitorReport, WorkloadError>
where
    E: RemoteExecutor + Send + Sync + 'static,
{
    let settings = config
        .workload
        .get(workload.name)
        .ok_or_else(|| WorkloadError::Unknown(workload.name.to_owned()))?;
    let total = Duration::from_secs(total_time.unwrap_or(settings.total_time));

    run_workload(executor, config, workload, |executor| {
        for command in settings.setup.iter() {
            executor.run_checked(command, Some(SETUP_TIMEOUT))?;
        }
        if settings.warmup > 0 {
            idle_time(settings.warmup, "Post setup.");
        }

        info!("Idling appliance for {}s", total.as_secs());
        wait_total_time(total, PROGRESS_INTERVAL);
        info!("Test Ending...");

        Ok(())
    })
}
