use crate::executors::{RemoteError, RemoteExecutor};
use apbench_analysis::{generate_statistics, Summary, SUMMARY_DECIMALS};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, info, warn};

const MEMINFO_TIMEOUT: Duration = Duration::from_secs(30);
const KIB_PER_MIB: f64 = 1024.0;
pub const MONITOR_HEADER: [&str; 7] = [
    "timestamp",
    "total_mib",
    "free_mib",
    "used_mib",
    "buffers_mib",
    "cached_mib",
    "swap_used_mib",
];

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to create memory monitor output {path}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Failed to write memory sample")]
    Csv(#[from] csv::Error),
    #[error("Failed to spawn the memory monitor thread")]
    Spawn(#[source] io::Error),
    #[error("Memory monitor thread panicked")]
    Panicked,
    #[error("Failed to read /proc/meminfo")]
    Remote(#[from] RemoteError),
    #[error("/proc/meminfo lacks {0}")]
    MissingField(&'static str),
}

/// Cooperative stop signal shared between a worker thread and its owner
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<(Mutex<bool>, Condvar)>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (cancelled, condvar) = &*self.0;
        *cancelled.lock() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0 .0.lock()
    }

    /// Sleep for `timeout` unless cancelled first, returns whether it was cancelled
    pub fn wait(&self, timeout: Duration) -> bool {
        let (cancelled, condvar) = &*self.0;
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = cancelled.lock();

        while !*guard {
            match deadline {
                Some(deadline) => {
                    if condvar.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
                // too far out to represent, only a cancel ends the wait
                None => condvar.wait(&mut guard),
            }
        }

        *guard
    }
}

/// One poll of the appliance memory, all values in MiB
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub total: f64,
    pub free: f64,
    pub used: f64,
    pub buffers: f64,
    pub cached: f64,
    pub swap_used: f64,
}

impl MemorySample {
    /// Decode `/proc/meminfo`, used memory excludes buffers and page cache
    pub fn parse(meminfo: &str, timestamp: DateTime<Utc>) -> Result<Self, MonitorError> {
        let field = |name: &'static str| -> Result<f64, MonitorError> {
            meminfo
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    if key.trim() != name {
                        return None;
                    }
                    value.split_whitespace().next()?.parse::<f64>().ok()
                })
                .map(|kib| kib / KIB_PER_MIB)
                .ok_or(MonitorError::MissingField(name))
        };

        let total = field("MemTotal")?;
        let free = field("MemFree")?;
        let buffers = field("Buffers")?;
        let cached = field("Cached")?;
        let swap_used = field("SwapTotal")? - field("SwapFree")?;

        Ok(Self {
            timestamp,
            total,
            free,
            used: total - free - buffers - cached,
            buffers,
            cached,
            swap_used,
        })
    }

    fn record(&self) -> [String; 7] {
        [
            self.timestamp.to_rfc3339(),
            format!("{:.2}", self.total),
            format!("{:.2}", self.free),
            format!("{:.2}", self.used),
            format!("{:.2}", self.buffers),
            format!("{:.2}", self.cached),
            format!("{:.2}", self.swap_used),
        ]
    }
}

/// What a monitor saw over its lifetime
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub samples: Vec<MemorySample>,
    pub used: Summary,
}

fn poll(executor: &impl RemoteExecutor) -> Result<MemorySample, MonitorError> {
    let output = executor.run_checked("cat /proc/meminfo", Some(MEMINFO_TIMEOUT))?;

    MemorySample::parse(&output.output, Utc::now())
}

/// Handle of a running memory monitor thread
#[derive(Debug)]
pub struct MemoryMonitor {
    token: CancellationToken,
    samples: Arc<Mutex<Vec<MemorySample>>>,
    handle: JoinHandle<Result<(), MonitorError>>,
    path: PathBuf,
}

impl MemoryMonitor {
    /// Start polling every `interval`, writing one CSV row per sample to `path`
    pub fn start<E>(
        executor: Arc<E>,
        interval: Duration,
        path: &Path,
    ) -> Result<Self, MonitorError>
    where
        E: RemoteExecutor + Send + Sync + 'static,
    {
        let io_error = |source| MonitorError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut writer = csv::Writer::from_writer(File::create(path).map_err(io_error)?);
        writer.write_record(MONITOR_HEADER)?;
        writer.flush().map_err(io_error)?;

        let token = CancellationToken::new();
        let samples = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let token = token.clone();
            let samples = samples.clone();

            thread::Builder::new()
                .name("memory-monitor".to_owned())
                .spawn(move || -> Result<(), MonitorError> {
                    debug!("Memory monitor polling every {interval:?}");

                    loop {
                        match poll(&executor) {
                            Ok(sample) => {
                                writer.write_record(sample.record())?;
                                writer.flush().map_err(|error| MonitorError::Csv(error.into()))?;
                                samples.lock().push(sample);
                            }
                            // a missed poll is a gap in the graph, not a failed workload
                            Err(error) => warn!(error = ?error, "Memory poll failed"),
                        }

                        if token.wait(interval) {
                            break;
                        }
                    }

                    Ok(())
                })
                .map_err(MonitorError::Spawn)?
        };

        info!("Memory monitor writing to {}", path.display());

        Ok(Self {
            token,
            samples,
            handle,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// samples collected so far
    pub fn samples(&self) -> Vec<MemorySample> {
        self.samples.lock().clone()
    }

    /// Signal the thread, wait for it and summarize the used memory
    pub fn stop(self) -> Result<MonitorReport, MonitorError> {
        self.token.cancel();
        self.handle.join().map_err(|_| MonitorError::Panicked)??;

        let samples = std::mem::take(&mut *self.samples.lock());
        let used: Vec<f64> = samples.iter().map(|sample| sample.used).collect();
        let summary = generate_statistics(&used, SUMMARY_DECIMALS);

        info!(
            samples = samples.len(),
            "Used memory MiB (min/avg/med/max/stddev/90/99): {}",
            summary.log_line()
        );

        Ok(MonitorReport {
            samples,
            used: summary,
        })
    }
}

#[cfg(test)]
mod monitor_test;
