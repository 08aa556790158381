use crate::model::{BenchmarkValues, Sample, Series, SeriesKey};
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;
use tracing::{error, info};

/// number of trailing lines an instrumented benchmark prints
pub const RECORD_LINES: usize = 6;
pub const BYTES_PER_MIB: i64 = 1024 * 1024;
pub const TIMING: &str = "timing";
pub const GC_STAT: &str = "gc_stat";

#[derive(Debug, Error)]
pub enum MeasurementParseError {
    #[error("Expected at least {expected} output lines but found {found}")]
    InsufficientLines { expected: usize, found: usize },
    #[error("Elapsed time '{line}' is not a number")]
    Timing {
        line: String,
        source: ParseFloatError,
    },
    #[error("Memory line '{line}' is not a start, end, change triple")]
    MemoryTriple { line: String },
    #[error("Memory value '{value}' is not an integer")]
    MemoryValue {
        value: String,
        source: ParseIntError,
    },
    #[error("Timing array '{line}' contains the non number '{item}'")]
    Array {
        line: String,
        item: String,
        source: ParseFloatError,
    },
}

/// start, end and change of one memory counter in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTriple {
    pub start: i64,
    pub end: i64,
    pub change: i64,
}

impl MemoryTriple {
    fn parse(line: &str) -> Result<Self, MeasurementParseError> {
        let values = line
            .split(',')
            .map(|value| {
                value
                    .trim()
                    .parse::<i64>()
                    .map_err(|source| MeasurementParseError::MemoryValue {
                        value: value.trim().to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match values[..] {
            [start, end, change] => Ok(Self { start, end, change }),
            _ => Err(MeasurementParseError::MemoryTriple {
                line: line.to_owned(),
            }),
        }
    }
}

/// Floor division into MiB, negative changes round toward negative infinity
pub fn to_mib(bytes: i64) -> i64 {
    bytes.div_euclid(BYTES_PER_MIB)
}

/// Decoded trailing record of an instrumented benchmark run.
///
/// Layout of the last six lines, everything before them is console noise:
///
/// ```text
/// rss_start, rss_end, rss_change
/// vmem_start, vmem_end, vmem_change
/// <GC.stat before>
/// <GC.stat after>
/// Process Pid: <pid>
/// <elapsed seconds>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOutput {
    pub rss: MemoryTriple,
    pub vmem: MemoryTriple,
    pub gc_start: String,
    pub gc_end: String,
    pub pid: String,
    pub timing: f64,
}

impl BenchmarkOutput {
    pub fn parse(output: &str) -> Result<Self, MeasurementParseError> {
        let lines: Vec<&str> = output.trim().split('\n').collect();
        let insufficient = MeasurementParseError::InsufficientLines {
            expected: RECORD_LINES,
            found: lines.len(),
        };

        let Some(record) = lines.len().checked_sub(RECORD_LINES).map(|skip| &lines[skip..])
        else {
            return Err(insufficient);
        };
        let &[rss, vmem, gc_start, gc_end, pid, timing] = record else {
            return Err(insufficient);
        };

        Ok(Self {
            timing: parse_timing_line(timing)?,
            pid: pid.trim().to_owned(),
            gc_end: gc_end.to_owned(),
            gc_start: gc_start.to_owned(),
            vmem: MemoryTriple::parse(vmem)?,
            rss: MemoryTriple::parse(rss)?,
        })
    }

    /// both GC blobs joined the way they are reported
    pub fn gc_stat(&self) -> String {
        format!("{}\n{}", self.gc_start, self.gc_end)
    }

    /// measurement name and value pairs in report order
    pub fn measurements(&self) -> Vec<(&'static str, Sample)> {
        let (rss, vmem) = (&self.rss, &self.vmem);

        vec![
            (TIMING, Sample::Float(self.timing)),
            ("rss_start", Sample::Integer(rss.start)),
            ("rss_start_MiB", Sample::Integer(to_mib(rss.start))),
            ("rss_total", Sample::Integer(rss.end)),
            ("rss_total_MiB", Sample::Integer(to_mib(rss.end))),
            ("rss_change", Sample::Integer(rss.change)),
            ("rss_change_MiB", Sample::Integer(to_mib(rss.change))),
            ("vmem_start", Sample::Integer(vmem.start)),
            ("vmem_start_MiB", Sample::Integer(to_mib(vmem.start))),
            ("vmem_total", Sample::Integer(vmem.end)),
            ("vmem_total_MiB", Sample::Integer(to_mib(vmem.end))),
            ("vmem_change", Sample::Integer(vmem.change)),
            ("vmem_change_MiB", Sample::Integer(to_mib(vmem.change))),
            (GC_STAT, Sample::Text(self.gc_stat())),
        ]
    }

    /// append every measurement of this run to the store
    pub fn record_into(
        &self,
        values: &mut BenchmarkValues,
        feature: &str,
        test: &str,
        provider: &str,
    ) {
        for (measurement, sample) in self.measurements() {
            values.record(feature, test, provider, measurement, sample);
        }
    }

    fn log(&self, iteration: usize) {
        info!("Iteration: {iteration}, Timing: {}, {}", self.timing, self.pid);
        info!(
            "RSS Memory start: {}, end: {}, change: {}",
            self.rss.start, self.rss.end, self.rss.change
        );
        info!(
            "Virt Memory start: {}, end: {}, change: {}",
            self.vmem.start, self.vmem.end, self.vmem.change
        );
        info!("GC stat start: {}", self.gc_start);
        info!("GC stat end: {}", self.gc_end);
        info!(
            "RSS Mem Total(Console + Benchmark) Used: {} MiB",
            self.rss.end as f64 / BYTES_PER_MIB as f64
        );
        info!(
            "RSS Mem Change(Benchmark) Used: {} MiB",
            self.rss.change as f64 / BYTES_PER_MIB as f64
        );
        info!(
            "Virt Mem Total(Console + Benchmark) Used: {} MiB",
            self.vmem.end as f64 / BYTES_PER_MIB as f64
        );
        info!(
            "Virt Mem Change(Benchmark) Used: {} MiB",
            self.vmem.change as f64 / BYTES_PER_MIB as f64
        );
    }
}

fn parse_timing_line(line: &str) -> Result<f64, MeasurementParseError> {
    line.trim()
        .parse::<f64>()
        .map_err(|source| MeasurementParseError::Timing {
            line: line.to_owned(),
            source,
        })
}

/// Elapsed time printed on the last output line
pub fn parse_timing(output: &str) -> Result<f64, MeasurementParseError> {
    let last = output.trim().split('\n').last().unwrap_or_default();

    parse_timing_line(last)
}

/// Parse an instrumented run and record all of its measurements.
///
/// On failure the unexpected output is logged and nothing is recorded, the
/// caller decides whether to carry on with the next iteration.
#[tracing::instrument(level = "debug", skip(output, values))]
pub fn parse_benchmark_output(
    output: &str,
    feature: &str,
    test: &str,
    provider: &str,
    iteration: usize,
    values: &mut BenchmarkValues,
) -> Result<BenchmarkOutput, MeasurementParseError> {
    match BenchmarkOutput::parse(output) {
        Ok(parsed) => {
            parsed.log(iteration);
            parsed.record_into(values, feature, test, provider);

            Ok(parsed)
        }
        Err(error) => {
            error!(error = %error, "Unexpected Output: {output}");

            Err(error)
        }
    }
}

/// Parse a trailing `[t1, t2, ...]` line into a complete timing series
pub fn parse_benchmark_array(
    output: &str,
    feature: &str,
    test: &str,
    provider: &str,
) -> Result<(SeriesKey, Series), MeasurementParseError> {
    let line = output.trim().split('\n').last().unwrap_or_default();
    let stripped = line.replace(['[', ']'], "");

    let timings = stripped
        .split(',')
        .map(|item| {
            item.trim()
                .parse::<f64>()
                .map_err(|source| MeasurementParseError::Array {
                    line: line.to_owned(),
                    item: item.trim().to_owned(),
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((
        SeriesKey::new(feature, test, provider, TIMING),
        Series::from(timings),
    ))
}
