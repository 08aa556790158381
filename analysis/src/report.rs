use crate::statistics::{generate_statistics, Summary, REPORT_DECIMALS};
use apbench_ingest::{BenchmarkValues, Series, SeriesKey};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub const CSV_DIRECTORY: &str = "csv_output";
pub const STATISTICS_HEADER: [&str; 12] = [
    "version",
    "feature",
    "test",
    "provider",
    "iterations",
    "minimum",
    "average",
    "median",
    "maximum",
    "stddev",
    "90th",
    "99th",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file {path}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Failed to write statistics row")]
    Csv(#[from] csv::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ReportError + '_ {
    move |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes raw samples and rolling statistics of benchmark series to CSV files
#[derive(Debug, Clone)]
pub struct Reporter {
    directory: PathBuf,
    version: String,
}

impl Reporter {
    /// reports land in `<log_dir>/csv_output`, rows are tagged with `version`
    pub fn new(log_dir: impl AsRef<Path>, version: impl Into<String>) -> Self {
        Self {
            directory: log_dir.as_ref().join(CSV_DIRECTORY),
            version: version.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `benchmark-<measurement>.csv`, raw lines of textual series
    pub fn text_path(&self, measurement: &str) -> PathBuf {
        self.directory.join(format!("benchmark-{measurement}.csv"))
    }

    /// `<feature>-<test>-<provider>-<measurement>.csv`, overwritten each report
    pub fn raw_path(&self, key: &SeriesKey) -> PathBuf {
        self.directory.join(format!("{}.csv", key.stem()))
    }

    /// `benchmark-<measurement>-statistics.csv`, one row appended per report
    pub fn statistics_path(&self, measurement: &str) -> PathBuf {
        self.directory
            .join(format!("benchmark-{measurement}-statistics.csv"))
    }

    /// Persist one series.
    ///
    /// Textual series are appended verbatim and yield `None`; numeric series get
    /// a raw dump plus a statistics row and yield their summary.
    #[instrument(skip(self, series), fields(samples = series.len()), level = "debug")]
    pub fn report(
        &self,
        key: &SeriesKey,
        series: &Series,
    ) -> Result<Option<Summary>, ReportError> {
        fs::create_dir_all(&self.directory).map_err(io_error(&self.directory))?;

        if series.is_textual() {
            self.append_text(key, series)?;

            return Ok(None);
        }

        let values = series.numbers();
        self.dump_raw(key, series)?;

        let summary = generate_statistics(&values, REPORT_DECIMALS);
        self.append_statistics(key, &summary)?;

        info!("Stats (min/avg/med/max/stddev/90/99): {}", summary.log_line());

        Ok(Some(summary))
    }

    /// report every series of a store in insertion order
    pub fn report_all(&self, values: &BenchmarkValues) -> Result<(), ReportError> {
        debug!("Logging {} series", values.len());

        for (key, series) in values.iter() {
            self.report(key, series)?;
        }

        Ok(())
    }

    fn open_append(path: &Path) -> Result<(File, bool), ReportError> {
        let exists = path.is_file();

        if exists {
            debug!("Appending to: {}", path.display());
        } else {
            debug!("Writing to: {}", path.display());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error(path))?;

        Ok((file, exists))
    }

    fn append_text(&self, key: &SeriesKey, series: &Series) -> Result<(), ReportError> {
        let path = self.text_path(&key.measurement);
        let (file, _) = Self::open_append(&path)?;
        let mut writer = BufWriter::new(file);

        for sample in series.samples() {
            write!(
                writer,
                "{},{},{},{}\n{}\n",
                self.version, key.feature, key.test, key.provider, sample
            )
            .map_err(io_error(&path))?;
        }

        writer.flush().map_err(io_error(&path))
    }

    fn dump_raw(&self, key: &SeriesKey, series: &Series) -> Result<(), ReportError> {
        let path = self.raw_path(key);
        let file = File::create(&path).map_err(io_error(&path))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", key.stem()).map_err(io_error(&path))?;
        for sample in series.samples() {
            writeln!(writer, "{sample}").map_err(io_error(&path))?;
        }

        writer.flush().map_err(io_error(&path))
    }

    fn append_statistics(&self, key: &SeriesKey, summary: &Summary) -> Result<(), ReportError> {
        let path = self.statistics_path(&key.measurement);
        let (file, appending) = Self::open_append(&path)?;

        // rows are CRLF terminated like the files downstream tooling already reads
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(file);

        if !appending {
            writer.write_record(STATISTICS_HEADER)?;
        }

        let mut row = vec![
            self.version.clone(),
            key.feature.clone(),
            key.test.clone(),
            key.provider.clone(),
            summary.count().to_string(),
        ];
        match summary {
            Summary::Empty => {
                row.extend(std::iter::repeat("0".to_owned()).take(5));
                // percentiles are not defined for an empty series
                row.extend([String::new(), String::new()]);
            }
            Summary::Computed(_) => {
                row.extend(summary.fields().iter().skip(1).map(|value| format!("{value:?}")));
            }
        }

        writer.write_record(&row)?;
        writer.flush().map_err(io_error(&path))
    }
}
