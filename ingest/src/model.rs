use std::{collections::BTreeMap, fmt};

/// A single recorded measurement value
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// byte counts and their MiB derivatives
    Integer(i64),
    /// timings in seconds
    Float(f64),
    /// opaque text such as GC statistic blobs
    Text(String),
}

impl Sample {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            // Debug keeps the trailing `.0` on whole floats
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Sample {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Sample {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Sample {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Composite (feature, test, provider, measurement) key of a series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub feature: String,
    pub test: String,
    pub provider: String,
    pub measurement: String,
}

impl SeriesKey {
    pub fn new(
        feature: impl Into<String>,
        test: impl Into<String>,
        provider: impl Into<String>,
        measurement: impl Into<String>,
    ) -> Self {
        Self {
            feature: feature.into(),
            test: test.into(),
            provider: provider.into(),
            measurement: measurement.into(),
        }
    }

    /// `<feature>-<test>-<provider>-<measurement>`, used as raw dump file stem
    pub fn stem(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.feature, self.test, self.provider, self.measurement
        )
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Append-only, chronologically ordered samples sharing one key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// A series is textual when its first sample is text
    pub fn is_textual(&self) -> bool {
        self.samples.first().is_some_and(Sample::is_text)
    }

    /// Numeric view of the series, text samples are skipped
    pub fn numbers(&self) -> Vec<f64> {
        self.samples.iter().filter_map(Sample::as_f64).collect()
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self {
            samples: values.into_iter().map(Sample::Float).collect(),
        }
    }
}

impl FromIterator<Sample> for Series {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Benchmark values store.
///
/// One flat key space of [`SeriesKey`] to [`Series`]. Keys are created on first
/// insert and never removed, iteration follows first insertion.
#[derive(Debug, Default)]
pub struct BenchmarkValues {
    index: BTreeMap<SeriesKey, usize>,
    entries: Vec<(SeriesKey, Series)>,
}

impl BenchmarkValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// append a sample, creating the series if this key is new
    pub fn record(
        &mut self,
        feature: &str,
        test: &str,
        provider: &str,
        measurement: &str,
        value: impl Into<Sample>,
    ) {
        let key = SeriesKey::new(feature, test, provider, measurement);
        self.series_mut(key).push(value.into());
    }

    pub fn series(&self, key: &SeriesKey) -> Option<&Series> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SeriesKey, &Series)> {
        self.entries.iter().map(|(key, series)| (key, series))
    }

    /// number of distinct series
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn series_mut(&mut self, key: SeriesKey) -> &mut Series {
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.entries.push((key.clone(), Series::new()));
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        &mut self.entries[position].1
    }
}
