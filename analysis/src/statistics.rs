/// precision used for summaries that are only logged
pub const SUMMARY_DECIMALS: u32 = 2;
/// precision used for the persisted statistics rows
pub const REPORT_DECIMALS: u32 = 4;

/// Descriptive statistics over a non-empty numeric series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub count: usize,
    pub minimum: f64,
    pub average: f64,
    pub median: f64,
    pub maximum: f64,
    pub stddev: f64,
    pub percentile90: f64,
    pub percentile99: f64,
}

/// Result of summarizing a series.
///
/// An empty series is not an error, it reports as six zeros
/// (count, min, avg, median, max, stddev) without percentiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Summary {
    Empty,
    Computed(Statistics),
}

impl Summary {
    /// values in report order: count, min, avg, median, max, stddev[, p90, p99]
    pub fn fields(&self) -> Vec<f64> {
        match self {
            Self::Empty => vec![0.0; 6],
            Self::Computed(stats) => vec![
                stats.count as f64,
                stats.minimum,
                stats.average,
                stats.median,
                stats.maximum,
                stats.stddev,
                stats.percentile90,
                stats.percentile99,
            ],
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Computed(stats) => stats.count,
        }
    }

    /// `min/avg/med/max/stddev/90/99` as logged after each report
    pub fn log_line(&self) -> String {
        self.fields()
            .iter()
            .skip(1)
            .map(|value| format!("{value:?}"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

pub fn round(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);

    (value * factor).round() / factor
}

/// Linear interpolation between the closest ranks of a sorted slice
fn percentile(sorted: &[f64], percent: f64) -> f64 {
    let rank = percent / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// Compute count, min, mean, median, max, population stddev, p90 and p99
pub fn generate_statistics(values: &[f64], decimals: u32) -> Summary {
    if values.is_empty() {
        return Summary::Empty;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let average = sorted.iter().sum::<f64>() / count as f64;
    let variance = sorted
        .iter()
        .map(|value| (value - average).powi(2))
        .sum::<f64>()
        / count as f64;

    Summary::Computed(Statistics {
        count,
        minimum: round(sorted[0], decimals),
        average: round(average, decimals),
        median: round(percentile(&sorted, 50.0), decimals),
        maximum: round(sorted[count - 1], decimals),
        stddev: round(variance.sqrt(), decimals),
        percentile90: round(percentile(&sorted, 90.0), decimals),
        percentile99: round(percentile(&sorted, 99.0), decimals),
    })
}
