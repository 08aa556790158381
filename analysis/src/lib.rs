pub mod report;
pub mod statistics;

pub use report::{ReportError, Reporter};
pub use statistics::{generate_statistics, Statistics, Summary, REPORT_DECIMALS, SUMMARY_DECIMALS};
