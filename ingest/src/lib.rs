pub mod model;
pub mod output;

pub use model::{BenchmarkValues, Sample, Series, SeriesKey};
pub use output::{
    parse_benchmark_array, parse_benchmark_output, parse_timing, BenchmarkOutput,
    MeasurementParseError, MemoryTriple,
};
