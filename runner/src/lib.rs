pub mod benchmark;
pub mod catalog;
pub mod codegen;
pub mod config;
pub mod executors;
pub mod monitor;
pub mod pbench;
pub mod scenario;
pub mod workload;
