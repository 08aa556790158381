use apbench_runner::{
    benchmark::{run_benchmark, BenchmarkError, BenchmarkPlan, BenchmarkSession},
    catalog::{CatalogError, ProviderCatalog},
    config::{ConfigErrors, PerfConfig},
    executors::Executors,
    scenario::{self, Scenario},
    workload::{idle_workload, Workload, WorkloadError},
};
use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Benchmark(#[from] BenchmarkError),
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Benchmark and workload driver for appliance performance testing"
)]
struct Cli {
    /// Log debug output, RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print generated provider scenarios, one per line
    Scenarios {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(value_enum)]
        kind: ScenarioKind,
    },
    /// Run an instrumented benchmark for every selected provider
    Benchmark {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        feature: String,
        #[arg(long)]
        test: String,
        /// Untimed Ruby, `{provider}` is replaced with the provider name
        #[arg(long, default_value = "")]
        setup: String,
        /// Timed Ruby, `{provider}` is replaced with the provider name
        #[arg(long)]
        timed: String,
        /// Overrides the iterations configured for feature and test
        #[arg(long)]
        iterations: Option<usize>,
        /// Provider ids, defaults to every benchmark provider
        #[arg(long = "provider")]
        providers: Vec<String>,
        /// Time all iterations in one process and report them as one series
        #[arg(long)]
        array: bool,
    },
    /// Run a script printing `[t1, t2, ...]` and report the timings
    BenchmarkArray {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        feature: String,
        #[arg(long)]
        test: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        script: String,
    },
    /// Run a configured workload under the memory monitor
    Workload {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "all-roles")]
        test: String,
        #[arg(long, default_value = "No Providers")]
        providers: String,
        /// Overrides the configured total time in seconds
        #[arg(long)]
        duration: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScenarioKind {
    Provisioning,
    Smartstate,
    CapAndUtil,
    AllWorkload,
    Benchmark,
    SmartstateBenchmark,
    Vmware,
    Rhevm,
    Nobroker,
    ConfigManagers,
}

impl ScenarioKind {
    fn generate(self, catalog: &ProviderCatalog) -> Vec<Scenario> {
        let singles = |providers: Vec<String>| -> Vec<Scenario> {
            providers.into_iter().map(|id| vec![id]).collect()
        };

        match self {
            Self::Provisioning => scenario::provisioning_memory_scenarios(catalog),
            Self::Smartstate => scenario::smartstate_memory_scenarios(catalog),
            Self::CapAndUtil => scenario::cap_and_util_memory_scenarios(catalog),
            Self::AllWorkload => scenario::all_workload_memory_scenarios(catalog),
            Self::Benchmark => singles(scenario::benchmark_providers(catalog)),
            Self::SmartstateBenchmark => singles(scenario::smartstate_benchmark_providers(catalog)),
            Self::Vmware => singles(scenario::vmware_benchmark_providers(catalog)),
            Self::Rhevm => singles(scenario::rhevm_benchmark_providers(catalog)),
            Self::Nobroker => singles(scenario::nobroker_benchmark_providers(catalog)),
            Self::ConfigManagers => singles(scenario::config_manager_benchmark_providers(catalog)),
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &PathBuf) -> Result<(PerfConfig, Executors), RunnerError> {
    let config = PerfConfig::load(path)?;
    let executor = Executors::load(&config.appliance)?;

    Ok((config, executor))
}

#[allow(clippy::too_many_arguments)]
fn benchmark(
    config: PathBuf,
    catalog: PathBuf,
    feature: String,
    test: String,
    setup: String,
    timed: String,
    iterations: Option<usize>,
    providers: Vec<String>,
    array: bool,
) -> Result<(), RunnerError> {
    let (config, executor) = load_config(&config)?;
    let catalog = ProviderCatalog::load(&catalog)?;

    let plan = BenchmarkPlan {
        feature: &feature,
        test: &test,
        setup: &setup,
        timed: &timed,
        iterations: iterations.unwrap_or_else(|| config.iterations(&feature, &test)),
        providers,
        array,
    };
    let session = BenchmarkSession::new(executor, &config, &feature);
    run_benchmark(session, &catalog, &plan)?;

    Ok(())
}

fn run(cli: Cli) -> Result<(), RunnerError> {
    match cli.command {
        Commands::Scenarios { catalog, kind } => {
            let catalog = ProviderCatalog::load(&catalog)?;

            for scenario in kind.generate(&catalog) {
                println!("{}", scenario.iter().join(","));
            }
        }
        Commands::Benchmark {
            config,
            catalog,
            feature,
            test,
            setup,
            timed,
            iterations,
            providers,
            array,
        } => benchmark(
            config, catalog, feature, test, setup, timed, iterations, providers, array,
        )?,
        Commands::BenchmarkArray {
            config,
            feature,
            test,
            provider,
            script,
        } => {
            let (config, executor) = load_config(&config)?;
            let mut session = BenchmarkSession::new(executor, &config, &feature);

            session.run_array(&feature, &test, &provider, &script)?;
        }
        Commands::Workload {
            config,
            name,
            test,
            providers,
            duration,
        } => {
            let (config, executor) = load_config(&config)?;
            let workload = Workload {
                name: &name,
                test: &test,
                providers_tested: &providers,
            };

            let report = idle_workload(Arc::new(executor), &config, &workload, duration)?;
            info!(
                "Workload {name} collected {} memory samples",
                report.samples.len()
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = ?error, "{error}");
            ExitCode::FAILURE
        }
    }
}
