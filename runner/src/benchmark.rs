use crate::{
    catalog::ProviderCatalog,
    codegen::CodeGenerator,
    config::PerfConfig,
    executors::{rails_runner, RemoteError, RemoteExecutor},
    pbench::{CollectionError, ToolCollection},
    scenario,
};
use apbench_analysis::{ReportError, Reporter, Summary};
use apbench_ingest::{
    parse_benchmark_array, parse_benchmark_output, BenchmarkOutput,
    BenchmarkValues, MeasurementParseError,
};
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Remote execution failed")]
    Remote(#[from] RemoteError),
    #[error("Tool collection failed")]
    Collection(#[from] CollectionError),
    #[error("Failed to persist benchmark results")]
    Report(#[from] ReportError),
    #[error("Benchmark output could not be parsed")]
    Parse(#[from] MeasurementParseError),
    #[error("No providers selected for {0}")]
    NoProviders(String),
    #[error("{failed} of {attempted} benchmark runs failed")]
    Failed { failed: usize, attempted: usize },
}

/// One instrumented run of a benchmark
#[derive(Debug, Clone)]
pub struct Iteration<'a> {
    pub feature: &'a str,
    pub test: &'a str,
    pub provider: &'a str,
    pub index: usize,
    /// untimed Ruby, e.g. looking up the provider
    pub setup: &'a str,
    /// the Ruby being measured
    pub timed: &'a str,
}

impl Iteration<'_> {
    /// `<test>-<provider>-<index:04>`, the pbench iteration name
    pub fn id(&self) -> String {
        format!("{}-{}-{:04}", self.test, self.provider, self.index)
    }
}

/// Owns everything measured during one benchmark run.
///
/// Samples accumulate in memory and are only written by [`finish`](Self::finish),
/// after which pbench results are moved off the appliance.
pub struct BenchmarkSession<E> {
    executor: E,
    generator: CodeGenerator,
    tools: ToolCollection,
    reporter: Reporter,
    values: BenchmarkValues,
    vmdb_dir: String,
    run: String,
}

impl<E: RemoteExecutor> BenchmarkSession<E> {
    pub fn new(executor: E, config: &PerfConfig, feature: &str) -> Self {
        let run = format!(
            "{}-{feature}",
            Utc::now().format("%Y-%m-%d_%H:%M:%S%.6f")
        );

        Self {
            executor,
            generator: CodeGenerator::new(&config.codegen),
            tools: ToolCollection::new(
                config.pbench.clone(),
                config.appliance.version.as_str(),
                &config.output.log_dir,
            ),
            reporter: Reporter::new(&config.output.log_dir, config.appliance.version.as_str()),
            values: BenchmarkValues::new(),
            vmdb_dir: config.appliance.vmdb_dir.clone(),
            run,
        }
    }

    /// pbench run directory shared by every iteration of this session
    pub fn run_id(&self) -> &str {
        &self.run
    }

    pub fn values(&self) -> &BenchmarkValues {
        &self.values
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run one iteration inside the pbench bracket and record its measurements.
    ///
    /// Output that cannot be parsed is logged and skipped so the remaining
    /// iterations still run, remote failures are returned.
    #[instrument(
        skip_all,
        fields(test = iteration.test, provider = iteration.provider, index = iteration.index),
        level = "info"
    )]
    pub fn run_iteration(
        &mut self,
        iteration: &Iteration,
    ) -> Result<Option<BenchmarkOutput>, BenchmarkError> {
        let id = iteration.id();
        let script = self.generator.generate(iteration.setup, iteration.timed);

        self.tools.start(&self.executor, &self.run, &id)?;
        let result = self.executor.run(&rails_runner(&self.vmdb_dir, &script), None);

        let output = match result {
            Ok(ref output) => {
                if !output.success() {
                    warn!(status = output.status, "rails runner exited unsuccessfully");
                }
                output.output.as_str()
            }
            Err(_) => "",
        };

        // collection is stopped even when the run itself failed
        let stopped = self.tools.stop(&self.executor, &self.run, &id, output);
        let output = result?;
        stopped?;

        Ok(parse_benchmark_output(
            &output.output,
            iteration.feature,
            iteration.test,
            iteration.provider,
            iteration.index,
            &mut self.values,
        )
        .ok())
    }

    /// Run a script whose last line is `[t1, t2, ...]` and report that series
    /// on its own, outside of the session store
    #[instrument(skip(self, script), level = "info")]
    pub fn run_array(
        &mut self,
        feature: &str,
        test: &str,
        provider: &str,
        script: &str,
    ) -> Result<Option<Summary>, BenchmarkError> {
        let output = self
            .executor
            .run(&rails_runner(&self.vmdb_dir, script), None)?;

        let (key, series) = parse_benchmark_array(&output.output, feature, test, provider)
            .map_err(|error| {
                error!("Unexpected Output: {}", output.output);
                error
            })?;

        Ok(self.reporter.report(&key, &series)?)
    }

    /// Array form of an instrumented benchmark, `repetitions` timings from one process
    pub fn run_repetitions(
        &mut self,
        iteration: &Iteration,
        repetitions: usize,
    ) -> Result<Option<Summary>, BenchmarkError> {
        let script = self
            .generator
            .generate_array(iteration.setup, iteration.timed, repetitions);

        self.run_array(iteration.feature, iteration.test, iteration.provider, &script)
    }

    /// Report every recorded series, then move the pbench results
    pub fn finish(self) -> Result<BenchmarkValues, BenchmarkError> {
        info!("Reporting {} series of run {}", self.values.len(), self.run);

        self.reporter.report_all(&self.values)?;
        self.tools.move_results(&self.executor)?;

        Ok(self.values)
    }
}

/// What one `benchmark` invocation measures
#[derive(Debug, Clone)]
pub struct BenchmarkPlan<'a> {
    pub feature: &'a str,
    pub test: &'a str,
    /// untimed Ruby, `{provider}` is replaced with the provider name
    pub setup: &'a str,
    /// timed Ruby, `{provider}` is replaced with the provider name
    pub timed: &'a str,
    pub iterations: usize,
    /// provider ids, every benchmark provider of the catalog when empty
    pub providers: Vec<String>,
    /// time all iterations of a provider in one process
    pub array: bool,
}

/// Run `plan` for every selected provider.
///
/// A failed iteration (or array run) is logged and counted, the remaining
/// ones still run and whatever was recorded is always reported before the
/// failures are returned.
#[instrument(skip_all, fields(feature = plan.feature, test = plan.test), level = "info")]
pub fn run_benchmark<E: RemoteExecutor>(
    mut session: BenchmarkSession<E>,
    catalog: &ProviderCatalog,
    plan: &BenchmarkPlan,
) -> Result<BenchmarkValues, BenchmarkError> {
    let providers = if plan.providers.is_empty() {
        scenario::benchmark_providers(catalog)
    } else {
        plan.providers.clone()
    };
    if providers.is_empty() {
        return Err(BenchmarkError::NoProviders(format!(
            "{} {}",
            plan.feature, plan.test
        )));
    }

    info!("Benchmark run {}", session.run_id());
    let mut attempted = 0;
    let mut failed = 0;

    for id in providers.iter() {
        let name = catalog.name(id);
        let setup = plan.setup.replace("{provider}", name);
        let timed = plan.timed.replace("{provider}", name);
        let iteration = |index| Iteration {
            feature: plan.feature,
            test: plan.test,
            provider: name,
            index,
            setup: &setup,
            timed: &timed,
        };

        if plan.array {
            attempted += 1;
            if let Err(error) = session.run_repetitions(&iteration(0), plan.iterations) {
                error!(error = ?error, "Array benchmark of {name} failed");
                failed += 1;
            }
            continue;
        }

        for index in 0..plan.iterations {
            attempted += 1;
            let current = iteration(index);
            if let Err(error) = session.run_iteration(&current) {
                error!(error = ?error, "Iteration {} failed", current.id());
                failed += 1;
            }
        }
    }

    let values = session.finish();
    if failed > 0 {
        if let Err(ref error) = values {
            error!(error = ?error, "Reporting after failed runs failed");
        }
        return Err(BenchmarkError::Failed { failed, attempted });
    }

    values
}

#[cfg(test)]
mod benchmark_test;
