use super::*;
use crate::{catalog::ProviderCatalog, executors::scripted::ScriptedExecutor};
use apbench_ingest::SeriesKey;
use std::fs;

const RECORD: &str = "Loading production environment\n\
                      104857600, 157286400, 52428800\n\
                      209715200, 314572800, 104857600\n\
                      {:count=>1}\n\
                      {:count=>2}\n\
                      Process Pid: 4242\n\
                      4.567\n";

fn config(log_dir: &tempfile::TempDir, pbench_disabled: bool) -> PerfConfig {
    PerfConfig::from_yaml(&format!(
        "appliance:\n  host: 10.8.58.12\n  version: 5.5.2.4\noutput:\n  log_dir: {}\npbench:\n  disable: {pbench_disabled}\n  settle_time: 0\n",
        log_dir.path().display()
    ))
    .unwrap()
}

fn iteration(index: usize) -> Iteration<'static> {
    Iteration {
        feature: "Refresh",
        test: "Provider-Init",
        provider: "vSphere 6",
        index,
        setup: "e = ExtManagementSystem.find_by_name('vSphere 6');",
        timed: "EmsRefresh.refresh e;",
    }
}

#[test]
pub fn iteration_id_is_zero_padded() {
    assert_eq!(iteration(7).id(), "Provider-Init-vSphere 6-0007");
}

#[test]
pub fn iteration_is_bracketed_and_recorded() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, RECORD);

    let mut session = BenchmarkSession::new(&executor, &config(&log_dir, false), "Refresh");
    let parsed = session.run_iteration(&iteration(0)).unwrap().unwrap();
    assert_eq!(parsed.timing, 4.567);

    let commands = executor.commands();
    let position = |prefix: &str| {
        commands
            .iter()
            .position(|command| command.starts_with(prefix))
            .unwrap()
    };
    assert!(position("start-tools") < position("cd /var/www/miq/vmdb; bin/rails runner"));
    assert!(position("cd /var/www/miq/vmdb; bin/rails runner") < position("stop-tools"));
    assert!(commands
        .iter()
        .any(|command| command.ends_with("--iteration=Provider-Init-vSphere_6-0000")));

    // the raw output is stored next to the tool data
    let uploads = executor.uploads();
    assert_eq!(uploads[0].1, RECORD);
    assert!(uploads[0].2.starts_with(&format!("/var/lib/pbench-agent/{}/", session.run_id())));

    let key = SeriesKey::new("Refresh", "Provider-Init", "vSphere 6", "rss_total_MiB");
    assert_eq!(session.values().series(&key).unwrap().numbers(), vec![150.0]);
    assert_eq!(session.values().len(), 14);
}

#[test]
pub fn unparseable_output_skips_iteration() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 1, "NameError: uninitialized constant MiqProcess");

    let mut session = BenchmarkSession::new(&executor, &config(&log_dir, false), "Refresh");

    assert!(session.run_iteration(&iteration(0)).unwrap().is_none());
    assert!(session.values().is_empty());
    // pbench was still stopped
    assert!(executor
        .commands()
        .iter()
        .any(|command| command.starts_with("postprocess-tools")));
}

#[test]
pub fn finish_reports_and_moves_results() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, RECORD);

    let mut session = BenchmarkSession::new(&executor, &config(&log_dir, false), "Refresh");
    for index in 0..3 {
        session.run_iteration(&iteration(index)).unwrap();
    }
    let values = session.finish().unwrap();

    let key = SeriesKey::new("Refresh", "Provider-Init", "vSphere 6", "timing");
    assert_eq!(values.series(&key).unwrap().len(), 3);
    assert_eq!(executor.commands().last().unwrap(), "move-results");

    let statistics = fs::read_to_string(
        log_dir
            .path()
            .join("csv_output/benchmark-timing-statistics.csv"),
    )
    .unwrap();
    assert!(statistics.ends_with(
        "5.5.2.4,Refresh,Provider-Init,vSphere 6,3,4.567,4.567,4.567,4.567,0.0,4.567,4.567\r\n"
    ));
    assert!(log_dir.path().join("csv_output/benchmark-gc_stat.csv").is_file());
}

#[test]
pub fn disabled_pbench_only_runs_the_benchmark() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, RECORD);

    let mut session = BenchmarkSession::new(&executor, &config(&log_dir, true), "Refresh");
    session.run_iteration(&iteration(0)).unwrap();
    session.finish().unwrap();

    assert_eq!(executor.commands().len(), 1);
    assert!(executor.uploads().is_empty());
}

#[test]
pub fn array_series_is_reported_directly() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, "noise\n[1.1, 2.2, 3.3]\n");

    let mut session = BenchmarkSession::new(&executor, &config(&log_dir, true), "Refresh");
    let summary = session
        .run_repetitions(&iteration(0), 3)
        .unwrap()
        .unwrap();

    assert_eq!(summary.count(), 3);
    assert!(session.values().is_empty());
    assert_eq!(
        fs::read_to_string(
            log_dir
                .path()
                .join("csv_output/Refresh-Provider-Init-vSphere 6-timing.csv")
        )
        .unwrap(),
        "Refresh-Provider-Init-vSphere 6-timing\n1.1\n2.2\n3.3\n"
    );
}

#[test]
pub fn array_garbage_is_an_error() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, "undefined method `times'");

    let mut session = BenchmarkSession::new(&executor, &config(&log_dir, true), "Refresh");

    assert!(matches!(
        session.run_array("Refresh", "Provider-Delta", "vSphere 6", "r"),
        Err(BenchmarkError::Parse(_))
    ));
}

const LAB: &str = "
management_systems:
  p1: {name: P1, tags: [benchmark]}
  p2: {name: P2, tags: [benchmark]}
  ec2: {name: EC2, tags: [benchmark, benchmark_provisioning]}
";

fn plan(array: bool, providers: &[&str]) -> BenchmarkPlan<'static> {
    BenchmarkPlan {
        feature: "Refresh",
        test: "Provider-Init",
        setup: "e = ExtManagementSystem.find_by_name('{provider}');",
        timed: "EmsRefresh.refresh e;",
        iterations: 2,
        providers: providers.iter().map(|id| id.to_string()).collect(),
        array,
    }
}

#[test]
pub fn failed_provider_does_not_lose_earlier_results() {
    let log_dir = tempfile::tempdir().unwrap();
    let catalog = ProviderCatalog::from_yaml(LAB).unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, RECORD);
    executor.respond("--iteration=Provider-Init-P2", 1, "pbench-start-tools: failed");

    let session = BenchmarkSession::new(&executor, &config(&log_dir, false), "Refresh");
    let result = run_benchmark(session, &catalog, &plan(false, &[]));

    assert!(matches!(
        result,
        Err(BenchmarkError::Failed {
            failed: 2,
            attempted: 4
        })
    ));

    // p2 failed after p1 ran, p1 is still reported and results moved
    let statistics = fs::read_to_string(
        log_dir
            .path()
            .join("csv_output/benchmark-timing-statistics.csv"),
    )
    .unwrap();
    assert!(statistics.contains("5.5.2.4,Refresh,Provider-Init,P1,2,4.567,"));
    assert!(!statistics.contains(",P2,"));
    assert_eq!(executor.commands().last().unwrap(), "move-results");
}

#[test]
pub fn default_providers_skip_provisioning_ones() {
    let log_dir = tempfile::tempdir().unwrap();
    let catalog = ProviderCatalog::from_yaml(LAB).unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, RECORD);

    let session = BenchmarkSession::new(&executor, &config(&log_dir, true), "Refresh");
    let values = run_benchmark(session, &catalog, &plan(false, &[])).unwrap();

    let runs = executor.commands();
    assert_eq!(runs.len(), 4);
    assert!(runs[0].contains("find_by_name('P1')"));
    assert!(runs[3].contains("find_by_name('P2')"));
    assert!(!runs.iter().any(|command| command.contains("EC2")));

    let key = SeriesKey::new("Refresh", "Provider-Init", "P2", "timing");
    assert_eq!(values.series(&key).unwrap().len(), 2);
}

#[test]
pub fn array_plan_times_each_provider_in_one_process() {
    let log_dir = tempfile::tempdir().unwrap();
    let catalog = ProviderCatalog::from_yaml(LAB).unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("bin/rails runner", 0, "[1.0, 2.0]\n");
    executor.respond("find_by_name('P1')", 0, "undefined method `find_by_name'");

    let session = BenchmarkSession::new(&executor, &config(&log_dir, true), "Refresh");
    let result = run_benchmark(session, &catalog, &plan(true, &["p1", "p2"]));

    assert!(matches!(
        result,
        Err(BenchmarkError::Failed {
            failed: 1,
            attempted: 2
        })
    ));

    let runs = executor.commands();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|command| command.contains("2.times")));
    assert_eq!(
        fs::read_to_string(
            log_dir
                .path()
                .join("csv_output/Refresh-Provider-Init-P2-timing.csv")
        )
        .unwrap(),
        "Refresh-Provider-Init-P2-timing\n1.0\n2.0\n"
    );
}

#[test]
pub fn no_benchmark_providers() {
    let log_dir = tempfile::tempdir().unwrap();
    let catalog = ProviderCatalog::from_yaml("management_systems:\n  ec2: {name: EC2}\n").unwrap();
    let executor = ScriptedExecutor::new();

    let session = BenchmarkSession::new(&executor, &config(&log_dir, true), "Refresh");

    assert!(matches!(
        run_benchmark(session, &catalog, &plan(false, &[])),
        Err(BenchmarkError::NoProviders(_))
    ));
    assert!(executor.commands().is_empty());
}
