use super::*;
use crate::executors::scripted::ScriptedExecutor;

const MEMINFO: &str = "MemTotal:        8388608 kB
MemFree:         2097152 kB
MemAvailable:    4194304 kB
Buffers:          524288 kB
Cached:          1048576 kB
SwapCached:            0 kB
SwapTotal:       2097152 kB
SwapFree:        1048576 kB
";

#[test]
pub fn parses_meminfo() {
    let sample = MemorySample::parse(MEMINFO, Utc::now()).unwrap();

    assert_eq!(sample.total, 8192.0);
    assert_eq!(sample.free, 2048.0);
    assert_eq!(sample.buffers, 512.0);
    // SwapCached must not be mistaken for Cached
    assert_eq!(sample.cached, 1024.0);
    assert_eq!(sample.used, 8192.0 - 2048.0 - 512.0 - 1024.0);
    assert_eq!(sample.swap_used, 1024.0);
}

#[test]
pub fn missing_field_is_an_error() {
    let result = MemorySample::parse("MemTotal: 10 kB\n", Utc::now());

    assert!(matches!(result, Err(MonitorError::MissingField("MemFree"))));
}

#[test]
pub fn token_wakes_early_on_cancel() {
    let token = CancellationToken::new();
    assert!(!token.wait(Duration::from_millis(10)));

    let waiter = {
        let token = token.clone();
        thread::spawn(move || token.wait(Duration::from_secs(60)))
    };
    token.cancel();

    assert!(waiter.join().unwrap());
    assert!(token.is_cancelled());
}

#[test]
pub fn unbounded_wait_ends_on_cancel() {
    let token = CancellationToken::new();
    let waiter = {
        let token = token.clone();
        thread::spawn(move || token.wait(Duration::from_secs(u64::MAX)))
    };
    thread::sleep(Duration::from_millis(10));
    token.cancel();

    assert!(waiter.join().unwrap());
}

#[test]
pub fn huge_interval_monitor_stops_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.csv");
    let executor = Arc::new(ScriptedExecutor::new());
    executor.respond("cat /proc/meminfo", 0, MEMINFO);

    let monitor =
        MemoryMonitor::start(executor, Duration::from_secs(u64::MAX), &path).unwrap();
    thread::sleep(Duration::from_millis(20));

    assert!(monitor.stop().is_ok());
}

#[test]
pub fn monitor_polls_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload/idle-memory.csv");
    let executor = Arc::new(ScriptedExecutor::new());
    executor.respond("cat /proc/meminfo", 0, MEMINFO);

    let monitor = MemoryMonitor::start(executor.clone(), Duration::from_millis(5), &path).unwrap();
    while monitor.samples().len() < 3 {
        thread::sleep(Duration::from_millis(5));
    }
    let report = monitor.stop().unwrap();

    assert!(report.samples.len() >= 3);
    assert_eq!(report.used.count(), report.samples.len());
    match report.used {
        Summary::Computed(stats) => assert_eq!(stats.average, 4608.0),
        Summary::Empty => panic!("expected used memory statistics"),
    }

    let csv = fs::read_to_string(&path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(MONITOR_HEADER.join(",").as_str()));
    assert_eq!(lines.count(), report.samples.len());
    assert!(executor
        .commands()
        .iter()
        .all(|command| command == "cat /proc/meminfo"));
}

#[test]
pub fn failed_polls_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.csv");
    let executor = Arc::new(ScriptedExecutor::new());
    executor.respond("cat /proc/meminfo", 1, "");

    let monitor = MemoryMonitor::start(executor.clone(), Duration::from_millis(5), &path).unwrap();
    while executor.commands().len() < 2 {
        thread::sleep(Duration::from_millis(5));
    }
    let report = monitor.stop().unwrap();

    assert!(report.samples.is_empty());
    assert_eq!(report.used, Summary::Empty);
}
