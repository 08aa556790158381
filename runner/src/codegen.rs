use crate::config::CodegenConfig;
use itertools::Itertools;

/// Wraps Ruby fragments into a script that reports memory, GC and timing.
///
/// The script is meant to be passed inside a double quoted `rails runner`
/// argument, so every quote it contains is escaped. Its last six output lines
/// are what `apbench_ingest::BenchmarkOutput` decodes.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    prelude: String,
}

impl CodeGenerator {
    pub fn new(config: &CodegenConfig) -> Self {
        let requires = config
            .require
            .iter()
            .map(|library| format!("require \\\"{library}\\\";"))
            .join("");

        Self {
            prelude: format!(
                "{requires}ActiveRecord::Base.logger.level = {};",
                config.log_level
            ),
        }
    }

    /// `setup` runs untimed before the measurement, only `timed` is benchmarked
    pub fn generate(&self, setup: &str, timed: &str) -> String {
        [
            self.prelude.as_str(),
            "mrss_start = MiqProcess.processInfo()[:memory_usage];",
            "vmem_start = MiqProcess.processInfo[:memory_size];",
            "gc_start = GC.stat;",
            setup,
            "GC.start;",
            "timing = Benchmark.realtime do;",
            timed,
            "end;",
            "GC.start;",
            "mrss_end = MiqProcess.processInfo()[:memory_usage];",
            "vmem_end = MiqProcess.processInfo[:memory_size];",
            "gc_end = GC.stat;",
            "mrss_change = mrss_end - mrss_start;",
            "vmem_change = vmem_end - vmem_start;",
            "puts \\\"#{mrss_start}, #{mrss_end}, #{mrss_change}\\\";",
            "puts \\\"#{vmem_start}, #{vmem_end}, #{vmem_change}\\\";",
            "puts \\\"#{gc_start}\\\";",
            "puts \\\"#{gc_end}\\\";",
            "puts \\\"Process Pid: #{Process.pid}\\\";",
            "puts timing",
        ]
        .concat()
    }

    /// Time `timed` `repetitions` times in one process, printing `[t1, t2, ...]`
    pub fn generate_array(&self, setup: &str, timed: &str, repetitions: usize) -> String {
        format!(
            "{}{setup}r = Array.new;{repetitions}.times {{|i| GC.start;r.push(Benchmark.realtime {{{timed}}});}};puts r.inspect",
            self.prelude
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> CodeGenerator {
        CodeGenerator::new(&CodegenConfig::default())
    }

    #[test]
    fn default_prelude() {
        let script = generator().generate("", "");

        assert!(script.starts_with(
            "require \\\"miq-process\\\";ActiveRecord::Base.logger.level = 1;mrss_start"
        ));
    }

    #[test]
    fn fragments_are_placed_around_the_timer() {
        let script = generator().generate(
            "e = ExtManagementSystem.find_by_name(\\\"vSphere 6\\\");",
            "EmsRefresh.refresh(e);",
        );

        let setup = script.find("e = ExtManagementSystem").unwrap();
        let timer = script.find("timing = Benchmark.realtime do;").unwrap();
        let timed = script.find("EmsRefresh.refresh(e);end;").unwrap();

        assert!(setup < timer && timer < timed);
        // GC is forced on both sides of the measurement
        assert_eq!(script.matches("GC.start;").count(), 2);
    }

    #[test]
    fn prints_the_six_record_lines_last() {
        let script = generator().generate("", "sleep 1;");
        let prints: Vec<&str> = script
            .split(';')
            .filter(|statement| statement.starts_with("puts"))
            .collect();

        assert_eq!(
            prints,
            [
                "puts \\\"#{mrss_start}, #{mrss_end}, #{mrss_change}\\\"",
                "puts \\\"#{vmem_start}, #{vmem_end}, #{vmem_change}\\\"",
                "puts \\\"#{gc_start}\\\"",
                "puts \\\"#{gc_end}\\\"",
                "puts \\\"Process Pid: #{Process.pid}\\\"",
                "puts timing",
            ]
        );
        assert!(script.ends_with("puts timing"));
    }

    #[test]
    fn array_form_repeats_in_one_process() {
        let script = generator().generate_array("e = Host.first;", "EmsRefresh.refresh e", 3);

        assert!(script.ends_with(
            "e = Host.first;r = Array.new;3.times {|i| GC.start;r.push(Benchmark.realtime {EmsRefresh.refresh e});};puts r.inspect"
        ));
    }

    #[test]
    fn configured_requires_and_log_level() {
        let generator = CodeGenerator::new(&CodegenConfig {
            require: vec!["miq-process".to_owned(), "benchmark".to_owned()],
            log_level: 3,
        });

        assert!(generator.generate("", "").starts_with(
            "require \\\"miq-process\\\";require \\\"benchmark\\\";ActiveRecord::Base.logger.level = 3;"
        ));
    }
}
