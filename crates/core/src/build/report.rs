//! End-of-build summary table

use chrono::{DateTime, Local};
use std::time::Duration;

use super::timer::CommandTimer;
use crate::output::OutputDuplicator;
use crate::Error;

/// Clock format for the Start/End columns
pub const TIME_FORMAT: &str = "%H:%M:%S %Z";

/// Summary of one dispatched phase
#[derive(Debug)]
pub struct BuildSummary<'a> {
    /// Target name shown in every row
    pub target: &'a str,
    /// Timers in execution order
    pub timers: &'a [CommandTimer],
    /// When the build invocation started
    pub started: DateTime<Local>,
    /// When dispatch completed
    pub finished: DateTime<Local>,
    /// Failure, if the build failed
    pub error: Option<&'a Error>,
}

impl BuildSummary<'_> {
    /// Report lines, without trailing newlines
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let taken = (self.finished - self.started).to_std().unwrap_or_default();
        let mut lines = vec![
            String::new(),
            format!(
                "Build finished at {}, taking {}",
                self.finished.format(TIME_FORMAT),
                format_duration(taken)
            ),
            String::new(),
            format!(
                "{:>15}{:>15}{:>15}{:>24}   {}",
                "Start", "End", "Elapsed", "Target", "Command"
            ),
        ];

        for timer in self.timers {
            let elapsed = timer.elapsed();
            lines.push(format!(
                "{:>15}{:>15}{:>15}{:>24}   {}",
                timer.start.format(TIME_FORMAT).to_string(),
                timer.end.format(TIME_FORMAT).to_string(),
                format_duration(elapsed),
                self.target,
                timer.command
            ));
        }
        lines.push(format!(
            "{:>15}{:>15}{:>15}   {}",
            "",
            "",
            format_duration(taken),
            "TOTAL"
        ));
        lines.push(String::new());

        match self.error {
            None => lines.push("-- BUILD SUCCEEDED --".to_string()),
            Some(e) => {
                lines.push("-- BUILD FAILED --".to_string());
                lines.push(format!("Build terminated with the following error: {e}"));
            }
        }
        lines
    }

    /// Write the report through `output`, so it reaches the console and any capture
    pub fn write_to(&self, output: &OutputDuplicator) {
        for line in self.lines() {
            output.line(line);
        }
    }
}

/// Compact duration: `850ms`, `12.304s`, `3m07.120s`, `1h02m03s`
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let millis = d.subsec_millis();
    if secs == 0 {
        format!("{millis}ms")
    } else if secs < 60 {
        format!("{secs}.{millis:03}s")
    } else if secs < 3600 {
        format!("{}m{:02}.{millis:03}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn timer(command: &str, start: DateTime<Local>, millis: i64) -> CommandTimer {
        CommandTimer {
            command: command.to_string(),
            start,
            end: start + TimeDelta::milliseconds(millis),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(12_304)), "12.304s");
        assert_eq!(format_duration(Duration::from_millis(187_120)), "3m07.120s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h02m03s");
    }

    #[test]
    fn test_success_report() {
        let start = Local::now();
        let timers = [
            timer("make deps", start, 1_500),
            timer("make", start + TimeDelta::milliseconds(1_500), 2_250),
        ];
        let summary = BuildSummary {
            target: "default",
            timers: &timers,
            started: start,
            finished: start + TimeDelta::milliseconds(3_750),
            error: None,
        };

        let lines = summary.lines();
        assert!(lines[1].starts_with("Build finished at "));
        assert!(lines[1].ends_with("taking 3.750s"));
        assert!(lines[3].ends_with("Target   Command"));
        assert!(lines[4].ends_with("default   make deps"));
        assert!(lines[5].ends_with("default   make"));
        assert_eq!(lines[6].trim(), "3.750s   TOTAL");
        assert_eq!(lines.last().unwrap(), "-- BUILD SUCCEEDED --");
    }

    #[test]
    fn test_failure_report_names_error() {
        let start = Local::now();
        let timers = [timer("make", start, 10)];
        let err = Error::execution("make", "exited with 2", Some(2));
        let summary = BuildSummary {
            target: "release",
            timers: &timers,
            started: start,
            finished: start,
            error: Some(&err),
        };

        let output = OutputDuplicator::new().with_capture();
        summary.write_to(&output);
        let text = output.captured().unwrap().to_string_lossy();

        assert!(text.contains("-- BUILD FAILED --\n"));
        assert!(text.contains("Build terminated with the following error: Command 'make' failed"));
        assert!(!text.contains("SUCCEEDED"));
    }

    #[test]
    fn test_total_covers_time_between_commands() {
        let start = Local::now();
        let timers = [
            timer("./configure", start + TimeDelta::milliseconds(2_000), 1_000),
            timer("make", start + TimeDelta::milliseconds(3_500), 1_000),
        ];
        let summary = BuildSummary {
            target: "default",
            timers: &timers,
            started: start,
            finished: start + TimeDelta::milliseconds(5_000),
            error: None,
        };

        let lines = summary.lines();
        assert!(lines[1].ends_with("taking 5.000s"));
        assert_eq!(lines[6].trim(), "5.000s   TOTAL");
    }
}
