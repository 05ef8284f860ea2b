//! Per-command wall-clock timing

use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Start and end of one executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTimer {
    /// Command as executed, including any exec prefix
    pub command: String,
    /// When dispatch of the command began
    pub start: DateTime<Local>,
    /// When the command completed
    pub end: DateTime<Local>,
}

impl CommandTimer {
    /// Time between start and end
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }
}

/// A timer that has been started but not yet stopped.
///
/// The end time is derived from a monotonic clock so `end >= start` holds
/// even if the wall clock steps backwards mid-command.
#[derive(Debug)]
pub struct RunningTimer {
    command: String,
    start: DateTime<Local>,
    started: Instant,
}

impl RunningTimer {
    /// Start timing `command` now
    #[must_use]
    pub fn start(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            start: Local::now(),
            started: Instant::now(),
        }
    }

    /// Stop the timer
    #[must_use]
    pub fn finish(self) -> CommandTimer {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        let end = self.start.checked_add_signed(elapsed).unwrap_or(self.start);
        CommandTimer {
            command: self.command,
            start: self.start,
            end,
        }
    }
}
