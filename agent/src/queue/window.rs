//! Time-of-day execution window

use chrono::{DateTime, NaiveTime, Timelike, Utc};

use openapi_client::models::Command;

/// Daily UTC window, inclusive on both ends, at minute resolution.
///
/// When `start > end` the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWindow {
    start_minute: u32,
    end_minute: u32,
}

impl WorkWindow {
    /// Parse `HH:MM` bounds. Returns `None` when either bound is unparseable,
    /// which callers treat as "always eligible".
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self {
            start_minute: parse_hhmm(start)?,
            end_minute: parse_hhmm(end)?,
        })
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let current = now.hour() * 60 + now.minute();
        if self.start_minute <= self.end_minute {
            current >= self.start_minute && current <= self.end_minute
        } else {
            current >= self.start_minute || current <= self.end_minute
        }
    }
}

fn parse_hhmm(value: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Forced commands bypass the window; a missing window never gates.
pub fn should_execute_now(command: &Command, now: DateTime<Utc>, window: Option<&WorkWindow>) -> bool {
    if command.force_update {
        return true;
    }
    match window {
        Some(window) => window.contains(now),
        None => true,
    }
}
