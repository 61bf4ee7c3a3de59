//! Event/log sink: append-only record of alerts and operational log lines
//!
//! Unbounded within a session; display collaborators truncate for
//! rendering (e.g. last 20/25/50). The export document in `report` consumes
//! this sink grouped by category.

use chrono::NaiveDateTime;

use crate::types::{LogCategory, LogEntry};

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. Never fails, never truncates.
    pub fn record(&mut self, timestamp: NaiveDateTime, message: impl Into<String>, category: LogCategory) {
        let message = message.into();
        tracing::debug!(category = %category, %message, "Event recorded");
        self.entries.push(LogEntry {
            timestamp,
            message,
            category,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter_category(&self, category: LogCategory) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// The most recent `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> &[LogEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, s)
            .unwrap()
    }

    #[test]
    fn append_only_ordering_preserved() {
        let mut log = EventLog::new();
        log.record(ts(0), "first", LogCategory::System);
        log.record(ts(1), "second", LogCategory::Alert);
        log.record(ts(2), "third", LogCategory::Alert);
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[0].message, "first");
        assert_eq!(log.iter_category(LogCategory::Alert).count(), 2);
    }

    #[test]
    fn tail_returns_most_recent() {
        let mut log = EventLog::new();
        for i in 0..10 {
            log.record(ts(i), format!("entry {i}"), LogCategory::System);
        }
        let tail = log.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].message, "entry 7");
        assert_eq!(log.tail(100).len(), 10);
    }
}
