//! Thread-safe counters collected over the lifetime of a crawl.

use std::collections::BTreeMap;
use std::sync::Mutex;

use jiff::Zoned;

/// A single stats value: either a running counter or string metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    /// A numeric counter, incremented via [`StatsCollector::inc_value`].
    Counter(f64),
    /// A string annotation (e.g. spider name, finish reason).
    Meta(String),
}

/// Collects crawl-lifetime counters and metadata.
///
/// Mirrors the reference implementation's stats collector: counters start at
/// zero on first increment, metadata is free-form string key/value pairs,
/// and a snapshot can be rendered for a final summary log line.
#[derive(Default)]
pub struct StatsCollector {
    stats: Mutex<BTreeMap<String, StatValue>>,
    started_at: Mutex<Option<Zoned>>,
}

impl StatsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments a numeric counter by `count`, creating it at `0` if absent.
    pub fn inc_value(&self, key: &str, count: f64) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(key.to_string()).or_insert(StatValue::Counter(0.0));
        let current = match entry {
            StatValue::Counter(n) => *n,
            StatValue::Meta(_) => 0.0,
        };
        *entry = StatValue::Counter(current + count);
    }

    /// Sets a numeric counter to an explicit value.
    pub fn set_counter(&self, key: &str, value: f64) {
        self.stats.lock().unwrap().insert(key.to_string(), StatValue::Counter(value));
    }

    /// Sets a string metadata entry.
    pub fn set_meta(&self, key: &str, value: impl Into<String>) {
        self.stats.lock().unwrap().insert(key.to_string(), StatValue::Meta(value.into()));
    }

    /// Returns a value, if present.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<StatValue> {
        self.stats.lock().unwrap().get(key).cloned()
    }

    /// Returns a point-in-time snapshot of all collected stats.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, StatValue> {
        self.stats.lock().unwrap().clone()
    }

    /// Records the spider-open timestamp and name.
    pub fn open_spider(&self, spider_name: &str, started_at: Zoned) {
        self.set_meta("start_time", started_at.to_string());
        self.set_meta("spider_name", spider_name);
        *self.started_at.lock().unwrap() = Some(started_at);
    }

    /// Records the spider-close timestamp, reason, and elapsed duration.
    pub fn close_spider(&self, reason: &str, finished_at: Zoned) {
        self.set_meta("finish_time", finished_at.to_string());
        self.set_meta("finish_reason", reason);

        if let Some(started_at) = self.started_at.lock().unwrap().clone() {
            if let Ok(span) = finished_at.since(&started_at) {
                self.set_counter("elapsed_time_seconds", span.total(jiff::Unit::Second).unwrap_or(0.0));
            }
        }
    }

    /// Renders a sorted, human-readable summary of all collected stats.
    #[must_use]
    pub fn log_stats(&self) -> String {
        let stats = self.stats.lock().unwrap();
        stats
            .iter()
            .map(|(key, value)| match value {
                StatValue::Counter(n) => format!("  {key}: {n}"),
                StatValue::Meta(s) => format!("  {key}: {s}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_value_accumulates() {
        let stats = StatsCollector::new();
        stats.inc_value("items", 1.0);
        stats.inc_value("items", 2.0);
        assert_eq!(stats.get_value("items"), Some(StatValue::Counter(3.0)));
    }

    #[test]
    fn log_stats_is_sorted_by_key() {
        let stats = StatsCollector::new();
        stats.set_counter("zeta", 1.0);
        stats.set_counter("alpha", 2.0);
        let out = stats.log_stats();
        assert!(out.find("alpha").unwrap() < out.find("zeta").unwrap());
    }
}
