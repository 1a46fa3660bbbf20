use std::collections::BTreeMap;
use std::time::Duration;

/// One metrics row emitted by an algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub iter: usize,
    /// Time since the start of the fit.
    pub elapsed: Duration,
    pub fields: Vec<(String, f64)>,
}

impl LogRecord {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }
}

/// Named, ordered sequences of per-iteration metric records.
///
/// The engine only emits records; persisting or rendering them is left to the
/// caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Logs {
    tables: BTreeMap<String, Vec<LogRecord>>,
}

impl Logs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: &str, iter: usize, elapsed: Duration, fields: &[(&str, f64)]) {
        let record = LogRecord {
            iter,
            elapsed,
            fields: fields
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        };
        self.tables.entry(table.to_string()).or_default().push(record);
    }

    pub fn get(&self, table: &str) -> Option<&[LogRecord]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Values of one field across a table, in record order.
    pub fn series(&self, table: &str, field: &str) -> Vec<f64> {
        self.get(table)
            .unwrap_or_default()
            .iter()
            .filter_map(|record| record.get(field))
            .collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_series() {
        let mut logs = Logs::new();
        assert!(logs.is_empty());

        logs.record("updates", 0, Duration::ZERO, &[("error", 3.0), ("reg", 2.0)]);
        logs.record("updates", 1, Duration::from_millis(5), &[("error", 1.5)]);
        logs.record("refinements", 0, Duration::ZERO, &[("score", 0.4)]);

        assert_eq!(logs.series("updates", "error"), vec![3.0, 1.5]);
        assert_eq!(logs.series("updates", "reg"), vec![2.0]);
        assert!(logs.series("missing", "error").is_empty());

        let updates = logs.get("updates").unwrap();
        assert_eq!(updates[1].iter, 1);
        assert_eq!(updates[0].get("reg"), Some(2.0));
        assert_eq!(logs.tables().collect::<Vec<_>>(), vec!["refinements", "updates"]);
    }
}
