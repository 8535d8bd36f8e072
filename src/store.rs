//! Per-machine series history.
//!
//! One CSV per machine (`data/series_<no>.csv`) holds every sample ever
//! extracted for it, sorted ascending by timestamp and unique per
//! timestamp. Merging a day is a read-modify-write over an in-memory rows
//! arena: union by timestamp with keep-last semantics, so re-processing a
//! date is idempotent and dates can arrive in any order.
//!
//! Concurrent merges for the same machine must be serialized by the
//! caller; merges for different machines are independent. The batch runner
//! is single-threaded, which satisfies both.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// CSV header row.
const CSV_HEADER: &str = "ts,value";

/// Timestamp format used in the persisted CSV (ISO-8601, millisecond
/// precision so intra-day sample times stay unique).
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// In-memory rows arena for one machine's history.
///
/// Backed by a `BTreeMap` keyed on timestamp, which makes the merge
/// contract (dedup by key, keep last written, sorted ascending) hold by
/// construction.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    rows: BTreeMap<NaiveDateTime, f64>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges rows into the store. Later rows overwrite earlier ones with
    /// the same timestamp.
    pub fn merge(&mut self, rows: impl IntoIterator<Item = (NaiveDateTime, f64)>) {
        for (ts, value) in rows {
            self.rows.insert(ts, value);
        }
    }

    /// Rows sorted ascending by timestamp.
    pub fn rows(&self) -> impl Iterator<Item = (&NaiveDateTime, &f64)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Loads a store from its CSV file. Malformed rows are skipped with a
    /// warning rather than failing the whole load.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).context(format!("Failed to open series CSV: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut store = Self::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from series CSV")?;
            if line_num == 0 || line.trim().is_empty() {
                continue;
            }
            match parse_row(&line) {
                Ok((ts, value)) => {
                    store.rows.insert(ts, value);
                }
                Err(e) => {
                    crate::log(&format!(
                        "Warning: skipping malformed series row {}: {}",
                        line_num + 1,
                        e
                    ));
                }
            }
        }
        Ok(store)
    }

    /// Writes the store to its CSV file, header first, rows ascending.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .context(format!("Failed to create series CSV: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER).context("Failed to write CSV header")?;
        for (ts, value) in &self.rows {
            writeln!(writer, "{},{}", ts.format(TS_FORMAT), value)
                .context("Failed to write series row")?;
        }
        writer.flush().context("Failed to flush series CSV")?;
        Ok(())
    }
}

fn parse_row(line: &str) -> Result<(NaiveDateTime, f64)> {
    let (ts_str, value_str) = line
        .split_once(',')
        .context("Expected 2 columns (ts,value)")?;
    let ts = NaiveDateTime::parse_from_str(ts_str, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(ts_str, "%Y-%m-%dT%H:%M:%S"))
        .context(format!("Invalid timestamp: {ts_str}"))?;
    let value: f64 = value_str.trim().parse().context("Invalid value")?;
    Ok((ts, value))
}

/// Assigns `n` evenly spaced timestamps spanning 00:00:00 to 23:59:59 of
/// `date`, endpoints inclusive.
pub fn day_timestamps(date: NaiveDate, n: usize) -> Vec<NaiveDateTime> {
    let start = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    if n <= 1 {
        return vec![start; n];
    }

    // Span the full day in milliseconds so sample times stay distinct.
    let span_ms = 86_399_000f64;
    (0..n)
        .map(|i| {
            let offset_ms = (span_ms * i as f64 / (n - 1) as f64).round() as i64;
            start + chrono::Duration::milliseconds(offset_ms)
        })
        .collect()
}

/// Path of the persisted series for one machine.
pub fn series_path(data_dir: &Path, machine_no: u32) -> PathBuf {
    data_dir.join(format!("series_{machine_no}.csv"))
}

/// Merges one day of values into a machine's persisted history.
///
/// Loads the existing CSV if present, merges the day's rows, and writes
/// the result back. Returns the path written.
pub fn merge_day(
    data_dir: &Path,
    machine_no: u32,
    date: NaiveDate,
    values: &[f64],
) -> Result<PathBuf> {
    let path = series_path(data_dir, machine_no);
    let mut store = if path.exists() {
        SeriesStore::load(&path)?
    } else {
        SeriesStore::new()
    };

    let timestamps = day_timestamps(date, values.len());
    store.merge(timestamps.into_iter().zip(values.iter().copied()));
    store.save(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_day_timestamps_span_full_day() {
        let ts = day_timestamps(date("2025-03-01"), 720);
        assert_eq!(ts.len(), 720);
        assert_eq!(ts[0], date("2025-03-01").and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(
            ts[719],
            date("2025-03-01").and_hms_opt(23, 59, 59).unwrap()
        );
        // Strictly increasing, hence unique
        for pair in ts.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = tempdir().unwrap();
        let values: Vec<f64> = (0..720).map(|i| i as f64 * 10.0).collect();

        merge_day(dir.path(), 466, date("2025-03-01"), &values).unwrap();
        let once = std::fs::read_to_string(series_path(dir.path(), 466)).unwrap();

        merge_day(dir.path(), 466, date("2025-03-01"), &values).unwrap();
        let twice = std::fs::read_to_string(series_path(dir.path(), 466)).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_grows_across_dates() {
        let dir = tempdir().unwrap();
        let values = vec![1.0; 720];

        merge_day(dir.path(), 7, date("2025-03-01"), &values).unwrap();
        merge_day(dir.path(), 7, date("2025-03-02"), &values).unwrap();

        let store = SeriesStore::load(&series_path(dir.path(), 7)).unwrap();
        assert_eq!(store.len(), 1440);
    }

    #[test]
    fn test_merge_is_commutative_across_dates() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let v1 = vec![1.0; 96];
        let v2 = vec![2.0; 96];

        merge_day(dir_a.path(), 1, date("2025-03-01"), &v1).unwrap();
        merge_day(dir_a.path(), 1, date("2025-03-02"), &v2).unwrap();

        merge_day(dir_b.path(), 1, date("2025-03-02"), &v2).unwrap();
        merge_day(dir_b.path(), 1, date("2025-03-01"), &v1).unwrap();

        let a = std::fs::read_to_string(series_path(dir_a.path(), 1)).unwrap();
        let b = std::fs::read_to_string(series_path(dir_b.path(), 1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reprocessing_overwrites_values() {
        let dir = tempdir().unwrap();

        merge_day(dir.path(), 3, date("2025-03-01"), &vec![100.0; 10]).unwrap();
        merge_day(dir.path(), 3, date("2025-03-01"), &vec![250.0; 10]).unwrap();

        let store = SeriesStore::load(&series_path(dir.path(), 3)).unwrap();
        assert_eq!(store.len(), 10);
        for (_, &value) in store.rows() {
            assert_eq!(value, 250.0);
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series_9.csv");

        let mut store = SeriesStore::new();
        store.merge(day_timestamps(date("2025-04-05"), 48).into_iter().zip(
            (0..48).map(|i| i as f64 - 24.0),
        ));
        store.save(&path).unwrap();

        let loaded = SeriesStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 48);
        assert_eq!(
            loaded.rows().map(|(_, &v)| v).collect::<Vec<_>>(),
            store.rows().map(|(_, &v)| v).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_load_skips_malformed_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series_2.csv");
        std::fs::write(
            &path,
            "ts,value\n2025-03-01T00:00:00.000,5\nnot a row\n2025-03-01T00:02:00.166,6\n",
        )
        .unwrap();

        let store = SeriesStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_sorted_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series_4.csv");

        let mut store = SeriesStore::new();
        // Insert out of order
        store.merge(vec![
            (date("2025-03-02").and_hms_opt(12, 0, 0).unwrap(), 2.0),
            (date("2025-03-01").and_hms_opt(12, 0, 0).unwrap(), 1.0),
        ]);
        store.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[1].starts_with("2025-03-01"));
        assert!(lines[2].starts_with("2025-03-02"));
    }
}
