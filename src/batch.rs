//! Batch processing of deposited screenshots.
//!
//! The upstream capture job leaves one image per machine per day under
//! `screenshots/<YYYY-MM-DD>/<machine_no>.<ext>`. This walks every date
//! directory in order, digitizes each image, and merges each successful
//! day into that machine's history. Failures are collected per
//! (machine, date) and never abort the rest of the batch: one corrupt
//! capture must not block unrelated machines or dates.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::config::TemplateConfig;
use crate::digitize::extract_series_from_path;
use crate::store::merge_day;

/// Image extensions the capture job is known to produce.
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// One failed (machine, date) extraction.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub machine_no: u32,
    pub date: NaiveDate,
    pub error: String,
}

/// Outcome of one batch run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    /// Number of images digitized and merged
    pub processed: usize,
    /// Images skipped because the name or location did not fit the layout
    pub skipped: usize,
    pub failures: Vec<FailureRecord>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Processes every screenshot under `screenshots_dir`, merging results
/// into per-machine CSVs under `data_dir`.
///
/// Returns the report; only I/O setup problems (unreadable directories)
/// are propagated as errors.
pub fn run_all(
    screenshots_dir: &Path,
    data_dir: &Path,
    config: &TemplateConfig,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    if !screenshots_dir.exists() {
        crate::log(&format!(
            "No screenshots directory at {}; nothing to do",
            screenshots_dir.display()
        ));
        return Ok(report);
    }
    fs::create_dir_all(data_dir)
        .context(format!("Failed to create data directory: {}", data_dir.display()))?;

    for day_dir in sorted_entries(screenshots_dir)? {
        if !day_dir.is_dir() {
            continue;
        }
        let dir_name = day_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let Ok(date) = NaiveDate::parse_from_str(&dir_name, "%Y-%m-%d") else {
            crate::log(&format!("Skipping non-date directory: {dir_name}"));
            report.skipped += 1;
            continue;
        };

        for img_path in sorted_entries(&day_dir)? {
            if !img_path.is_file() || !has_image_extension(&img_path) {
                continue;
            }
            let Some(machine_no) = machine_no_from(&img_path) else {
                crate::log(&format!(
                    "Skipping non-numeric file name: {}",
                    img_path.display()
                ));
                report.skipped += 1;
                continue;
            };

            match extract_series_from_path(&img_path, config) {
                Ok(result) => {
                    let out = merge_day(data_dir, machine_no, date, &result.series)?;
                    crate::log(&format!(
                        "Machine {machine_no} {date}: final={:.0} max={:.0} min={:.0} -> {}",
                        result.daily_final,
                        result.daily_max,
                        result.daily_min,
                        out.display()
                    ));
                    report.processed += 1;
                }
                Err(e) => {
                    crate::log(&format!("Machine {machine_no} {date}: FAILED: {e}"));
                    report.failures.push(FailureRecord {
                        machine_no,
                        date,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    Ok(report)
}

/// Writes the failure manifest next to the data, pretty-printed.
pub fn write_failure_manifest(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.failures)
        .context("Failed to serialize failure manifest")?;
    fs::write(path, json)
        .context(format!("Failed to write failure manifest: {}", path.display()))?;
    Ok(())
}

/// Directory entries sorted by path for deterministic processing order.
fn sorted_entries(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .context(format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Machine number from the file stem (`466.png` -> 466).
fn machine_no_from(path: &Path) -> Option<u32> {
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digitize::test_support::synthetic_chart;
    use crate::store::{series_path, SeriesStore};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_chart(dir: &Path, name: &str, trace_row: u32) {
        synthetic_chart(trace_row).save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_batch_processes_all_machines() {
        let root = tempdir().unwrap();
        let day = root.path().join("screenshots").join("2025-03-01");
        std::fs::create_dir_all(&day).unwrap();
        write_chart(&day, "101.png", 90);
        write_chart(&day, "102.png", 140);

        let data_dir = root.path().join("data");
        let report = run_all(
            &root.path().join("screenshots"),
            &data_dir,
            &TemplateConfig::default(),
        )
        .unwrap();

        assert_eq!(report.processed, 2);
        assert!(report.all_succeeded());
        assert!(series_path(&data_dir, 101).exists());
        assert!(series_path(&data_dir, 102).exists());

        let store = SeriesStore::load(&series_path(&data_dir, 101)).unwrap();
        assert_eq!(store.len(), 720);
    }

    #[test]
    fn test_one_bad_image_does_not_block_the_rest() {
        let root = tempdir().unwrap();
        let day = root.path().join("screenshots").join("2025-03-01");
        std::fs::create_dir_all(&day).unwrap();
        write_chart(&day, "201.png", 90);
        write_chart(&day, "202.png", 115);
        write_chart(&day, "204.png", 240);
        write_chart(&day, "205.png", 340);
        std::fs::write(day.join("203.png"), b"definitely not a png").unwrap();

        let data_dir = root.path().join("data");
        let report = run_all(
            &root.path().join("screenshots"),
            &data_dir,
            &TemplateConfig::default(),
        )
        .unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].machine_no, 203);
        // The failed machine must have nothing persisted
        assert!(!series_path(&data_dir, 203).exists());
        for machine in [201, 202, 204, 205] {
            assert!(series_path(&data_dir, machine).exists());
        }
    }

    #[test]
    fn test_reprocessing_a_date_is_idempotent() {
        let root = tempdir().unwrap();
        let day = root.path().join("screenshots").join("2025-03-01");
        std::fs::create_dir_all(&day).unwrap();
        write_chart(&day, "301.png", 190);

        let shots = root.path().join("screenshots");
        let data_dir = root.path().join("data");
        run_all(&shots, &data_dir, &TemplateConfig::default()).unwrap();
        let once = std::fs::read_to_string(series_path(&data_dir, 301)).unwrap();
        run_all(&shots, &data_dir, &TemplateConfig::default()).unwrap();
        let twice = std::fs::read_to_string(series_path(&data_dir, 301)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_two_dates_accumulate() {
        let root = tempdir().unwrap();
        let shots = root.path().join("screenshots");
        for date in ["2025-03-01", "2025-03-02"] {
            let day = shots.join(date);
            std::fs::create_dir_all(&day).unwrap();
            write_chart(&day, "401.png", 90);
        }

        let data_dir = root.path().join("data");
        let report = run_all(&shots, &data_dir, &TemplateConfig::default()).unwrap();
        assert_eq!(report.processed, 2);

        let store = SeriesStore::load(&series_path(&data_dir, 401)).unwrap();
        assert_eq!(store.len(), 1440);
    }

    #[test]
    fn test_skips_non_date_dirs_and_non_numeric_names() {
        let root = tempdir().unwrap();
        let shots = root.path().join("screenshots");
        std::fs::create_dir_all(shots.join("not-a-date")).unwrap();
        let day = shots.join("2025-03-01");
        std::fs::create_dir_all(&day).unwrap();
        write_chart(&day, "thumbnail.png", 90);

        let data_dir = root.path().join("data");
        let report = run_all(&shots, &data_dir, &TemplateConfig::default()).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 2);
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_missing_screenshots_dir_is_empty_report() {
        let report = run_all(
            &PathBuf::from("/nonexistent/screenshots"),
            tempdir().unwrap().path(),
            &TemplateConfig::default(),
        )
        .unwrap();
        assert_eq!(report.processed, 0);
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_failure_manifest_is_written() {
        let dir = tempdir().unwrap();
        let report = RunReport {
            processed: 0,
            skipped: 0,
            failures: vec![FailureRecord {
                machine_no: 466,
                date: NaiveDate::parse_from_str("2025-03-01", "%Y-%m-%d").unwrap(),
                error: "tick detection failed".into(),
            }],
        };

        let path = dir.path().join("failures.json");
        write_failure_manifest(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"machine_no\": 466"));
        assert!(content.contains("2025-03-01"));
    }
}
