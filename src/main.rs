//! Chart Digitizer
//!
//! Reconstructs per-machine time series from screenshots of the hall's
//! "difference" graphs. The capture job deposits one image per machine per
//! day under `screenshots/<date>/`; each run digitizes every deposited
//! image and merges the values into `data/series_<machine>.csv`.

mod batch;
mod config;
mod digitize;
mod paths;
mod store;

use anyhow::{bail, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("chart_digitizer.log");
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

fn main() -> Result<()> {
    paths::ensure_directories()?;

    let config = config::load_config();
    let screenshots_dir = paths::get_screenshots_dir();
    let data_dir = paths::get_data_dir();

    log(&format!("Scanning {}", screenshots_dir.display()));
    let report = batch::run_all(&screenshots_dir, &data_dir, &config)?;
    log(&format!(
        "Done: {} processed, {} skipped, {} failed",
        report.processed,
        report.skipped,
        report.failures.len()
    ));

    if !report.all_succeeded() {
        let manifest_path = data_dir.join("failures.json");
        batch::write_failure_manifest(&report, &manifest_path)?;
        for failure in &report.failures {
            log(&format!(
                "  failed: machine {} on {}: {}",
                failure.machine_no, failure.date, failure.error
            ));
        }
        log(&format!("Failure manifest: {}", manifest_path.display()));
        bail!(
            "{} of {} extractions failed",
            report.failures.len(),
            report.processed + report.failures.len()
        );
    }

    Ok(())
}
