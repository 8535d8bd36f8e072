//! Chart digitization pipeline.
//!
//! Turns one screenshot of the hall's "difference" graph into one day of
//! numeric samples:
//! panel crop → tick rows → row-to-value map → trace rows per column →
//! values → resample to a fixed number of points.
//!
//! Each extraction is a pure function of the image and the template config;
//! the only durable state in the crate lives in [`crate::store`].

pub mod panel;
pub mod resample;
pub mod ticks;
pub mod trace;
pub mod value_map;

use std::path::Path;

use image::RgbImage;
use thiserror::Error;

use crate::config::TemplateConfig;
use value_map::ValueMap;

/// A failed extraction. Failures are per image: one bad capture never
/// affects other machines or dates.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The input bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    UnreadableImage(#[from] image::ImageError),
    /// Fewer tick labels than the template requires; the capture does not
    /// match the expected chart layout.
    #[error("tick detection failed: found {found} label rows, need at least {needed}")]
    TickDetectionFailed { found: usize, needed: usize },
    /// No trace-colored pixel anywhere in the plot window.
    #[error("no trace pixels found in the plot window")]
    EmptyTrace,
}

/// One day of extracted values plus the summary figures shown in reports.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    /// Exactly `points_per_day` values spanning the day
    pub series: Vec<f64>,
    /// Value at the last sample of the day
    pub daily_final: f64,
    pub daily_max: f64,
    pub daily_min: f64,
}

/// Reads and digitizes one screenshot file.
pub fn extract_series_from_path(
    path: &Path,
    config: &TemplateConfig,
) -> Result<ExtractResult, ExtractError> {
    let img = image::open(path)?.to_rgb8();
    extract_series_from_image(&img, config)
}

/// Digitizes one decoded screenshot.
pub fn extract_series_from_image(
    img: &RgbImage,
    config: &TemplateConfig,
) -> Result<ExtractResult, ExtractError> {
    let panel = panel::crop_to_panel(img, config);
    let tick_rows = ticks::detect_tick_rows(&panel, config)?;
    let map = ValueMap::from_ticks(&tick_rows, config);

    let axis_x = trace::find_axis_column(&panel, config);
    let window = trace::plot_window(&panel, axis_x, &tick_rows);
    let values = trace::extract_trace_values(&panel, window, &map, config)?;

    let series = resample::resample(&values, config.points_per_day);
    let daily_final = *series.last().unwrap_or(&0.0);
    let daily_max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let daily_min = series.iter().cloned().fold(f64::INFINITY, f64::min);

    Ok(ExtractResult {
        series,
        daily_final,
        daily_max,
        daily_min,
    })
}
