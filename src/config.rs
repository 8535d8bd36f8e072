//! Chart template configuration.
//!
//! Loads settings from config.json at startup. All of the pixel thresholds
//! and the tick-to-value table are tuned for one specific chart template
//! (the hall's "difference" graph); a different template needs a different
//! config, not a code change.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Inclusive HSV bounds for isolating the trace color.
///
/// Uses OpenCV-style ranges: hue 0-179 (degrees halved), saturation and
/// value 0-255. The defaults select the magenta/pink trace.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HsvRange {
    pub hue_min: u8,
    pub hue_max: u8,
    pub sat_min: u8,
    pub val_min: u8,
}

impl Default for HsvRange {
    fn default() -> Self {
        Self {
            hue_min: 140,
            hue_max: 179,
            sat_min: 60,
            val_min: 60,
        }
    }
}

/// Complete digitizer configuration for one chart template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Number of output samples per calendar day
    #[serde(default = "default_points_per_day")]
    pub points_per_day: usize,
    /// Grayscale cutoff for the white panel background (0-255)
    #[serde(default = "default_panel_threshold")]
    pub panel_threshold: u8,
    /// Half-width of the square closing kernel used when locating the panel
    #[serde(default = "default_panel_close_radius")]
    pub panel_close_radius: u32,
    /// Width of the Y-axis label strip at the panel's left edge (pixels)
    #[serde(default = "default_label_strip_width")]
    pub label_strip_width: u32,
    /// Grayscale cutoff below which a label pixel counts as ink (0-255)
    #[serde(default = "default_label_ink_threshold")]
    pub label_ink_threshold: u8,
    /// Moving-average window for the per-row ink profile (rows)
    #[serde(default = "default_smooth_window")]
    pub smooth_window: usize,
    /// Fraction of the smoothed peak a row must reach to count as a tick peak
    #[serde(default = "default_peak_fraction")]
    pub peak_fraction: f64,
    /// Peaks closer than this many rows merge into one tick centroid
    #[serde(default = "default_cluster_gap")]
    pub cluster_gap: u32,
    /// Minimum number of tick centroids required to proceed
    #[serde(default = "default_min_ticks")]
    pub min_ticks: usize,
    /// Domain value of the topmost tick label
    #[serde(default = "default_top_tick_value")]
    pub top_tick_value: f64,
    /// Value decrease between adjacent tick labels, top to bottom
    #[serde(default = "default_tick_step")]
    pub tick_step: f64,
    /// Minimum vertical edge run accepted as the Y axis (pixels)
    #[serde(default = "default_axis_min_length")]
    pub axis_min_length: u32,
    /// Left-edge offset used when no axis line is found (pixels)
    #[serde(default = "default_axis_fallback_x")]
    pub axis_fallback_x: u32,
    /// HSV bounds for the trace color mask
    #[serde(default)]
    pub trace_color: HsvRange,
}

fn default_points_per_day() -> usize {
    720
}

fn default_panel_threshold() -> u8 {
    235
}

fn default_panel_close_radius() -> u32 {
    7 // 15x15 kernel
}

fn default_label_strip_width() -> u32 {
    90
}

fn default_label_ink_threshold() -> u8 {
    200
}

fn default_smooth_window() -> usize {
    9
}

fn default_peak_fraction() -> f64 {
    0.25
}

fn default_cluster_gap() -> u32 {
    15
}

fn default_min_ticks() -> usize {
    9
}

fn default_top_tick_value() -> f64 {
    30000.0
}

fn default_tick_step() -> f64 {
    5000.0
}

fn default_axis_min_length() -> u32 {
    200
}

fn default_axis_fallback_x() -> u32 {
    60
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            points_per_day: default_points_per_day(),
            panel_threshold: default_panel_threshold(),
            panel_close_radius: default_panel_close_radius(),
            label_strip_width: default_label_strip_width(),
            label_ink_threshold: default_label_ink_threshold(),
            smooth_window: default_smooth_window(),
            peak_fraction: default_peak_fraction(),
            cluster_gap: default_cluster_gap(),
            min_ticks: default_min_ticks(),
            top_tick_value: default_top_tick_value(),
            tick_step: default_tick_step(),
            axis_min_length: default_axis_min_length(),
            axis_fallback_x: default_axis_fallback_x(),
            trace_color: HsvRange::default(),
        }
    }
}

/// Loads configuration from config.json in the base directory, or returns
/// defaults when the file is missing or malformed.
pub fn load_config() -> TemplateConfig {
    let config_path = crate::paths::get_base_dir().join("config.json");
    load_config_from(&config_path)
}

fn load_config_from(config_path: &Path) -> TemplateConfig {
    if config_path.exists() {
        match fs::read_to_string(config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    crate::log(&format!("Config loaded from {}", config_path.display()));
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                ));
            }
        }
    }

    TemplateConfig::default()
}
