//! Trace extraction.
//!
//! Finds where the colored trace sits in every pixel column of the plot
//! area. The plot area's left edge comes from the chart's vertical axis
//! line; the trace itself is isolated by color in HSV space, then each
//! column's trace row is the median of its matched pixels. Columns the
//! mask missed (dashed rendering, overlapping gridlines) are filled by
//! interpolation before mapping rows to values.

use image::RgbImage;

use crate::config::TemplateConfig;
use crate::digitize::panel::luma;
use crate::digitize::value_map::ValueMap;
use crate::digitize::ExtractError;

/// Pixel window of the panel scanned for the trace.
#[derive(Clone, Copy, Debug)]
pub struct PlotWindow {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
}

/// Edge gradient magnitude above which a pixel counts as an edge.
const EDGE_THRESHOLD: f32 = 50.0;

/// Maximum run of non-edge rows tolerated inside one axis segment.
const EDGE_GAP: u32 = 10;

/// Locates the chart's vertical axis line and returns its column.
///
/// Scans the left half of the panel for the column with the longest
/// near-vertical run of horizontal-gradient edges. When no run is long
/// enough, falls back to the configured fixed offset; the axis position
/// only sets the scan window's left edge, so a few pixels of error are
/// harmless.
pub fn find_axis_column(panel: &RgbImage, config: &TemplateConfig) -> u32 {
    let (width, height) = panel.dimensions();
    if width < 3 {
        return config.axis_fallback_x.min(width);
    }

    let mut best_column = None;
    let mut best_run = 0u32;

    for x in 1..(width / 2).max(2) {
        // Longest vertical run of edge pixels in this column, allowing
        // short gaps (anti-aliasing, tick marks crossing the axis).
        let mut run = 0u32;
        let mut gap = 0u32;
        let mut longest = 0u32;
        for y in 0..height {
            let left = luma(panel.get_pixel(x - 1, y));
            let right = luma(panel.get_pixel((x + 1).min(width - 1), y));
            if (right - left).abs() >= EDGE_THRESHOLD {
                // Bridged gap rows count toward the run, but a fresh run
                // must not absorb the blank rows before it
                run += if run == 0 { 1 } else { gap + 1 };
                gap = 0;
                longest = longest.max(run);
            } else {
                gap += 1;
                if gap > EDGE_GAP {
                    run = 0;
                    gap = 0;
                }
            }
        }

        if longest > best_run {
            best_run = longest;
            best_column = Some(x);
        }
    }

    match best_column {
        Some(x) if best_run > config.axis_min_length => x,
        _ => {
            crate::log(&format!(
                "Axis line not found; using fixed offset x={}",
                config.axis_fallback_x
            ));
            config.axis_fallback_x.min(width.saturating_sub(1))
        }
    }
}

/// Computes the scan window from the axis column and the tick span.
pub fn plot_window(panel: &RgbImage, axis_x: u32, ticks: &[u32]) -> PlotWindow {
    let (width, height) = panel.dimensions();
    let x0 = (axis_x + 2).min(width);
    let x1 = width.saturating_sub(10).max(x0);
    let y0 = ticks.first().map(|&t| t.saturating_sub(5)).unwrap_or(0);
    let y1 = ticks
        .last()
        .map(|&t| (t + 5).min(height))
        .unwrap_or(height);
    PlotWindow { x0, x1, y0, y1 }
}

/// Estimates the trace's row for every column of the window.
///
/// Returns one row per column in `[window.x0, window.x1)`, with gaps
/// interpolated. Fails with [`ExtractError::EmptyTrace`] when no column
/// matched the trace color at all.
pub fn extract_trace_rows(
    panel: &RgbImage,
    window: PlotWindow,
    config: &TemplateConfig,
) -> Result<Vec<f64>, ExtractError> {
    let mask = trace_mask(panel, config);
    let (width, _) = panel.dimensions();

    let mut rows: Vec<Option<f64>> = Vec::with_capacity((window.x1 - window.x0) as usize);
    for x in window.x0..window.x1 {
        let mut hits: Vec<u32> = Vec::new();
        for y in window.y0..window.y1 {
            if mask[(y * width + x) as usize] {
                hits.push(y);
            }
        }
        rows.push(median(&hits));
    }

    interpolate_gaps(&rows).ok_or(ExtractError::EmptyTrace)
}

/// Convenience: extract, map rows through the value map.
pub fn extract_trace_values(
    panel: &RgbImage,
    window: PlotWindow,
    map: &ValueMap,
    config: &TemplateConfig,
) -> Result<Vec<f64>, ExtractError> {
    let rows = extract_trace_rows(panel, window, config)?;
    Ok(rows.iter().map(|&r| map.value_at(r)).collect())
}

/// Binary mask of trace-colored pixels, opened with a cross kernel to
/// drop isolated noise pixels.
fn trace_mask(panel: &RgbImage, config: &TemplateConfig) -> Vec<bool> {
    let (width, height) = panel.dimensions();
    let range = &config.trace_color;

    let mut mask = vec![false; (width * height) as usize];
    for (x, y, pixel) in panel.enumerate_pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        if h >= range.hue_min && h <= range.hue_max && s >= range.sat_min && v >= range.val_min {
            mask[(y * width + x) as usize] = true;
        }
    }

    let eroded = cross_erode(&mask, width, height);
    cross_dilate(&eroded, width, height)
}

/// RGB to HSV using OpenCV's ranges: hue 0-179, saturation/value 0-255.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rf = r as f32 / 255.0;
    let gf = g as f32 / 255.0;
    let bf = b as f32 / 255.0;
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue_deg = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta) % 6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let hue_deg = if hue_deg < 0.0 { hue_deg + 360.0 } else { hue_deg };

    let h = (hue_deg / 2.0).round().min(179.0) as u8;
    let s = if max == 0.0 {
        0
    } else {
        (delta / max * 255.0).round() as u8
    };
    let v = (max * 255.0).round() as u8;
    (h, s, v)
}

/// Erosion with the 3x3 cross structuring element.
fn cross_erode(mask: &[bool], width: u32, height: u32) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    let at = |x: u32, y: u32| mask[(y * width + x) as usize];
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            if at(x, y) && at(x - 1, y) && at(x + 1, y) && at(x, y - 1) && at(x, y + 1) {
                out[(y * width + x) as usize] = true;
            }
        }
    }
    out
}

/// Dilation with the 3x3 cross structuring element.
fn cross_dilate(mask: &[bool], width: u32, height: u32) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            if !mask[(y * width + x) as usize] {
                continue;
            }
            out[(y * width + x) as usize] = true;
            if x > 0 {
                out[(y * width + x - 1) as usize] = true;
            }
            if x + 1 < width {
                out[(y * width + x + 1) as usize] = true;
            }
            if y > 0 {
                out[((y - 1) * width + x) as usize] = true;
            }
            if y + 1 < height {
                out[((y + 1) * width + x) as usize] = true;
            }
        }
    }
    out
}

/// Median of sorted hit rows; `None` when the column had no hits.
fn median(hits: &[u32]) -> Option<f64> {
    if hits.is_empty() {
        return None;
    }
    let n = hits.len();
    if n % 2 == 1 {
        Some(hits[n / 2] as f64)
    } else {
        Some((hits[n / 2 - 1] as f64 + hits[n / 2] as f64) / 2.0)
    }
}

/// Fills gaps by linear interpolation between the surrounding known
/// columns; runs before the first and after the last known column extend
/// those endpoint values. Returns `None` when every column is a gap.
fn interpolate_gaps(rows: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = rows.iter().position(|r| r.is_some())?;
    let last = rows.iter().rposition(|r| r.is_some()).unwrap();

    let mut out = vec![0.0f64; rows.len()];
    for i in 0..=first {
        out[i] = rows[first].unwrap();
    }
    for i in last..rows.len() {
        out[i] = rows[last].unwrap();
    }

    let mut prev = first;
    for i in first + 1..=last {
        if let Some(v) = rows[i] {
            let gap = i - prev;
            if gap > 1 {
                let v0 = out[prev];
                for (k, slot) in out[prev + 1..i].iter_mut().enumerate() {
                    *slot = v0 + (v - v0) * (k + 1) as f64 / gap as f64;
                }
            }
            out[i] = v;
            prev = i;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digitize::test_support::{synthetic_chart, MAGENTA};
    use image::Rgb;

    #[test]
    fn test_rgb_to_hsv_magenta_in_range() {
        let (h, s, v) = rgb_to_hsv(MAGENTA[0], MAGENTA[1], MAGENTA[2]);
        assert!((140..=179).contains(&h), "hue {h} outside magenta band");
        assert!(s >= 60);
        assert!(v >= 60);
    }

    #[test]
    fn test_rgb_to_hsv_white_and_gray_excluded() {
        let (_, s, _) = rgb_to_hsv(255, 255, 255);
        assert_eq!(s, 0);
        let (_, _, v) = rgb_to_hsv(20, 20, 20);
        assert!(v < 60);
    }

    #[test]
    fn test_find_axis_column() {
        let img = synthetic_chart(90);
        let axis = find_axis_column(&img, &TemplateConfig::default());
        // The axis line sits at x=55; the gradient peaks one pixel either side
        assert!((54..=56).contains(&axis), "axis found at {axis}");
    }

    #[test]
    fn test_axis_fallback_when_no_line() {
        let img = RgbImage::from_pixel(400, 700, Rgb([255, 255, 255]));
        let axis = find_axis_column(&img, &TemplateConfig::default());
        assert_eq!(axis, 60);
    }

    #[test]
    fn test_extract_flat_trace() {
        let img = synthetic_chart(90);
        let config = TemplateConfig::default();
        let window = plot_window(&img, 55, &[40, 640]);
        let rows = extract_trace_rows(&img, window, &config).unwrap();

        assert_eq!(rows.len(), (window.x1 - window.x0) as usize);
        for &row in &rows {
            assert!((row - 90.0).abs() < 0.6, "row {row} drifted from 90");
        }
    }

    #[test]
    fn test_empty_trace_is_an_error() {
        let img = RgbImage::from_pixel(400, 700, Rgb([255, 255, 255]));
        let config = TemplateConfig::default();
        let window = PlotWindow { x0: 62, x1: 390, y0: 35, y1: 645 };
        let err = extract_trace_rows(&img, window, &config).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyTrace));
    }

    #[test]
    fn test_interpolate_gaps_linear_fill() {
        let rows = vec![None, Some(10.0), None, None, Some(40.0), None];
        let filled = interpolate_gaps(&rows).unwrap();
        assert_eq!(filled, vec![10.0, 10.0, 20.0, 30.0, 40.0, 40.0]);
    }

    #[test]
    fn test_interpolate_gaps_all_missing() {
        let rows: Vec<Option<f64>> = vec![None; 5];
        assert!(interpolate_gaps(&rows).is_none());
    }
}
