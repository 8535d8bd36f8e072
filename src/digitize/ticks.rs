//! Y-axis tick detection.
//!
//! The chart labels its gridlines down the left edge of the panel. Rather
//! than reading the label text, this finds the pixel rows the labels sit on:
//! the per-row ink count over the label strip peaks at every label, and the
//! peak rows become tick centroids. Getting these rows right is what makes
//! the row-to-value mapping stable across captures.

use image::RgbImage;

use crate::config::TemplateConfig;
use crate::digitize::panel::luma;
use crate::digitize::ExtractError;

/// Detects the pixel rows of the Y-axis gridline labels, sorted top to
/// bottom.
///
/// Fails with [`ExtractError::TickDetectionFailed`] when fewer than the
/// configured minimum are found; that means the capture does not match the
/// expected chart template (or is blank) and no value mapping would be safe.
pub fn detect_tick_rows(panel: &RgbImage, config: &TemplateConfig) -> Result<Vec<u32>, ExtractError> {
    let (width, height) = panel.dimensions();
    let strip_width = config.label_strip_width.min(width);

    // Per-row ink count over the label strip: dark pixels on the light
    // panel background.
    let mut ink = vec![0.0f64; height as usize];
    for y in 0..height {
        let mut count = 0u32;
        for x in 0..strip_width {
            if luma(panel.get_pixel(x, y)) <= config.label_ink_threshold as f32 {
                count += 1;
            }
        }
        ink[y as usize] = count as f64;
    }

    let smooth = moving_average(&ink, config.smooth_window);
    let peaks = find_peaks(&smooth, config.peak_fraction);
    let centroids = cluster_peaks(&peaks, config.cluster_gap);

    if centroids.len() < config.min_ticks {
        return Err(ExtractError::TickDetectionFailed {
            found: centroids.len(),
            needed: config.min_ticks,
        });
    }
    Ok(centroids)
}

/// Centered moving average with zero padding outside the signal, merging
/// the anti-aliased rows of one glyph into a single bump.
pub(crate) fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    if signal.is_empty() || window == 0 {
        return signal.to_vec();
    }
    let half = window / 2;
    let n = signal.len();
    let mut out = vec![0.0; n];
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);
        let sum: f64 = signal[lo..=hi].iter().sum();
        out[i] = sum / window as f64;
    }
    out
}

/// Local maxima exceeding `fraction` of the global peak.
fn find_peaks(smooth: &[f64], fraction: f64) -> Vec<u32> {
    if smooth.len() < 5 {
        return Vec::new();
    }
    let max = smooth.iter().cloned().fold(0.0f64, f64::max);
    let threshold = max * fraction;

    let mut peaks = Vec::new();
    for i in 2..smooth.len() - 2 {
        if smooth[i] > threshold && smooth[i] > smooth[i - 1] && smooth[i] >= smooth[i + 1] {
            peaks.push(i as u32);
        }
    }
    peaks
}

/// Merges peaks whose rows are within `gap` of the previous peak into one
/// cluster; each cluster collapses to its mean row.
///
/// Expects `peaks` sorted ascending (as produced by the row scan).
pub(crate) fn cluster_peaks(peaks: &[u32], gap: u32) -> Vec<u32> {
    let mut clusters: Vec<Vec<u32>> = Vec::new();
    for &p in peaks {
        let extends_last = clusters
            .last()
            .and_then(|c| c.last())
            .is_some_and(|&last| p - last <= gap);
        if extends_last {
            if let Some(cluster) = clusters.last_mut() {
                cluster.push(p);
            }
        } else {
            clusters.push(vec![p]);
        }
    }

    let mut centroids: Vec<u32> = clusters
        .iter()
        .map(|c| {
            let sum: u64 = c.iter().map(|&p| p as u64).sum();
            (sum as f64 / c.len() as f64).round() as u32
        })
        .collect();
    centroids.sort_unstable();
    centroids
}
