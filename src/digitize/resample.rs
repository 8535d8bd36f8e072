//! Series resampling.
//!
//! The plot window's pixel width varies a little between captures, so the
//! raw per-column series is normalized to a fixed number of points before
//! it is merged into the history. Linear interpolation over normalized
//! index positions preserves the trace shape and the endpoint values.

/// Resamples `series` to exactly `n` evenly spaced points.
///
/// Pass-through when the length already matches. The first and last output
/// values always equal the first and last input values.
pub fn resample(series: &[f64], n: usize) -> Vec<f64> {
    if series.is_empty() || n == 0 {
        return Vec::new();
    }
    if series.len() == n {
        return series.to_vec();
    }
    if series.len() == 1 {
        return vec![series[0]; n];
    }

    let span = (series.len() - 1) as f64;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let pos = if n == 1 {
            0.0
        } else {
            span * i as f64 / (n - 1) as f64
        };
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(series.len() - 1);
        let frac = pos - lo as f64;
        out.push(series[lo] + (series[hi] - series[lo]) * frac);
    }
    out
}
