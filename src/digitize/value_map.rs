//! Pixel-row to domain-value mapping.
//!
//! The chart template is fixed: the topmost tick label is the maximum value
//! and each label below it steps down by a constant amount. The mapping is
//! purely positional; no label text is ever read. If the site ever switches
//! to a dynamically scaled axis this will silently produce wrong values, so
//! the template (top value, step) lives in config where it can be swapped.

use crate::config::TemplateConfig;

/// A monotone decreasing piecewise-linear function from pixel row to
/// domain value, clamped to the endpoint values outside the tick span.
#[derive(Debug, Clone)]
pub struct ValueMap {
    rows: Vec<f64>,
    values: Vec<f64>,
}

impl ValueMap {
    /// Builds the map from detected tick rows (sorted top to bottom).
    ///
    /// The topmost tick takes `config.top_tick_value`; each following tick
    /// steps down by `config.tick_step`.
    pub fn from_ticks(ticks: &[u32], config: &TemplateConfig) -> Self {
        let rows: Vec<f64> = ticks.iter().map(|&r| r as f64).collect();
        let values: Vec<f64> = (0..ticks.len())
            .map(|i| config.top_tick_value - config.tick_step * i as f64)
            .collect();
        Self { rows, values }
    }

    /// Maps a pixel row to a domain value.
    pub fn value_at(&self, row: f64) -> f64 {
        let n = self.rows.len();
        if row <= self.rows[0] {
            return self.values[0];
        }
        if row >= self.rows[n - 1] {
            return self.values[n - 1];
        }

        // Find the segment containing `row`; the clamps above guarantee one
        // exists.
        let mut i = match self
            .rows
            .binary_search_by(|r| r.partial_cmp(&row).unwrap())
        {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        i = i.min(n - 2);

        let (r0, r1) = (self.rows[i], self.rows[i + 1]);
        let (v0, v1) = (self.values[i], self.values[i + 1]);
        v0 + (v1 - v0) * ((row - r0) / (r1 - r0))
    }
}
