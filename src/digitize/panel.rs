//! Panel localization.
//!
//! Screenshots arrive with varying amounts of dark chrome around the chart:
//! browser borders, site navigation, drop shadows. Everything downstream
//! assumes pixel positions inside the white plotting panel, so the first
//! step is to crop to it. Near-white pixels are thresholded, a closing pass
//! fills the holes left by labels and the trace, and the largest connected
//! white region wins.

use image::RgbImage;

use crate::config::TemplateConfig;

/// A bounding rectangle in panel pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crops the chart panel out of a raw screenshot.
///
/// When no white region is found the original image is returned unchanged.
/// That is a soft fallback, not an error: tick detection may still succeed
/// on an uncropped capture, it is just less likely to.
pub fn crop_to_panel(img: &RgbImage, config: &TemplateConfig) -> RgbImage {
    match locate_panel(img, config) {
        Some(rect) => {
            image::imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image()
        }
        None => {
            crate::log("Panel not found; falling back to the full image");
            img.clone()
        }
    }
}

/// Finds the bounding rectangle of the largest near-white region.
pub fn locate_panel(img: &RgbImage, config: &TemplateConfig) -> Option<Rect> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut mask = vec![false; (width * height) as usize];
    for (x, y, pixel) in img.enumerate_pixels() {
        if luma(pixel) > config.panel_threshold as f32 {
            mask[(y * width + x) as usize] = true;
        }
    }

    // Closing (dilate then erode, two passes each) merges the holes punched
    // by axis labels and the trace into one contiguous white region.
    let r = config.panel_close_radius;
    for _ in 0..2 {
        mask = box_dilate(&mask, width, height, r);
    }
    for _ in 0..2 {
        mask = box_erode(&mask, width, height, r);
    }

    largest_region(&mask, width, height)
}

/// ITU-R BT.601 luma, matching the grayscale conversion the rest of the
/// pipeline uses.
pub(crate) fn luma(pixel: &image::Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Square dilation: a pixel is set if any pixel within the (2r+1)^2 window
/// around it is set. Implemented with an integral image so large kernels
/// stay linear in the pixel count.
fn box_dilate(mask: &[bool], width: u32, height: u32, r: u32) -> Vec<bool> {
    let sums = integral(mask, width, height);
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            if window_sum(&sums, width, height, x, y, r) > 0 {
                out[(y * width + x) as usize] = true;
            }
        }
    }
    out
}

/// Square erosion: a pixel survives only if the whole window is set.
fn box_erode(mask: &[bool], width: u32, height: u32, r: u32) -> Vec<bool> {
    let sums = integral(mask, width, height);
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let x0 = x.saturating_sub(r);
            let y0 = y.saturating_sub(r);
            let x1 = (x + r).min(width - 1);
            let y1 = (y + r).min(height - 1);
            let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as u64;
            if window_sum(&sums, width, height, x, y, r) == area {
                out[(y * width + x) as usize] = true;
            }
        }
    }
    out
}

/// Summed-area table with one extra row/column of zeros.
fn integral(mask: &[bool], width: u32, height: u32) -> Vec<u64> {
    let w = (width + 1) as usize;
    let mut sums = vec![0u64; w * (height as usize + 1)];
    for y in 0..height as usize {
        let mut row_sum = 0u64;
        for x in 0..width as usize {
            row_sum += mask[y * width as usize + x] as u64;
            sums[(y + 1) * w + x + 1] = sums[y * w + x + 1] + row_sum;
        }
    }
    sums
}

fn window_sum(sums: &[u64], width: u32, height: u32, x: u32, y: u32, r: u32) -> u64 {
    let x0 = x.saturating_sub(r) as usize;
    let y0 = y.saturating_sub(r) as usize;
    let x1 = (x + r).min(width - 1) as usize + 1;
    let y1 = (y + r).min(height - 1) as usize + 1;
    let w = (width + 1) as usize;
    sums[y1 * w + x1] + sums[y0 * w + x0] - sums[y0 * w + x1] - sums[y1 * w + x0]
}

/// Flood-fills 4-connected regions and returns the bounding rect of the one
/// with the greatest pixel area.
fn largest_region(mask: &[bool], width: u32, height: u32) -> Option<Rect> {
    let mut visited = vec![false; mask.len()];
    let mut best: Option<(u64, Rect)> = None;
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let idx = (start_y * width + start_x) as usize;
            if !mask[idx] || visited[idx] {
                continue;
            }

            let (mut min_x, mut max_x) = (start_x, start_x);
            let (mut min_y, mut max_y) = (start_y, start_y);
            let mut area = 0u64;

            visited[idx] = true;
            stack.push((start_x, start_y));
            while let Some((x, y)) = stack.pop() {
                area += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                let mut visit = |nx: u32, ny: u32, stack: &mut Vec<(u32, u32)>| {
                    let nidx = (ny * width + nx) as usize;
                    if mask[nidx] && !visited[nidx] {
                        visited[nidx] = true;
                        stack.push((nx, ny));
                    }
                };
                if x > 0 {
                    visit(x - 1, y, &mut stack);
                }
                if x + 1 < width {
                    visit(x + 1, y, &mut stack);
                }
                if y > 0 {
                    visit(x, y - 1, &mut stack);
                }
                if y + 1 < height {
                    visit(x, y + 1, &mut stack);
                }
            }

            let rect = Rect {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            };
            if best.map(|(a, _)| area > a).unwrap_or(true) {
                best = Some((area, rect));
            }
        }
    }

    best.map(|(_, rect)| rect)
}
