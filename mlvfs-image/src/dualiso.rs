// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dual-ISO interlaced reconstruction.
//!
//! Ported from `original_source/mlvfs/hdr.c`'s `hdr_convert_data`.

use mlvfs_core::error::{unsupported_error, Result};

/// Result of dual-ISO detection: which rows-mod-4 are dark, the weighted-least-squares fit
/// between dark and bright histograms, and the derived shadow threshold (Open Question (b)).
#[derive(Debug, Clone, Copy)]
pub struct DualIsoFit {
    pub dark_row_start: u32,
    pub a: f64,
    pub b: f64,
    pub shadow: f64,
}

/// Builds four row-mod-4 green-channel histograms. Rows are subsampled every 5 rows, matching
/// `hdr_convert_data`'s `for (y = 4; y < height - 4; y += 5)`; within each sampled row only the
/// green photosites are read, via the same Bayer-phase column offset and stride-3 walk
/// `hdr.c` uses (`image_data[y*width + (y+1)%2]`, step 3) so red/blue samples never enter the
/// brightness histograms.
fn green_channel_histograms(image: &[u16], width: u32, height: u32) -> [Vec<u32>; 4] {
    let w = width as usize;
    let h = height as usize;
    let mut hist: [Vec<u32>; 4] = Default::default();
    for h_i in hist.iter_mut() {
        h_i.resize(1 << 16, 0);
    }

    if h <= 8 {
        return hist;
    }

    let mut y = 4usize;
    let y_end = h - 4;
    while y < y_end {
        let class = y % 4;
        let phase = (y + 1) % 2;
        let count = w.saturating_sub(phase);
        let mut idx = y * w + phase;
        for _ in 0..count {
            if idx >= image.len() {
                break;
            }
            hist[class][image[idx] as usize] += 1;
            idx += 3;
        }
        y += 5;
    }

    hist
}

fn weighted_median(hist: &[u32]) -> f64 {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0.0;
    }
    let half = total / 2;
    let mut acc = 0u64;
    for (v, &count) in hist.iter().enumerate() {
        acc += count as u64;
        if acc > half {
            return v as f64;
        }
    }
    0.0
}

/// The dark/bright row-class pairing and histogram selection for one `dark_row_start` candidate,
/// mirroring `hdr_convert_data`'s four `if`/`else if` branches verbatim (including which single
/// class of each pair becomes `hist_lo`/`hist_hi`, rather than a symmetric "first of pair" rule).
struct Candidate {
    dark_row_start: u32,
    dark_pair: [usize; 2],
    bright_pair: [usize; 2],
    lo_idx: usize,
    hi_idx: usize,
}

const CANDIDATES: [Candidate; 4] = [
    Candidate { dark_row_start: 0, dark_pair: [0, 1], bright_pair: [2, 3], lo_idx: 0, hi_idx: 2 },
    Candidate { dark_row_start: 1, dark_pair: [1, 2], bright_pair: [3, 0], lo_idx: 1, hi_idx: 0 },
    Candidate { dark_row_start: 2, dark_pair: [2, 3], bright_pair: [0, 1], lo_idx: 2, hi_idx: 0 },
    Candidate { dark_row_start: 3, dark_pair: [3, 0], bright_pair: [1, 2], lo_idx: 0, hi_idx: 2 },
];

/// Classifies which rows-mod-4 are "dark": the two classes whose medians are both at least 2x
/// lower than both of the other two classes' medians. Returns the matching candidate so callers
/// can reuse its `hist_lo`/`hist_hi` selection.
fn classify(medians: &[f64; 4]) -> Result<&'static Candidate> {
    for candidate in &CANDIDATES {
        let dark_max = medians[candidate.dark_pair[0]].max(medians[candidate.dark_pair[1]]);
        let bright_min = medians[candidate.bright_pair[0]].min(medians[candidate.bright_pair[1]]);
        if bright_min >= dark_max * 2.0 && dark_max > 0.0 {
            return Ok(candidate);
        }
    }

    unsupported_error("could not detect dual ISO interlaced lines")
}

/// Fits `y = a*x + b` by weighted least squares between the dark-row and bright-row green
/// histograms, and derives `shadow = black + 1/a^2 + b`.
pub fn detect(image: &[u16], width: u32, height: u32, black: u16) -> Result<DualIsoFit> {
    let hist = green_channel_histograms(image, width, height);
    let medians: [f64; 4] = std::array::from_fn(|class| weighted_median(&hist[class]));
    let candidate = classify(&medians)?;

    // Reuse the classification histograms for the fit rather than rescanning the whole image:
    // `hist_lo`/`hist_hi` in `hdr.c` are aliases into the same four green-channel histograms
    // built above, never a fresh pass.
    let dark_hist = &hist[candidate.lo_idx];
    let bright_hist = &hist[candidate.hi_idx];

    let dark_total: u64 = dark_hist.iter().map(|&c| c as u64).sum();
    let bright_total: u64 = bright_hist.iter().map(|&c| c as u64).sum();
    if dark_total == 0 || bright_total == 0 {
        return unsupported_error("could not detect dual ISO interlaced lines");
    }

    let lo_cut = (bright_total as f64 * 0.01) as u64;
    let hi_cut = (bright_total as f64 * 0.9999) as u64;

    let mut sum_w = 0.0f64;
    let mut sum_wx = 0.0f64;
    let mut sum_wy = 0.0f64;
    let mut sum_wxx = 0.0f64;
    let mut sum_wxy = 0.0f64;

    let mut dark_acc = 0u64;
    let mut bright_acc = 0u64;
    let mut dark_idx = 0usize;
    let mut bright_idx = 0usize;

    while dark_idx < dark_hist.len() && bright_idx < bright_hist.len() {
        while dark_idx < dark_hist.len() && dark_hist[dark_idx] == 0 {
            dark_idx += 1;
        }
        while bright_idx < bright_hist.len() && bright_hist[bright_idx] == 0 {
            bright_idx += 1;
        }
        if dark_idx >= dark_hist.len() || bright_idx >= bright_hist.len() {
            break;
        }

        dark_acc += dark_hist[dark_idx] as u64;
        bright_acc += bright_hist[bright_idx] as u64;

        if bright_acc >= lo_cut && bright_acc <= hi_cut {
            let raw_lo = dark_idx as f64;
            let raw_hi = bright_idx as f64;
            let x = raw_hi - black as f64;
            let y_val = raw_lo - black as f64;
            let weight = (raw_hi - black as f64 + 100.0).max(0.0);

            sum_w += weight;
            sum_wx += weight * x;
            sum_wy += weight * y_val;
            sum_wxx += weight * x * x;
            sum_wxy += weight * x * y_val;
        }

        if dark_acc <= bright_acc {
            dark_idx += 1;
        } else {
            bright_idx += 1;
        }
    }

    if sum_w <= 0.0 {
        return unsupported_error("could not detect dual ISO interlaced lines");
    }

    let denom = sum_w * sum_wxx - sum_wx * sum_wx;
    let (a, b) = if denom.abs() > f64::EPSILON {
        let a = (sum_w * sum_wxy - sum_wx * sum_wy) / denom;
        let b = (sum_wxx * sum_wy - sum_wx * sum_wxy) / denom;
        (a, b)
    } else {
        (1.0, 0.0)
    };

    if a.abs() < f64::EPSILON {
        return unsupported_error("could not detect dual ISO interlaced lines");
    }

    let shadow = black as f64 + 1.0 / (a * a) + b;

    Ok(DualIsoFit { dark_row_start: candidate.dark_row_start, a, b, shadow })
}

/// Applies a dual-ISO fit to `image` in place.
pub fn apply(image: &mut [u16], width: u32, height: u32, black: u16, white: u16, fit: &DualIsoFit) {
    let w = width as usize;
    let h = height as usize;
    let source = image.to_vec();

    for y in 0..h {
        let is_bright = ((y as i64 - fit.dark_row_start as i64).rem_euclid(4)) >= 2;
        for x in 0..w {
            let idx = y * w + x;
            let p = source[idx] as i32;

            if is_bright {
                if p >= white as i32 {
                    let y_hi = if y >= 2 { y - 2 } else { y };
                    let y_lo = if y + 2 < h { y + 2 } else { y };
                    let avg = (source[y_hi * w + x] as i64 + source[y_lo * w + x] as i64) / 2;
                    image[idx] = avg.clamp(0, white as i64) as u16;
                } else {
                    let mapped = (p - black as i32) as f64 * fit.a + fit.b + black as f64;
                    image[idx] = mapped.round().clamp(0.0, white as f64) as u16;
                }
            } else if (p as f64) < fit.shadow {
                let neighbor_y = if y + 2 < h { y + 2 } else { y };
                let neighbor = source[neighbor_y * w + x] as i32;
                let mapped = (neighbor - black as i32) as f64 * fit.a + fit.b + black as f64;
                let blended = (p as f64 + mapped) / 2.0;
                image[idx] = blended.round().clamp(0.0, white as f64) as u16;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_interlaced(width: u32, height: u32, black: u16, dark_val: u16, bright_scale: f64) -> Vec<u16> {
        let w = width as usize;
        let h = height as usize;
        let mut image = vec![0u16; w * h];
        for y in 0..h {
            let bright = (y % 4 == 2) || (y % 4 == 3);
            for x in 0..w {
                let v = if bright {
                    (black as f64 + (dark_val as f64 - black as f64) * bright_scale) as u16
                } else {
                    dark_val
                };
                image[y * w + x] = v;
            }
        }
        image
    }

    #[test]
    fn detects_dark_row_start_and_fits_slope() {
        let black = 2048u16;
        let image = synth_interlaced(64, 64, black, 2148, 4.0);
        let fit = detect(&image, 64, 64, black).unwrap();
        assert_eq!(fit.dark_row_start, 2);
        assert!((3.5..=4.5).contains(&fit.a), "a={}", fit.a);
    }

    #[test]
    fn green_channel_histogram_ignores_non_green_rows_before_row_four() {
        // Rows 0-3 are entirely outside the sampled range (`y` starts at 4), so corrupting
        // them with out-of-pattern values must not perturb the histograms or the fit.
        let black = 2048u16;
        let mut image = synth_interlaced(64, 64, black, 2148, 4.0);
        for x in 0..64usize {
            image[x] = 60000;
            image[64 + x] = 60000;
        }
        let fit = detect(&image, 64, 64, black).unwrap();
        assert_eq!(fit.dark_row_start, 2);
    }
}
