// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chroma smoothing: per-pixel EV-space median smoothing of the Bayer buffer against
//! a local per-color luma estimate, in one of three kernel radii.
//!
//! Ported from `original_source/mlvfs/cs.c`'s family of `chroma_smooth_{2x2,3x3,5x5}`
//! functions (originally three near-identical translation units generated by re-including the
//! same body under different preprocessor macros); parameterized once here over the
//! same-color neighbor-offset table instead (Open Question, `DESIGN.md`).

use mlvfs_core::ev::ev_tables;
use mlvfs_core::error::{unsupported_error, Result};
use mlvfs_core::units::CfaPattern;

const OPPOSITE_OFFSETS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

const FOUR: [(i32, i32); 4] = [(-2, 0), (2, 0), (0, -2), (0, 2)];
const EIGHT: [(i32, i32); 8] =
    [(-2, 0), (2, 0), (0, -2), (0, 2), (-2, -2), (2, -2), (-2, 2), (2, 2)];
const TWELVE: [(i32, i32); 12] = [
    (-2, 0), (2, 0), (0, -2), (0, 2),
    (-2, -2), (2, -2), (-2, 2), (2, 2),
    (-4, 0), (4, 0), (0, -4), (0, 4),
];

fn same_color_offsets(method: u32) -> Result<&'static [(i32, i32)]> {
    match method {
        2 => Ok(&FOUR),
        3 => Ok(&EIGHT),
        5 => Ok(&TWELVE),
        _ => unsupported_error("unsupported chroma smooth method"),
    }
}

fn median_ev(values: &mut [i32]) -> i32 {
    values.sort_unstable();
    values[values.len() / 2]
}

/// Smooths `image` (`width * height`, single-channel Bayer) in place using `method` (`2`, `3`,
/// or `5`). Reads are taken from a scratch copy so every pixel sees pre-smoothed neighbor
/// values.
pub fn chroma_smooth(
    image: &mut [u16],
    width: u32,
    height: u32,
    black: u16,
    cfa: CfaPattern,
    method: u32,
) -> Result<()> {
    let offsets = same_color_offsets(method)?;
    let tables = ev_tables(black as i32)?;
    let w = width as i32;
    let h = height as i32;
    let margin = offsets.iter().map(|(dx, dy)| dx.abs().max(dy.abs())).max().unwrap_or(2) + 1;

    let source = image.to_vec();
    let tiff = cfa.tiff_cfa_bytes();
    let color_at = |x: i32, y: i32| tiff[((y & 1) as usize) * 2 + (x & 1) as usize];

    for y in margin..h - margin {
        for x in margin..w - margin {
            let mut luma: Vec<i32> = offsets
                .iter()
                .copied()
                .map(|(dx, dy)| {
                    let idx = ((x + dx) + (y + dy) * w) as usize;
                    tables.raw2ev(source[idx] as i32)
                })
                .collect();
            let luma_ev = median_ev(&mut luma);

            let own_color = color_at(x, y);
            let mut chroma: Vec<i32> = OPPOSITE_OFFSETS
                .iter()
                .copied()
                .filter(|(dx, dy)| color_at(x + dx, y + dy) != own_color)
                .map(|(dx, dy)| {
                    let idx = ((x + dx) + (y + dy) * w) as usize;
                    tables.raw2ev(source[idx] as i32) - luma_ev
                })
                .collect();
            let chroma_ev = if chroma.is_empty() { 0 } else { median_ev(&mut chroma) };

            let idx = (x + y * w) as usize;
            image[idx] = tables.ev2raw(luma_ev + chroma_ev).max(0) as u16;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, value: u16) -> Vec<u16> {
        vec![value; (width * height) as usize]
    }

    #[test]
    fn uniform_frame_stays_close_to_original() {
        let w = 32u32;
        let h = 32u32;
        let mut image = flat_frame(w, h, 4096);
        chroma_smooth(&mut image, w, h, 2048, CfaPattern::Rggb, 2).unwrap();
        for &v in &image {
            assert!((v as i32 - 4096).abs() <= 2, "v={}", v);
        }
    }

    #[test]
    fn rejects_unsupported_method() {
        let w = 32u32;
        let h = 32u32;
        let mut image = flat_frame(w, h, 4096);
        assert!(chroma_smooth(&mut image, w, h, 2048, CfaPattern::Rggb, 4).is_err());
    }

    #[test]
    fn all_three_kernel_radii_run_without_panicking() {
        for method in [2u32, 3, 5] {
            let w = 32u32;
            let h = 32u32;
            let mut image = flat_frame(w, h, 4096);
            chroma_smooth(&mut image, w, h, 2048, CfaPattern::Grbg, method).unwrap();
        }
    }
}
