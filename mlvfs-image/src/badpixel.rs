// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bad-pixel detection/repair.
//!
//! Ported from `original_source/mlvfs/cs.c`'s `fix_bad_pixels`. The eight same-channel
//! neighbors are sorted once per pixel instead of tracked through the source's inline
//! running-max scan plus a separate Wirth selection call; a full sort of eight elements
//! yields the same order statistics (smallest, 2nd-smallest, 3rd-smallest, median) the source
//! extracts piecemeal.

use mlvfs_core::ev::{ev_tables, EV_RESOLUTION};
use mlvfs_core::error::Result;

const DARK_NOISE: i32 = 12;
const NEIGHBOR_OFFSETS: [(i32, i32); 8] =
    [(-2, -2), (0, -2), (2, -2), (-2, 0), (2, 0), (-2, 2), (0, 2), (2, 2)];

/// Repairs cold/hot pixels of the `width * height` single-channel Bayer buffer `image` in
/// place. `aggressive` enables the two extra thresholds for borderline hot pixels.
pub fn fix_bad_pixels(image: &mut [u16], width: u32, height: u32, black: u16, aggressive: bool) -> Result<()> {
    let tables = ev_tables(black as i32)?;
    let w = width as i32;
    let h = height as i32;
    let black = black as i32;

    for y in 6..h - 6 {
        for x in 6..w - 6 {
            let center = (x + y * w) as usize;
            let p = image[center] as i32;

            let mut neighbours = [0i32; 8];
            for (k, (dx, dy)) in NEIGHBOR_OFFSETS.iter().enumerate() {
                let idx = ((x + dx) + (y + dy) * w) as usize;
                neighbours[k] = -(image[idx] as i32);
            }
            neighbours.sort_unstable();

            let second = neighbours[1]; // 2nd largest original neighbor

            if p < black - DARK_NOISE * 8 {
                image[center] = (-median_of_eight(&neighbours)) as u16;
            } else if tables.raw2ev(p) - tables.raw2ev(-second) > 2 * EV_RESOLUTION
                && p > black + 8 * DARK_NOISE
            {
                image[center] = (-second) as u16;
            } else if aggressive {
                let third = neighbours[2];
                if (tables.raw2ev(p) - tables.raw2ev(-second) > EV_RESOLUTION / 4
                    && p > black + 8 * DARK_NOISE)
                    || tables.raw2ev(p) - tables.raw2ev(-third) > EV_RESOLUTION / 2
                {
                    image[center] = (-third) as u16;
                }
            }
        }
    }

    Ok(())
}

fn median_of_eight(sorted: &[i32; 8]) -> i32 {
    sorted[4]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, value: u16) -> Vec<u16> {
        vec![value; (width * height) as usize]
    }

    #[test]
    fn hot_pixel_is_replaced_by_second_brightest_neighbor() {
        let w = 32u32;
        let h = 32u32;
        let mut image = flat_frame(w, h, 2100);
        let center = (16 + 16 * w) as usize;
        image[center] = 16000; // far brighter than its neighbors

        fix_bad_pixels(&mut image, w, h, 2048, false).unwrap();
        assert_eq!(image[center], 2100);
    }

    #[test]
    fn cold_pixel_is_replaced_by_median_of_neighbors() {
        let w = 32u32;
        let h = 32u32;
        let mut image = flat_frame(w, h, 2100);
        let center = (16 + 16 * w) as usize;
        image[center] = 0; // far below black - 8*dark_noise

        fix_bad_pixels(&mut image, w, h, 2048, false).unwrap();
        assert_eq!(image[center], 2100);
    }

    #[test]
    fn uniform_frame_is_untouched() {
        let w = 32u32;
        let h = 32u32;
        let mut image = flat_frame(w, h, 2100);
        let before = image.clone();
        fix_bad_pixels(&mut image, w, h, 2048, true).unwrap();
        assert_eq!(image, before);
    }
}
