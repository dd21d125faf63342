// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DNG preview thumbnail generator: a fixed 128x84 RGB8 downsample of the
//! active sensor area, used both for IFD0's preview strip and (at coarser granularity) the
//! supplemented preview GIF.
//!
//! Ported from `original_source/mlvfs/mlvfs-dng.c`'s `dng_create_thumbnail`/`raw_to_8bit`. The
//! original samples within a separate `jpeg` preview sub-rectangle that this container's
//! `RawInfo` does not carry; the active area stands in for it here, which is the same
//! approximation `mlvfs-dng.c` falls back to whenever that sub-rectangle is unset.

use mlvfs_core::units::{CfaPattern, Rect};

pub const THUMBNAIL_WIDTH: u32 = 128;
pub const THUMBNAIL_HEIGHT: u32 = 84;
pub const THUMBNAIL_SIZE: usize = (THUMBNAIL_WIDTH * THUMBNAIL_HEIGHT * 3) as usize;

/// `⌊log2(max(1, raw - black)) + wb - 5⌋ * 255 / (log2(white - black) - 5)`, clamped to
/// `[0, 255]` (`raw_to_8bit`). `wb` is `0` for red/blue, `-1` for green, matching the
/// per-channel offsets the source hardcodes at each of the three `raw_to_8bit` call sites.
fn raw_to_8bit(raw: i32, wb: i32, black: i32, white: i32) -> u8 {
    let ev = ((raw - black).max(1) as f64).log2() + wb as f64 - 5.0;
    let max = ((white - black).max(2) as f64).log2() - 5.0;
    let out = (ev * 255.0 / max) as i32;
    out.clamp(0, 255) as u8
}

/// `(xadj, yadj)` quad-alignment offsets so the red/green/blue taps below land on same-colored
/// sites regardless of which corner of the Bayer quad is red (`mlvfs-dng.c`'s comment: "for the
/// second pattern yadj shifts the thumbnail row down one line... for the third pattern xadj
/// shifts the thumbnail row across one pixel").
fn quad_adjust(cfa: CfaPattern) -> (i32, i32) {
    match cfa {
        CfaPattern::Rggb => (1, 0),
        CfaPattern::Bggr => (0, 1),
        CfaPattern::Grbg | CfaPattern::Gbrg => (0, 0),
    }
}

fn sample(pixels: &[u16], width: u32, height: u32, x: i32, y: i32) -> i32 {
    let x = x.clamp(0, width as i32 - 1) as u32;
    let y = y.clamp(0, height as i32 - 1) as u32;
    pixels[(y * width + x) as usize] as i32
}

/// Builds the 128x84 RGB8 thumbnail from a fully unpacked (but not necessarily
/// correction-pipeline-processed) 16-bit Bayer `pixels` buffer.
pub fn build(pixels: &[u16], width: u32, height: u32, black: u16, white: u16, active_area: Rect, cfa: CfaPattern) -> Vec<u8> {
    downsample(pixels, width, height, black, white, active_area, cfa, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)
}

/// The same Bayer-aware RGB8 downsample `build` uses, generalized to an arbitrary output size
/// (used by the preview-GIF module to render a larger-than-thumbnail frame).
pub fn downsample(
    pixels: &[u16],
    width: u32,
    height: u32,
    black: u16,
    white: u16,
    active_area: Rect,
    cfa: CfaPattern,
    out_w: u32,
    out_h: u32,
) -> Vec<u8> {
    let (xadj, yadj) = quad_adjust(cfa);
    let active_w = (active_area.width()).max(1);
    let active_h = (active_area.height()).max(1);
    let black = black as i32;
    let white = white as i32;
    let out_w = out_w.max(1) as i32;
    let out_h = out_h.max(1) as i32;

    let mut out = Vec::with_capacity((out_w * out_h * 3) as usize);
    for i in 0..out_h {
        for j in 0..out_w {
            let x = active_area.x1 + ((active_w * j) / out_w & !1) + xadj;
            let y = active_area.y1 + ((active_h * i) / out_h & !1) + yadj;

            let r = sample(pixels, width, height, x, y);
            let g = sample(pixels, width, height, x + 1, y);
            let b = sample(pixels, width, height, x + 1, y + 1);

            out.push(raw_to_8bit(r, 0, black, white));
            out.push(raw_to_8bit(g, -1, black, white));
            out.push(raw_to_8bit(b, 0, black, white));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_declared_size() {
        let width = 64u32;
        let height = 64u32;
        let pixels = vec![8192u16; (width * height) as usize];
        let active_area = Rect { x1: 0, y1: 0, x2: width as i32, y2: height as i32 };
        let buf = build(&pixels, width, height, 2048, 15000, active_area, CfaPattern::Rggb);
        assert_eq!(buf.len(), THUMBNAIL_SIZE);
    }

    #[test]
    fn flat_field_maps_to_uniform_mid_tone() {
        let width = 64u32;
        let height = 64u32;
        let pixels = vec![8192u16; (width * height) as usize];
        let active_area = Rect { x1: 0, y1: 0, x2: width as i32, y2: height as i32 };
        let buf = build(&pixels, width, height, 2048, 15000, active_area, CfaPattern::Grbg);
        // red and blue channels share wb=0, so every red/blue sample should agree exactly.
        for px in buf.chunks_exact(3) {
            assert_eq!(px[0], px[2]);
        }
    }

    #[test]
    fn black_level_pixel_clamps_to_zero() {
        assert_eq!(raw_to_8bit(0, 0, 2048, 15000), 0);
        assert_eq!(raw_to_8bit(2048, 0, 2048, 15000), 0);
    }
}
