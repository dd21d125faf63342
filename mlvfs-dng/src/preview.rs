// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Supplemented feature: a `preview.GIF` per container, a small animated preview
//! sampled evenly across the frame range.
//!
//! Ported from `original_source/mlvfs/gif.c`'s `gif_get_data`: ten frames (`FRAME_COUNT`),
//! downscaled 4x (`DOWNSCALE`), selected at `frame * frame_count / FRAME_COUNT`. The source
//! hand-rolls an "uncompressed GIF" bitstream (a greyscale palette plus a Clear-Code-every-N-
//! bytes trick to skip real LZW) because it has no GIF-encoding dependency available; this
//! crate has one (`gif`), so the animation is built with that instead, at full RGB color rather
//! than the source's single-channel greyscale palette.

use mlvfs_core::error::{MlvError, Result};
use mlvfs_core::units::CfaPattern;

use crate::thumbnail;

/// Number of frames sampled across the container's full frame range.
pub const FRAME_COUNT: usize = 10;
/// Downscale factor applied to the source frame's resolution for the preview.
pub const DOWNSCALE: u32 = 4;
/// Centiseconds between frames in the animation's graphics control block (0.5s, matching the
/// source's hardcoded `gif_animation_graphics_block` delay).
const FRAME_DELAY_CENTISECONDS: u16 = 50;

/// One sampled-and-downscaled RGB8 frame, ready to hand to the `gif` crate.
pub struct PreviewFrame {
    pub width: u16,
    pub height: u16,
    pub rgb: Vec<u8>,
}

/// The CFA-aware geometry [`sample_frame`] needs to downsample one frame.
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub black: u16,
    pub white: u16,
    pub cfa: CfaPattern,
    pub active_area: mlvfs_core::units::Rect,
}

/// Downsamples one corrected 16-bit Bayer `pixels` buffer into a preview frame.
pub fn sample_frame(pixels: &[u16], geometry: &FrameGeometry) -> PreviewFrame {
    let out_w = (geometry.width / DOWNSCALE).max(1);
    let out_h = (geometry.height / DOWNSCALE).max(1);
    let rgb = thumbnail::downsample(
        pixels,
        geometry.width,
        geometry.height,
        geometry.black,
        geometry.white,
        geometry.active_area,
        geometry.cfa,
        out_w,
        out_h,
    );
    PreviewFrame { width: out_w as u16, height: out_h as u16, rgb }
}

/// Which of a container's `frame_count` frames to sample for each of the ten preview frames
/// (`gif.c`'s `mlv_frame_number = gif_frame * frame_count / FRAME_COUNT`).
pub fn sample_indices(frame_count: usize) -> Vec<usize> {
    (0..FRAME_COUNT).map(|i| i * frame_count / FRAME_COUNT).collect()
}

/// Encodes `frames` (already sampled at [`sample_indices`]) as an animated GIF.
pub fn encode(frames: Vec<PreviewFrame>) -> Result<Vec<u8>> {
    let (width, height) = match frames.first() {
        Some(f) => (f.width, f.height),
        None => return Ok(Vec::new()),
    };

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &[])
            .map_err(|_| MlvError::CorruptContainer("failed to initialize GIF encoder"))?;
        encoder
            .set_repeat(gif::Repeat::Infinite)
            .map_err(|_| MlvError::CorruptContainer("failed to set GIF repeat mode"))?;

        for mut frame in frames {
            let mut gif_frame = gif::Frame::from_rgb(frame.width, frame.height, &mut frame.rgb);
            gif_frame.delay = FRAME_DELAY_CENTISECONDS;
            encoder
                .write_frame(&gif_frame)
                .map_err(|_| MlvError::CorruptContainer("failed to write GIF frame"))?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_indices_spread_evenly_across_range() {
        let indices = sample_indices(100);
        assert_eq!(indices.len(), FRAME_COUNT);
        assert_eq!(indices[0], 0);
        assert_eq!(indices[9], 90);
    }

    #[test]
    fn encode_empty_frame_list_is_empty_gif() {
        let bytes = encode(Vec::new()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn encode_single_frame_starts_with_gif_magic() {
        let frame = PreviewFrame { width: 4, height: 2, rgb: vec![128u8; 4 * 2 * 3] };
        let bytes = encode(vec![frame]).unwrap();
        assert_eq!(&bytes[0..3], b"GIF");
    }
}
