// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level still-image assembly and the lazy byte-range reader.
//!
//! Grounded in `original_source/mlvfs/dng.h`'s offset/`max_size` read contract
//! (`dng_get_header_data`/`dng_get_image_data`): callers never materialize a whole DNG file,
//! they ask for one byte range at a time (a FUSE `read()` request's `(offset, size)`), and this
//! module serves whichever of {header, thumbnail, raw strip} that range falls in, unpacking
//! only the raw samples the range actually touches.

use mlvfs_core::metadata::FrameHeaderBundle;
use mlvfs_core::units::CfaPattern;

use crate::header::{self, Header};
use crate::thumbnail;

/// One frame's fully-assembled DNG: the TIFF/DNG header plus the RGB8 preview thumbnail. The
/// corrected 16-bit Bayer samples are passed in fresh at read time rather than duplicated here,
/// since the resource manager (`mlvfs_core::cache::BufferCache`) already owns that buffer.
pub struct StillImage {
    pub header: Header,
    pub thumbnail: Vec<u8>,
}

impl StillImage {
    pub fn total_size(&self) -> u64 {
        self.header.main_offset + self.header.strip_len
    }

    /// Serves up to `max_size` bytes starting at `offset` into the synthetic DNG file.
    pub fn read(&self, pixels: &[u16], offset: u64, max_size: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max_size.min(self.total_size().saturating_sub(offset) as usize));

        if offset < self.header.bytes.len() as u64 {
            let start = offset as usize;
            let take = (self.header.bytes.len() - start).min(max_size);
            out.extend_from_slice(&self.header.bytes[start..start + take]);
        }
        if out.len() >= max_size {
            return out;
        }

        let thumb_start = self.header.thumb_offset;
        let thumb_end = thumb_start + self.thumbnail.len() as u64;
        let want_start = offset.max(thumb_start);
        if want_start < thumb_end {
            let local_start = (want_start - thumb_start) as usize;
            let take = (self.thumbnail.len() - local_start).min(max_size - out.len());
            out.extend_from_slice(&self.thumbnail[local_start..local_start + take]);
        }
        if out.len() >= max_size {
            return out;
        }

        let strip_start = self.header.main_offset;
        let want_strip_offset = offset.max(strip_start) - strip_start;
        out.extend(read_strip_range(pixels, want_strip_offset, max_size - out.len()));

        out
    }
}

/// Lazily serializes `pixels` (native-order 16-bit samples) as little-endian bytes, returning
/// only the `[byte_offset, byte_offset + want)` window — "on the fly" unpacking applied in
/// reverse (packing corrected samples back to bytes) since the strip is always served as plain
/// 16-bit samples regardless of the container's original bit depth.
fn read_strip_range(pixels: &[u16], byte_offset: u64, want: usize) -> Vec<u8> {
    let total_bytes = pixels.len() as u64 * 2;
    if byte_offset >= total_bytes || want == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(want);
    let mut sample_idx = (byte_offset / 2) as usize;
    let mut skip_first_byte = byte_offset % 2 == 1;

    while out.len() < want && sample_idx < pixels.len() {
        let bytes = pixels[sample_idx].to_le_bytes();
        if skip_first_byte {
            out.push(bytes[1]);
            skip_first_byte = false;
        } else {
            out.push(bytes[0]);
            if out.len() < want {
                out.push(bytes[1]);
            }
        }
        sample_idx += 1;
    }
    out
}

/// Builds the still image for `bundle`'s frame from its corrected 16-bit `pixels` buffer.
pub fn build(bundle: &FrameHeaderBundle, pixels: &[u16]) -> StillImage {
    let strip_len = pixels.len() as u32 * 2;
    let header = header::build(bundle, strip_len);
    let cfa = bundle.rawi.cfa_pattern().unwrap_or(CfaPattern::Rggb);
    let thumbnail = thumbnail::build(
        pixels,
        bundle.rawi.x_res as u32,
        bundle.rawi.y_res as u32,
        bundle.rawi.black_level,
        bundle.rawi.white_level,
        bundle.rawi.active_area,
        cfa,
    );
    StillImage { header, thumbnail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlvfs_core::metadata::{RawInfo, VidfHeader};
    use mlvfs_core::units::{Crop, Rect, SRational};

    fn sample_bundle(width: u16, height: u16) -> FrameHeaderBundle {
        let mut bundle = FrameHeaderBundle {
            vidf: VidfHeader { frame_number: 0, frame_space: 0 },
            rawi: RawInfo {
                x_res: width,
                y_res: height,
                bits_per_pixel: 14,
                black_level: 2048,
                white_level: 15000,
                cfa_code: 0x0201_0100,
                color_matrix: [SRational::new(1, 1); 9],
                active_area: Rect { x1: 0, y1: 0, x2: width as i32, y2: height as i32 },
                crop: Crop { x: 0, y: 0, w: width as i32, h: height as i32 },
                exposure_bias: SRational::new(0, 1),
                frame_size: width as u32 * height as u32 * 14 / 8,
                pitch: 0,
            },
            ..Default::default()
        };
        bundle.mlvi.fps_num = 24000;
        bundle.mlvi.fps_den = 1001;
        bundle
    }

    #[test]
    fn whole_file_reads_concatenate_to_declared_size() {
        let bundle = sample_bundle(8, 4);
        let pixels: Vec<u16> = (0..32).map(|i| 2048 + i).collect();
        let image = build(&bundle, &pixels);

        let whole = image.read(&pixels, 0, image.total_size() as usize);
        assert_eq!(whole.len() as u64, image.total_size());
        assert_eq!(&whole[0..2], b"II");
    }

    #[test]
    fn partial_reads_match_whole_file_window() {
        let bundle = sample_bundle(8, 4);
        let pixels: Vec<u16> = (0..32).map(|i| 2048 + i).collect();
        let image = build(&bundle, &pixels);
        let whole = image.read(&pixels, 0, image.total_size() as usize);

        let window = image.read(&pixels, 100, 37);
        assert_eq!(window, whole[100..137]);
    }

    #[test]
    fn strip_bytes_match_little_endian_samples() {
        let bundle = sample_bundle(4, 2);
        let pixels: Vec<u16> = vec![0x1234, 0x5678, 0x9ABC, 0xDEF0, 1, 2, 3, 4];
        let image = build(&bundle, &pixels);
        let strip = image.read(&pixels, image.header.main_offset, pixels.len() * 2);
        assert_eq!(&strip[0..2], &0x1234u16.to_le_bytes());
        assert_eq!(&strip[2..4], &0x5678u16.to_le_bytes());
    }
}
