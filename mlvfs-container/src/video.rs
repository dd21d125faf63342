// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw video payload reads: locates the packed sensor bytes that follow a
//! resolved frame's `VIDF` prelude and header.
//!
//! `mlvfs-dng`'s image-data emitter treats this as the packed source buffer for
//! `mlvfs_image::unpack::unpack_bpp`; everything before the payload (the block prelude, the
//! `VIDF` fields, and the `frame_space` padding the source reserves for in-place edits) is
//! skipped here rather than by the caller.

use mlvfs_core::error::Result;
use mlvfs_core::metadata::FrameHeaderBundle;

use crate::chunks::ChunkSet;

/// Bytes occupied by the block prelude (16) plus the `VIDF` fixed fields (`frame_number`,
/// `frame_space`: 4 each).
const VIDF_HEADER_SIZE: u64 = 16 + 8;

/// Reads the packed sensor bytes for `bundle`'s frame: `rawi.frame_size` bytes starting right
/// after the `VIDF` header and its `frame_space` padding.
pub fn read_frame_pixels(chunks: &ChunkSet, bundle: &FrameHeaderBundle) -> Result<Vec<u8>> {
    let payload_offset = bundle.position + VIDF_HEADER_SIZE + bundle.vidf.frame_space as u64;
    chunks.read_at(bundle.file_number as u16, payload_offset, bundle.rawi.frame_size as usize)
}
