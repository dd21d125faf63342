// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The still-image (DNG) emitter: TIFF directory primitives, the DNG tag tables,
//! the preview thumbnail generator, the `FixBadPixelsConstant` opcode list, the per-frame
//! still-image assembler, and the supplemented preview-GIF encoder.

pub mod datetime;
pub mod header;
pub mod opcode;
pub mod preview;
pub mod still_image;
pub mod thumbnail;
pub mod tiff;

pub use still_image::{build, StillImage};
