// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-unpacking and the per-frame Bayer correction pipeline: bad-pixel repair, dual-ISO
//! reconstruction, stripe correction, chroma smoothing, and deflicker.

pub mod badpixel;
pub mod chroma;
pub mod deflicker;
pub mod dualiso;
pub mod pipeline;
pub mod stripes;
pub mod unpack;

pub use badpixel::fix_bad_pixels;
pub use chroma::chroma_smooth;
pub use deflicker::deflicker;
pub use dualiso::{apply as apply_dual_iso, detect as detect_dual_iso, DualIsoFit};
pub use pipeline::{BadPixelMode, ChromaSmoothMode, FrameGeometry, PipelineOptions};
pub use stripes::StripeCorrection;
pub use unpack::{repack_bpp, unpack_bpp};
