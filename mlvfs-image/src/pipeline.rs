// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Correction pipeline orchestration: runs bad-pixel repair, dual-ISO reconstruction,
//! stripe correction, and chroma smoothing in that default order, with deflicker as an optional
//! final pass. Each step is independently configurable and skipped (with a logged diagnostic)
//! rather than aborting the frame on failure.

use log::warn;

use mlvfs_core::units::CfaPattern;

use crate::badpixel::fix_bad_pixels;
use crate::chroma::chroma_smooth;
use crate::deflicker::deflicker;
use crate::dualiso;
use crate::stripes::{self, StripeCorrection};

/// Bad-pixel repair strength (the `badpix` configuration option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BadPixelMode {
    #[default]
    Off,
    On,
    Aggressive,
}

/// Chroma smoothing kernel radius (the `chroma_smooth` configuration option); `Off` skips the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaSmoothMode {
    #[default]
    Off,
    Method2,
    Method3,
    Method5,
}

impl ChromaSmoothMode {
    fn method(self) -> Option<u32> {
        match self {
            ChromaSmoothMode::Off => None,
            ChromaSmoothMode::Method2 => Some(2),
            ChromaSmoothMode::Method3 => Some(3),
            ChromaSmoothMode::Method5 => Some(5),
        }
    }
}

/// Per-frame geometry and levels needed by every stage of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub black: u16,
    pub white: u16,
    pub cfa: CfaPattern,
}

/// The set of correction passes to run, mirroring the `mlvfs::Config` fields that control them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub badpix: BadPixelMode,
    pub dual_iso: bool,
    pub fix_stripes: bool,
    pub chroma_smooth: ChromaSmoothMode,
    pub deflicker: bool,
}

/// A stripe-correction record estimated once per container and reused across frames, since
/// estimation requires one representative frame but application is cheap per frame.
pub type CachedStripeCorrection = StripeCorrection;

/// Runs the default-order correction pipeline on `image` in place: bad-pixel repair, dual-ISO,
/// stripe correction, chroma smoothing, then (if enabled) deflicker.
///
/// `stripe_correction` is the container-wide cache slot holding the stripe-correction record:
/// `None` means estimation has not yet happened for this container, in which case
/// this call estimates from the current (post bad-pixel/dual-ISO) image and fills the slot;
/// `Some` means a previous call already estimated it, so this call only applies the cached
/// coefficients. Callers share one slot per container across frames so estimation runs exactly
/// once regardless of which frame is decoded first.
pub fn run(
    image: &mut [u16],
    geometry: FrameGeometry,
    options: &PipelineOptions,
    stripe_correction: &mut Option<StripeCorrection>,
    deflicker_target: u16,
) {
    if options.badpix != BadPixelMode::Off {
        let aggressive = options.badpix == BadPixelMode::Aggressive;
        if let Err(e) = fix_bad_pixels(image, geometry.width, geometry.height, geometry.black, aggressive) {
            warn!("bad-pixel repair skipped: {}", e);
        }
    }

    if options.dual_iso {
        match dualiso::detect(image, geometry.width, geometry.height, geometry.black) {
            Ok(fit) => dualiso::apply(image, geometry.width, geometry.height, geometry.black, geometry.white, &fit),
            Err(e) => warn!("dual-ISO reconstruction skipped: {}", e),
        }
    }

    if options.fix_stripes {
        if geometry.width % 8 != 0 {
            warn!("stripe correction skipped: frame width {} is not a multiple of 8", geometry.width);
        } else {
            let correction = *stripe_correction.get_or_insert_with(|| {
                stripes::estimate(image, geometry.width, geometry.height, geometry.black, geometry.white)
            });
            if correction.needed {
                stripes::apply(image, geometry.width, geometry.black, geometry.white, &correction);
            }
        }
    }

    if let Some(method) = options.chroma_smooth.method() {
        if let Err(e) = chroma_smooth(image, geometry.width, geometry.height, geometry.black, geometry.cfa, method) {
            warn!("chroma smoothing skipped: {}", e);
        }
    }

    if options.deflicker {
        if let Err(e) = deflicker(image, geometry.black, geometry.white, deflicker_target) {
            warn!("deflicker skipped: {}", e);
        }
    }
}
