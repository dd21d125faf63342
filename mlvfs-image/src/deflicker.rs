// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-frame deflicker normalization (a supplemented feature).
//!
//! Not present as a named C function in `original_source/mlvfs` beyond the `deflicker` config
//! flag itself (`mlvfs.h`); the pass described here is a straightforward reading of the
//! spec's one-line description, built in the style of the other EV-space passes in this crate.

use mlvfs_core::ev::ev_tables;
use mlvfs_core::error::{unsupported_error, Result};

/// Minimum number of in-range pixels required before a median is trusted.
const MIN_VALID_SAMPLES: usize = 64;

/// Scales `image` in place so its median luma (in EV space) matches `target_median_raw`, a
/// fixed per-container reference level established from an earlier frame. Best-effort: returns
/// an error (caller skips the pass) if too few pixels fall strictly between `black` and
/// `white` to estimate a median.
pub fn deflicker(image: &mut [u16], black: u16, white: u16, target_median_raw: u16) -> Result<()> {
    let tables = ev_tables(black as i32)?;

    let mut valid: Vec<i32> = image
        .iter()
        .map(|&p| p as i32)
        .filter(|&p| p > black as i32 && p < white as i32)
        .collect();
    if valid.len() < MIN_VALID_SAMPLES {
        return unsupported_error("too few valid pixels to estimate median luma");
    }

    let mid = valid.len() / 2;
    valid.select_nth_unstable(mid);
    let current_median = valid[mid];

    let current_ev = tables.raw2ev(current_median);
    let target_ev = tables.raw2ev(target_median_raw as i32);
    let delta = target_ev - current_ev;

    for p in image.iter_mut() {
        let ev = tables.raw2ev(*p as i32) + delta;
        *p = tables.ev2raw(ev).clamp(0, white as i32) as u16;
    }

    Ok(())
}
