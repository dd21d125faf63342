// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! EV (exposure-value, base-2 log) lookup tables used by the correction pipeline.
//!
//! Ported from `original_source/mlvfs/cs.c`'s `get_raw2ev`/`get_ev2raw`. The source keeps one
//! process-wide table sized for the worst-case black level and reuses it via pointer arithmetic
//! (`raw2ev_base + MAX_BLACK - black`). Here each distinct `black` level gets its own table,
//! built once and cached process-wide; most containers only ever use one black level, so in
//! practice this is still a single allocation per process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{unsupported_error, Result};

/// Fixed-point scale for EV-space values: one stop is `EV_RESOLUTION` units.
pub const EV_RESOLUTION: i32 = 32768;

/// Largest black level the pipeline will build a table for.
pub const MAX_BLACK: i32 = 16384;

/// Per-`black` precomputed `raw -> ev` and `ev -> raw` tables.
pub struct EvTables {
    black: i32,
    /// Indexed by `v + black` for `v` in `-black..16384`.
    raw2ev: Vec<i32>,
    /// Indexed by `e + 10*EV_RESOLUTION` for `e` in `-10*EV_RESOLUTION..14*EV_RESOLUTION`.
    ev2raw: Vec<i32>,
}

impl EvTables {
    fn build(black: i32) -> Self {
        let raw2ev_len = (black + 16384) as usize;
        let mut raw2ev = vec![0i32; raw2ev_len];
        for v in 0..16384i32 {
            let ev = if v == 0 { 0.0 } else { (v as f64).log2() * EV_RESOLUTION as f64 };
            raw2ev[(v + black) as usize] = ev.floor() as i32;
        }

        let ev2raw_len = (24 * EV_RESOLUTION) as usize;
        let mut ev2raw = vec![0i32; ev2raw_len];
        for e in (-10 * EV_RESOLUTION)..(14 * EV_RESOLUTION) {
            let raw = 2f64.powf(e as f64 / EV_RESOLUTION as f64);
            ev2raw[(e + 10 * EV_RESOLUTION) as usize] = raw.floor() as i32;
        }

        EvTables { black, raw2ev, ev2raw }
    }

    /// `⌊log₂(v)·R⌋`, for `v` in `[-black, 16383]`. Values outside that domain clamp to the
    /// nearest in-range entry rather than panicking, since bad-pixel repair probes neighbors
    /// that can legitimately sit just outside it after repeated corrections.
    pub fn raw2ev(&self, v: i32) -> i32 {
        let idx = (v + self.black).clamp(0, self.raw2ev.len() as i32 - 1);
        self.raw2ev[idx as usize]
    }

    /// `⌊2^(e/R)⌋`, for `e` in `[-10·R, 14·R)`.
    pub fn ev2raw(&self, e: i32) -> i32 {
        let idx = (e + 10 * EV_RESOLUTION).clamp(0, self.ev2raw.len() as i32 - 1);
        self.ev2raw[idx as usize]
    }

    pub fn black(&self) -> i32 {
        self.black
    }
}

static TABLE_CACHE: OnceLock<Mutex<HashMap<i32, Arc<EvTables>>>> = OnceLock::new();

/// Returns the shared, process-wide EV tables for `black`, building them on first use.
pub fn ev_tables(black: i32) -> Result<Arc<EvTables>> {
    if black > MAX_BLACK {
        return unsupported_error("black level too large for processing");
    }

    let cache = TABLE_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().expect("EV table cache mutex poisoned");
    if let Some(tables) = guard.get(&black) {
        return Ok(Arc::clone(tables));
    }

    let tables = Arc::new(EvTables::build(black));
    guard.insert(black, Arc::clone(&tables));
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_one_count() {
        let tables = ev_tables(2048).unwrap();
        for v in 1..16384 {
            let ev = tables.raw2ev(v);
            let back = tables.ev2raw(ev);
            assert!(
                (back - v).abs() <= 1,
                "v={} ev={} back={}",
                v,
                ev,
                back
            );
        }
    }

    #[test]
    fn zero_maps_to_zero_ev() {
        let tables = ev_tables(0).unwrap();
        assert_eq!(tables.raw2ev(0), 0);
    }

    #[test]
    fn black_too_large_is_rejected() {
        assert!(ev_tables(MAX_BLACK + 1).is_err());
    }

    #[test]
    fn cache_returns_same_instance() {
        let a = ev_tables(4096).unwrap();
        let b = ev_tables(4096).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
