// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small value types shared across block payloads and the DNG tag tables.

/// An unsigned rational, as stored in `RATIONAL`-typed TIFF/DNG tags and in several MLV block
/// fields (frame rate, exposure bias denominators, white-balance gains).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const fn new(num: u32, den: u32) -> Self {
        Rational { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

/// A signed rational, as stored in `SRATIONAL`-typed TIFF/DNG tags (color matrix entries,
/// exposure bias, APEX shutter/aperture values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SRational {
    pub num: i32,
    pub den: i32,
}

impl SRational {
    pub const fn new(num: i32, den: i32) -> Self {
        SRational { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

/// Top-left/bottom-right rectangle, used for the sensor active area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// Origin + extent rectangle, used for the DNG default crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Crop {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// The four Bayer color-filter-array phases the container can declare, and how the DNG emitter
/// must encode each (see `original_source/mlvfs/mlvfs-dng.c`'s `cfa_pattern` switch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaPattern {
    /// `RGGB`: top-left pixel is red.
    Rggb,
    /// `GRBG`: top-left pixel is green in a green/red row.
    Grbg,
    /// `GBRG`: top-left pixel is green in a green/blue row.
    Gbrg,
    /// `BGGR`: top-left pixel is blue.
    Bggr,
}

impl CfaPattern {
    /// Decode the container's packed CFA code (as observed in `RAWI`) into a phase.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x0201_0100 => Some(CfaPattern::Grbg),
            0x0102_0001 => Some(CfaPattern::Rggb),
            0x0100_0201 => Some(CfaPattern::Bggr),
            0x0001_0102 => Some(CfaPattern::Gbrg),
            _ => None,
        }
    }

    /// DNG `BayerPhase` opcode value used inside `FixBadPixelsConstant` (0=RGGB, 1=GRBG,
    /// 2=GBRG, 3=BGGR; see `mlvfs-dng.c`'s `BADPIX_CFA_INDEX` assignment).
    pub fn bayer_phase(&self) -> u32 {
        match self {
            CfaPattern::Rggb => 0,
            CfaPattern::Grbg => 1,
            CfaPattern::Gbrg => 2,
            CfaPattern::Bggr => 3,
        }
    }

    /// DNG `CFAPattern` tag bytes (0=red, 1=green, 2=blue), row-major over the 2x2 repeat.
    pub fn tiff_cfa_bytes(&self) -> [u8; 4] {
        match self {
            CfaPattern::Rggb => [0, 1, 1, 2],
            CfaPattern::Grbg => [1, 0, 2, 1],
            CfaPattern::Bggr => [2, 1, 1, 0],
            CfaPattern::Gbrg => [1, 2, 0, 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_cfa_codes() {
        assert_eq!(CfaPattern::from_code(0x0201_0100), Some(CfaPattern::Grbg));
        assert_eq!(CfaPattern::from_code(0x0102_0001), Some(CfaPattern::Rggb));
        assert_eq!(CfaPattern::from_code(0x0100_0201), Some(CfaPattern::Bggr));
        assert_eq!(CfaPattern::from_code(0x0001_0102), Some(CfaPattern::Gbrg));
        assert_eq!(CfaPattern::from_code(0xDEAD_BEEF), None);
    }

    #[test]
    fn rational_as_f64() {
        assert_eq!(Rational::new(1, 2).as_f64(), 0.5);
        assert_eq!(Rational::new(1, 0).as_f64(), 0.0);
    }
}
