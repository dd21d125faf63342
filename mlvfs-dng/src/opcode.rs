// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `FixBadPixelsConstant` opcode list, embedded in the raw
//! SubIFD's `0xC740` (`OpcodeList2`) tag so DNG readers that do not honor this crate's own
//! bad-pixel repair can still mask outliers on their own.
//!
//! Ported from `original_source/mlvfs/mlvfs-dng.c`'s `badpixel_opcode` array. Every field in a
//! DNG opcode list is big-endian, unlike the rest of the (little-endian) TIFF file.

use mlvfs_core::units::CfaPattern;

const OPCODE_ID_FIX_BAD_PIXELS_CONSTANT: u32 = 4;
const DNG_OPCODE_VERSION: u32 = 0x0103_0000;
const OPCODE_FLAGS_OPTIONAL: u32 = 1;
const OPCODE_DATA_LEN: u32 = 8; // Constant (4) + BayerPhase (4)
const CONSTANT_VALUE: u32 = 0;

/// Builds the big-endian `OpcodeList2` bytes: one `FixBadPixelsConstant` opcode with
/// `Constant = 0` (mask any pixel already repaired to exactly black by this crate's own
/// bad-pixel pass) and `BayerPhase` set from `cfa`.
pub fn fix_bad_pixels_constant(cfa: CfaPattern) -> Vec<u8> {
    let words = [
        1u32, // opcode count
        OPCODE_ID_FIX_BAD_PIXELS_CONSTANT,
        DNG_OPCODE_VERSION,
        OPCODE_FLAGS_OPTIONAL,
        OPCODE_DATA_LEN,
        CONSTANT_VALUE,
        cfa.bayer_phase(),
    ];
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_seven_big_endian_words() {
        let bytes = fix_bad_pixels_constant(CfaPattern::Grbg);
        assert_eq!(bytes.len(), 28);
        assert_eq!(u32::from_be_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 4);
        assert_eq!(u32::from_be_bytes(bytes[24..28].try_into().unwrap()), 1); // Grbg bayer phase
    }

    #[test]
    fn bayer_phase_matches_cfa() {
        for (cfa, phase) in [
            (CfaPattern::Rggb, 0u32),
            (CfaPattern::Grbg, 1),
            (CfaPattern::Gbrg, 2),
            (CfaPattern::Bggr, 3),
        ] {
            let bytes = fix_bad_pixels_constant(cfa);
            assert_eq!(u32::from_be_bytes(bytes[24..28].try_into().unwrap()), phase);
        }
    }
}
