// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The common block prelude shared by every typed block in an MLV-style container.

use crate::error::{corrupt_error, Result};
use crate::io::ReadBytes;

/// Smallest legal block: the 16-byte prelude itself, no payload.
pub const MIN_BLOCK_SIZE: u32 = 16;

/// Largest legal block. Declared sizes beyond this are treated as corruption rather than
/// trusted, since they are attacker- or bitrot-controlled input.
pub const MAX_BLOCK_SIZE: u32 = 1 << 30;

/// The fixed 16-byte header every block begins with: `{ tag, size, timestamp }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPrelude {
    pub tag: [u8; 4],
    pub size: u32,
    pub timestamp: u64,
}

impl BlockPrelude {
    /// Reads and validates a prelude from `reader`. Does not consume any payload bytes.
    pub fn read<R: ReadBytes>(reader: &mut R) -> Result<Self> {
        let tag = reader.read_quad_bytes()?;
        let size = reader.read_u32()?;
        let timestamp = reader.read_u64()?;

        if size < MIN_BLOCK_SIZE || size > MAX_BLOCK_SIZE {
            return corrupt_error("block size out of bounds");
        }

        Ok(BlockPrelude { tag, size, timestamp })
    }

    /// Number of payload bytes following the prelude.
    pub fn payload_len(&self) -> u32 {
        self.size - MIN_BLOCK_SIZE
    }

    pub fn tag_str(&self) -> &str {
        std::str::from_utf8(&self.tag).unwrap_or("????")
    }
}

/// The block types the core cares about; everything else is skipped but still indexed as
/// `Other` so that `blocks_yielded_by_scan == entry_count + null_blocks` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Mlvi,
    Vidf,
    Audf,
    Rawi,
    Wavi,
    Rtci,
    Idnt,
    Expo,
    Lens,
    Wbal,
    Null,
    Other,
}

impl BlockKind {
    pub fn from_tag(tag: &[u8; 4]) -> Self {
        match tag {
            b"MLVI" => BlockKind::Mlvi,
            b"VIDF" => BlockKind::Vidf,
            b"AUDF" => BlockKind::Audf,
            b"RAWI" => BlockKind::Rawi,
            b"WAVI" => BlockKind::Wavi,
            b"RTCI" => BlockKind::Rtci,
            b"IDNT" => BlockKind::Idnt,
            b"EXPO" => BlockKind::Expo,
            b"LENS" => BlockKind::Lens,
            b"WBAL" => BlockKind::Wbal,
            b"NULL" => BlockKind::Null,
            _ => BlockKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufReader;

    fn prelude_bytes(tag: &[u8; 4], size: u32, timestamp: u64) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(tag);
        v.extend_from_slice(&size.to_le_bytes());
        v.extend_from_slice(&timestamp.to_le_bytes());
        v
    }

    #[test]
    fn rejects_undersized_block() {
        let bytes = prelude_bytes(b"VIDF", 8, 0);
        let mut r = BufReader::new(&bytes);
        assert!(BlockPrelude::read(&mut r).is_err());
    }

    #[test]
    fn rejects_oversized_block() {
        let bytes = prelude_bytes(b"VIDF", MAX_BLOCK_SIZE + 1, 0);
        let mut r = BufReader::new(&bytes);
        assert!(BlockPrelude::read(&mut r).is_err());
    }

    #[test]
    fn accepts_minimum_size_block() {
        let bytes = prelude_bytes(b"RTCI", MIN_BLOCK_SIZE, 42);
        let mut r = BufReader::new(&bytes);
        let prelude = BlockPrelude::read(&mut r).unwrap();
        assert_eq!(prelude.payload_len(), 0);
        assert_eq!(prelude.timestamp, 42);
        assert_eq!(BlockKind::from_tag(&prelude.tag), BlockKind::Rtci);
    }
}
