// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame-header resolver: reconstructs the metadata context for one video frame by
//! walking the index from the start, keeping the most recent block of each type at or before
//! the target frame's position.
//!
//! The index is sorted by timestamp, so everything at or before the target `VIDF`'s position
//! already satisfies "timestamp <= target timestamp"; overwriting the bundle's field for each
//! matching block as the scan proceeds naturally leaves the most recent one in place once the
//! scan reaches the target.

use log::warn;

use mlvfs_core::block::{BlockKind, BlockPrelude};
use mlvfs_core::error::{MlvError, Result};
use mlvfs_core::io::BufReader;
use mlvfs_core::metadata::{
    ExpoInfo, FrameHeaderBundle, IdntInfo, LensInfo, MlviHeader, RawInfo, RtciInfo, VidfHeader,
    WbalInfo,
};
use mlvfs_core::xref::XrefTable;

use crate::chunks::ChunkSet;

/// Resolves the `n`-th `VIDF` entry (in index order) into a full [`FrameHeaderBundle`].
pub fn resolve_frame_header(chunks: &ChunkSet, table: &XrefTable, n: usize) -> Result<FrameHeaderBundle> {
    let (target_pos, target) = table.nth_video_frame(n).ok_or(MlvError::NotFound)?;
    let target_chunk = target.chunk_index;
    let target_offset = target.offset_in_chunk;

    let mut bundle = FrameHeaderBundle { file_number: target_chunk as u32, position: target_offset, ..Default::default() };

    for entry in table.iter().take(target_pos + 1) {
        let prelude_bytes = match chunks.read_at(entry.chunk_index, entry.offset_in_chunk, 16) {
            Ok(b) => b,
            Err(e) => {
                warn!("frame header scan: unreadable prelude at chunk {} offset {}: {}", entry.chunk_index, entry.offset_in_chunk, e);
                continue;
            }
        };
        let mut r = BufReader::new(&prelude_bytes);
        let prelude = match BlockPrelude::read(&mut r) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let kind = BlockKind::from_tag(&prelude.tag);
        let payload_len = prelude.payload_len();

        macro_rules! body {
            () => {
                match chunks.read_at(entry.chunk_index, entry.offset_in_chunk + 16, payload_len as usize) {
                    Ok(b) => b,
                    Err(_) => continue,
                }
            };
        }

        match kind {
            BlockKind::Mlvi => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(hdr) = MlviHeader::parse(&mut pr, payload_len) {
                    bundle.mlvi = hdr;
                }
            }
            BlockKind::Vidf if entry.chunk_index == target_chunk && entry.offset_in_chunk == target_offset => {
                let b = match chunks.read_at(entry.chunk_index, entry.offset_in_chunk + 16, 8) {
                    Ok(b) => b,
                    Err(_) => continue,
                };
                let mut pr = BufReader::new(&b);
                if let Ok(hdr) = VidfHeader::parse(&mut pr) {
                    bundle.vidf = hdr;
                }
            }
            BlockKind::Rawi => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(info) = RawInfo::parse(&mut pr, payload_len) {
                    bundle.rawi = info;
                }
            }
            BlockKind::Rtci => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(info) = RtciInfo::parse(&mut pr, payload_len) {
                    bundle.rtci = Some(info);
                }
            }
            BlockKind::Idnt => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(info) = IdntInfo::parse(&mut pr, payload_len) {
                    bundle.idnt = Some(info);
                }
            }
            BlockKind::Expo => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(info) = ExpoInfo::parse(&mut pr, payload_len) {
                    bundle.expo = Some(info);
                }
            }
            BlockKind::Lens => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(info) = LensInfo::parse(&mut pr, payload_len) {
                    bundle.lens = Some(info);
                }
            }
            BlockKind::Wbal => {
                let b = body!();
                let mut pr = BufReader::new(&b);
                if let Ok(info) = WbalInfo::parse(&mut pr, payload_len) {
                    bundle.wbal = Some(info);
                }
            }
            _ => {}
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::make_index;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    fn write_block(buf: &mut Vec<u8>, tag: &[u8; 4], timestamp: u64, payload: &[u8]) {
        let size = 16 + payload.len() as u32;
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
    }

    fn rawi_payload(black: u16, white: u16) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&1920u16.to_le_bytes());
        p.extend_from_slice(&1080u16.to_le_bytes());
        p.extend_from_slice(&14u16.to_le_bytes());
        p.extend_from_slice(&black.to_le_bytes());
        p.extend_from_slice(&white.to_le_bytes());
        p.extend_from_slice(&0x02010100u32.to_le_bytes());
        for _ in 0..9 {
            p.extend_from_slice(&1i32.to_le_bytes());
            p.extend_from_slice(&1i32.to_le_bytes());
        }
        for _ in 0..4 {
            p.extend_from_slice(&0i32.to_le_bytes());
        }
        for _ in 0..4 {
            p.extend_from_slice(&0i32.to_le_bytes());
        }
        p.extend_from_slice(&1i32.to_le_bytes());
        p.extend_from_slice(&1i32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p
    }

    fn sample_container(dir: &Path) -> std::path::PathBuf {
        let base = dir.join("test.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"RAWI", 0, &rawi_payload(2048, 15000));
        write_block(&mut bytes, b"VIDF", 5, &[0u8; 8]);
        write_block(&mut bytes, b"RAWI", 10, &rawi_payload(2049, 15999));
        write_block(&mut bytes, b"VIDF", 15, &[0u8; 8]);
        let mut file = File::create(&base).unwrap();
        file.write_all(&bytes).unwrap();
        base
    }

    #[test]
    fn resolver_picks_most_recent_rawi_before_target_frame() {
        let dir = tempfile::tempdir().unwrap();
        let base = sample_container(dir.path());
        let chunks = ChunkSet::open(&base).unwrap();
        let table = make_index(&chunks).unwrap();

        let first = resolve_frame_header(&chunks, &table, 0).unwrap();
        assert_eq!(first.rawi.black_level, 2048);

        let second = resolve_frame_header(&chunks, &table, 1).unwrap();
        assert_eq!(second.rawi.black_level, 2049);
        assert_eq!(second.rawi.white_level, 15999);
    }

    #[test]
    fn resolver_out_of_range_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = sample_container(dir.path());
        let chunks = ChunkSet::open(&base).unwrap();
        let table = make_index(&chunks).unwrap();
        assert!(matches!(resolve_frame_header(&chunks, &table, 5), Err(MlvError::NotFound)));
    }
}
