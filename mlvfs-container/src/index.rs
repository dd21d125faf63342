// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Index builder / store: a fresh build from a linear chunk scan, sidecar `.IDX`
//! persistence and reload, and the canonical video-frame count.
//!
//! Ported from `original_source/mlvfs/index.c`'s `make_index`/`build_index`/`get_index`. The
//! frame-count Open Question (see `DESIGN.md`) is resolved in favor of this index-based count
//! over the separate linear-scan count in `main.c`.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use mlvfs_core::block::{BlockKind, BlockPrelude};
use mlvfs_core::error::Result;
use mlvfs_core::io::{BufReader, ReadBytes};
use mlvfs_core::xref::{EntryKind, XrefEntry, XrefTable};

use crate::chunks::ChunkSet;

/// Path of the sidecar index for a container whose first chunk is `base_path`.
pub fn idx_path(base_path: &Path) -> PathBuf {
    base_path.with_extension("IDX")
}

/// Walks every chunk linearly, collecting cross-reference entries. A malformed prelude
/// aborts that chunk's scan but leaves already-collected entries intact; a `MLVI` GUID mismatch
/// against the first one seen aborts scanning of the whole container, also without discarding
/// what has already been collected.
pub fn make_index(chunks: &ChunkSet) -> Result<XrefTable> {
    let mut table = XrefTable::new();
    let mut guid: Option<u64> = None;

    'chunks: for chunk_index in 0..chunks.chunk_count() as u16 {
        let iter = match chunks.blocks(chunk_index) {
            Ok(iter) => iter,
            Err(e) => {
                warn!("chunk {} unreadable, skipping: {}", chunk_index, e);
                continue;
            }
        };

        for (prelude, offset) in iter {
            let kind = BlockKind::from_tag(&prelude.tag);

            if kind == BlockKind::Null {
                continue;
            }

            let timestamp = if kind == BlockKind::Mlvi {
                match read_mlvi_guid(chunks, chunk_index, offset, &prelude) {
                    Ok(block_guid) => match guid {
                        None => guid = Some(block_guid),
                        Some(expected) if expected != block_guid => {
                            warn!(
                                "chunk {} MLVI guid mismatch at offset {}, aborting scan",
                                chunk_index, offset
                            );
                            break 'chunks;
                        }
                        _ => {}
                    },
                    Err(e) => {
                        warn!("chunk {} malformed MLVI at offset {}: {}", chunk_index, offset, e);
                        continue;
                    }
                }
                0
            } else {
                prelude.timestamp
            };

            let entry_kind = match kind {
                BlockKind::Vidf => EntryKind::Vidf,
                BlockKind::Audf => EntryKind::Audf,
                _ => EntryKind::Other,
            };

            table.push(XrefEntry { timestamp, chunk_index, offset_in_chunk: offset, kind: entry_kind });
        }
    }

    table.sort();
    debug!("indexed {} entries across {} chunk(s)", table.len(), chunks.chunk_count());
    Ok(table)
}

fn read_mlvi_guid(
    chunks: &ChunkSet,
    chunk_index: u16,
    offset: u64,
    prelude: &BlockPrelude,
) -> Result<u64> {
    if prelude.payload_len() < 8 {
        return mlvfs_core::error::corrupt_error("MLVI block too small for guid field");
    }
    let bytes = chunks.read_at(chunk_index, offset + 16, 8)?;
    let mut r = BufReader::new(&bytes);
    r.read_u64()
}

/// Builds a fresh index and attempts to persist it next to `base_path`. Persistence failures
/// are logged and otherwise ignored: the in-memory table is returned regardless.
pub fn force_index(base_path: &Path, chunks: &ChunkSet) -> Result<XrefTable> {
    let table = make_index(chunks)?;
    if let Err(e) = table.save(&idx_path(base_path), chunks.chunk_count()) {
        warn!("failed to persist sidecar index for {}: {}", base_path.display(), e);
    }
    Ok(table)
}

/// Loads the sidecar index if present and well-formed, otherwise builds and persists one
/// ("load-or-build").
pub fn get_index(base_path: &Path, chunks: &ChunkSet) -> Result<XrefTable> {
    match XrefTable::load(&idx_path(base_path)) {
        Ok(table) => Ok(table),
        Err(_) => force_index(base_path, chunks),
    }
}

/// The canonical video-frame count for a container: derived from the index, forcing one
/// rebuild if the loaded sidecar carries zero `VIDF` entries (an old-format or corrupt
/// sidecar, per `original_source/mlvfs/index.c`'s `mlv_get_frame_count`).
pub fn video_frame_count(base_path: &Path, chunks: &ChunkSet) -> Result<usize> {
    let table = get_index(base_path, chunks)?;
    if table.video_frame_count() == 0 {
        let rebuilt = force_index(base_path, chunks)?;
        return Ok(rebuilt.video_frame_count());
    }
    Ok(table.video_frame_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_block(buf: &mut Vec<u8>, tag: &[u8; 4], timestamp: u64, payload: &[u8]) {
        let size = 16 + payload.len() as u32;
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
    }

    fn mlvi_payload(guid: u64) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&guid.to_le_bytes());
        p.extend_from_slice(&24000u32.to_le_bytes());
        p.extend_from_slice(&1001u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p
    }

    fn sample_container(dir: &Path) -> PathBuf {
        let base = dir.join("test.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"MLVI", 0, &mlvi_payload(7));
        write_block(&mut bytes, b"RTCI", 1, &[0u8; 6]);
        write_block(&mut bytes, b"VIDF", 10, &[0u8; 8]);
        write_block(&mut bytes, b"VIDF", 20, &[0u8; 8]);
        write_block(&mut bytes, b"NULL", 30, &[0u8; 4]);
        let mut file = File::create(&base).unwrap();
        file.write_all(&bytes).unwrap();
        base
    }

    #[test]
    fn make_index_skips_null_and_counts_vidf() {
        let dir = tempfile::tempdir().unwrap();
        let base = sample_container(dir.path());
        let chunks = ChunkSet::open(&base).unwrap();
        let table = make_index(&chunks).unwrap();
        assert_eq!(table.video_frame_count(), 2);
        assert_eq!(table.len(), 4); // MLVI + RTCI + 2 VIDF; NULL excluded
    }

    #[test]
    fn get_index_builds_then_reloads_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let base = sample_container(dir.path());
        let chunks = ChunkSet::open(&base).unwrap();

        let built = get_index(&base, &chunks).unwrap();
        assert_eq!(built.video_frame_count(), 2);
        assert!(idx_path(&base).exists());

        let reloaded = get_index(&base, &chunks).unwrap();
        assert_eq!(reloaded.video_frame_count(), 2);
    }

    #[test]
    fn guid_mismatch_aborts_scan_but_keeps_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("test.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"MLVI", 0, &mlvi_payload(1));
        write_block(&mut bytes, b"VIDF", 10, &[0u8; 8]);
        std::fs::write(&base, &bytes).unwrap();
        std::fs::write(dir.path().join("test.M00"), {
            let mut b2 = Vec::new();
            write_block(&mut b2, b"MLVI", 0, &mlvi_payload(2));
            write_block(&mut b2, b"VIDF", 20, &[0u8; 8]);
            b2
        })
        .unwrap();

        let chunks = ChunkSet::open(&base).unwrap();
        let table = make_index(&chunks).unwrap();
        assert_eq!(table.video_frame_count(), 1);
    }

    #[test]
    fn video_frame_count_rebuilds_on_zero_vidf_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let base = sample_container(dir.path());
        let chunks = ChunkSet::open(&base).unwrap();

        let mut empty = XrefTable::new();
        empty.push(XrefEntry { timestamp: 0, chunk_index: 0, offset_in_chunk: 0, kind: EntryKind::Other });
        empty.save(&idx_path(&base), chunks.chunk_count()).unwrap();

        let count = video_frame_count(&base, &chunks).unwrap();
        assert_eq!(count, 2);
    }
}
