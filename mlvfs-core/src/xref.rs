// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cross-reference (`XREF`) table: a sorted index from `(timestamp)` to `(chunk, offset)`.
//!
//! Ported from `original_source/mlvfs/index.c`. The in-memory table carries each entry's
//! timestamp (needed while building, to stable-sort); the persisted sidecar format does not,
//! because the table is always stored already sorted, so position in the table *is* the
//! timestamp order. Everything downstream (the frame-header resolver) walks entries by
//! position, never by comparing timestamp values, so a table reloaded from disk behaves
//! identically to the table that produced it.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::{corrupt_error, Result};
use crate::io::{read_at_into_vec, BufReader, ReadBytes};

/// What an indexed block represents, for the purposes of frame counting and resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Vidf,
    Audf,
    Other,
}

impl EntryKind {
    fn to_u16(self) -> u16 {
        match self {
            EntryKind::Vidf => 0,
            EntryKind::Audf => 1,
            EntryKind::Other => 2,
        }
    }

    fn from_u16(v: u16) -> Result<Self> {
        match v {
            0 => Ok(EntryKind::Vidf),
            1 => Ok(EntryKind::Audf),
            2 => Ok(EntryKind::Other),
            _ => corrupt_error("unrecognized xref entry kind"),
        }
    }
}

/// One cross-reference entry: `{ timestamp, chunk_index, offset_in_chunk, kind }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefEntry {
    pub timestamp: u64,
    pub chunk_index: u16,
    pub offset_in_chunk: u64,
    pub kind: EntryKind,
}

const ENTRY_DISK_SIZE: usize = 12;

/// The sorted table of cross-reference entries for one container.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: Vec<XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        XrefTable { entries: Vec::new() }
    }

    /// Appends an entry in scan order. `MLVI` blocks must be pushed with `timestamp = 0` so
    /// they stable-sort to the front.
    pub fn push(&mut self, entry: XrefEntry) {
        self.entries.push(entry);
    }

    /// Stable-sorts by timestamp; ties keep their original (insertion) relative order, so an
    /// `MLVI` block at timestamp 0 inserted first always sorts first.
    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.timestamp);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &XrefEntry> {
        self.entries.iter()
    }

    pub fn get(&self, i: usize) -> Option<&XrefEntry> {
        self.entries.get(i)
    }

    /// The `n`-th `VIDF` entry, scanning in index order, and its position in the table (needed
    /// by the frame-header resolver to walk back over earlier metadata blocks).
    pub fn nth_video_frame(&self, n: usize) -> Option<(usize, &XrefEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EntryKind::Vidf)
            .nth(n)
    }

    pub fn video_frame_count(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == EntryKind::Vidf).count()
    }

    /// Writes the sidecar `.IDX` file: an `MLVI` prelude (with `fileNum = chunk_count + 1`,
    /// `videoFrameCount = 0`, `audioFrameCount = 0`) followed by an `XREF` block.
    /// Persistence failures are non-fatal to the caller: the in-memory table stays
    /// valid regardless, so this returns `Result` purely for the caller to log, not to abort on.
    pub fn save(&self, idx_path: &Path, chunk_count: u32) -> Result<()> {
        let mut file = File::create(idx_path)?;

        // MLVI prelude: size = sizeof(MLVI) = 16 (prelude) + 20 (fields) = 36, matching
        // `MlviHeader`'s on-wire layout (guid:8, fps_num:4, fps_den:4, audio_class:4,
        // file_num:2, video_frame_count:4, audio_frame_count:4 = 26, padded to align).
        const MLVI_PAYLOAD_SIZE: u32 = 26;
        const MLVI_BLOCK_SIZE: u32 = 16 + MLVI_PAYLOAD_SIZE;

        file.write_all(b"MLVI")?;
        file.write_all(&MLVI_BLOCK_SIZE.to_le_bytes())?;
        file.write_all(&0u64.to_le_bytes())?; // timestamp
        file.write_all(&0u64.to_le_bytes())?; // guid (unknown at index time)
        file.write_all(&0u32.to_le_bytes())?; // fps_num
        file.write_all(&0u32.to_le_bytes())?; // fps_den
        file.write_all(&0u32.to_le_bytes())?; // audio_class
        file.write_all(&((chunk_count + 1) as u16).to_le_bytes())?; // file_num
        file.write_all(&0u32.to_le_bytes())?; // video_frame_count
        file.write_all(&0u32.to_le_bytes())?; // audio_frame_count

        let xref_payload_size = 4 + self.entries.len() * ENTRY_DISK_SIZE;
        file.write_all(b"XREF")?;
        file.write_all(&(xref_payload_size as u32).to_le_bytes())?;
        file.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for entry in &self.entries {
            file.write_all(&entry.offset_in_chunk.to_le_bytes())?;
            file.write_all(&entry.chunk_index.to_le_bytes())?;
            file.write_all(&entry.kind.to_u16().to_le_bytes())?;
        }

        Ok(())
    }

    /// Loads a table previously written by [`XrefTable::save`]. Returns an error if the file
    /// is not a well-formed `MLVI`+`XREF` sidecar; the caller should fall back to a fresh build.
    pub fn load(idx_path: &Path) -> Result<Self> {
        let file = File::open(idx_path)?;
        let len = file.metadata()?.len();

        let mut tag = [0u8; 4];
        file.read_exact_at(&mut tag, 0)?;
        if &tag != b"MLVI" {
            return corrupt_error("sidecar index missing MLVI header");
        }
        let size_bytes = read_at_into_vec(&file, 4, 4)?;
        let mlvi_size = u32::from_le_bytes(size_bytes.try_into().unwrap());

        let xref_offset = 16u64 + mlvi_size as u64 - 16;
        if xref_offset + 16 > len {
            return corrupt_error("sidecar index truncated before XREF block");
        }

        let mut xref_tag = [0u8; 4];
        file.read_exact_at(&mut xref_tag, xref_offset)?;
        if &xref_tag != b"XREF" {
            return corrupt_error("sidecar index missing XREF block");
        }
        let xref_size_bytes = read_at_into_vec(&file, xref_offset + 4, 4)?;
        let xref_payload_size = u32::from_le_bytes(xref_size_bytes.try_into().unwrap());

        let body = read_at_into_vec(&file, xref_offset + 8, xref_payload_size as usize)?;
        let mut reader = BufReader::new(&body);
        let entry_count = reader.read_u32()? as usize;

        let mut table = XrefTable::new();
        for _ in 0..entry_count {
            let offset_in_chunk = reader.read_u64()?;
            let chunk_index = reader.read_u16()?;
            let kind = EntryKind::from_u16(reader.read_u16()?)?;
            table.push(XrefEntry { timestamp: 0, chunk_index, offset_in_chunk, kind });
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> XrefTable {
        let mut t = XrefTable::new();
        t.push(XrefEntry { timestamp: 0, chunk_index: 0, offset_in_chunk: 0, kind: EntryKind::Other });
        t.push(XrefEntry { timestamp: 10, chunk_index: 0, offset_in_chunk: 36, kind: EntryKind::Vidf });
        t.push(XrefEntry { timestamp: 11, chunk_index: 0, offset_in_chunk: 200, kind: EntryKind::Audf });
        t.push(XrefEntry { timestamp: 20, chunk_index: 0, offset_in_chunk: 400, kind: EntryKind::Vidf });
        t
    }

    #[test]
    fn nth_video_frame_finds_by_scan_order() {
        let t = sample_table();
        let (pos, entry) = t.nth_video_frame(1).unwrap();
        assert_eq!(pos, 3);
        assert_eq!(entry.offset_in_chunk, 400);
        assert_eq!(t.video_frame_count(), 2);
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut t = XrefTable::new();
        t.push(XrefEntry { timestamp: 5, chunk_index: 0, offset_in_chunk: 1, kind: EntryKind::Other });
        t.push(XrefEntry { timestamp: 5, chunk_index: 0, offset_in_chunk: 2, kind: EntryKind::Other });
        t.push(XrefEntry { timestamp: 0, chunk_index: 0, offset_in_chunk: 3, kind: EntryKind::Other });
        t.sort();
        assert_eq!(t.get(0).unwrap().offset_in_chunk, 3);
        assert_eq!(t.get(1).unwrap().offset_in_chunk, 1);
        assert_eq!(t.get(2).unwrap().offset_in_chunk, 2);
    }

    #[test]
    fn round_trip_save_load() {
        let t = sample_table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.IDX");
        t.save(&path, 1).unwrap();

        let loaded = XrefTable::load(&path).unwrap();
        assert_eq!(loaded.len(), t.len());
        for (a, b) in t.iter().zip(loaded.iter()) {
            assert_eq!(a.chunk_index, b.chunk_index);
            assert_eq!(a.offset_in_chunk, b.offset_in_chunk);
            assert_eq!(a.kind, b.kind);
        }
    }
}
