// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chunk file set: opens a container's numbered chunk files and provides positioned reads
//! plus a block-prelude iterator over each chunk.
//!
//! Ported from `original_source/mlvfs/index.c`'s `load_chunks`/`close_chunks`. Each chunk
//! keeps its own open `File`; reads are always positioned (`read_exact_at`), never through a
//! shared cursor, so many worker threads can read the same chunk concurrently.

use std::fs::File;
use std::path::{Path, PathBuf};

use mlvfs_core::block::BlockPrelude;
use mlvfs_core::error::{MlvError, Result};
use mlvfs_core::io::{read_at_into_vec, BufReader};

/// Largest chunk count [`ChunkSet::open`] will accumulate: the first chunk plus `.M00`..`.M98`.
pub const MAX_CHUNKS: usize = 100;

const PRELUDE_SIZE: u64 = 16;

/// The open chunk files belonging to one container, in chunk order.
pub struct ChunkSet {
    files: Vec<File>,
    paths: Vec<PathBuf>,
}

impl ChunkSet {
    /// Opens `base_path` (the first chunk) and every subsequent `.M00`, `.M01`, … chunk that
    /// exists, stopping at the first missing suffix.
    pub fn open(base_path: &Path) -> Result<Self> {
        let mut files = vec![File::open(base_path)?];
        let mut paths = vec![base_path.to_path_buf()];

        for seq in 0..MAX_CHUNKS - 1 {
            let path = chunk_path(base_path, seq);
            match File::open(&path) {
                Ok(file) => {
                    files.push(file);
                    paths.push(path);
                }
                Err(_) => break,
            }
        }

        Ok(ChunkSet { files, paths })
    }

    pub fn chunk_count(&self) -> u32 {
        self.files.len() as u32
    }

    pub fn path(&self, chunk_index: u16) -> Result<&Path> {
        self.paths
            .get(chunk_index as usize)
            .map(PathBuf::as_path)
            .ok_or(MlvError::CorruptContainer("xref entry references unknown chunk"))
    }

    /// Reads `len` bytes at `offset` in chunk `chunk_index`.
    pub fn read_at(&self, chunk_index: u16, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self.file(chunk_index)?;
        read_at_into_vec(file, offset, len)
    }

    fn file(&self, chunk_index: u16) -> Result<&File> {
        self.files
            .get(chunk_index as usize)
            .ok_or(MlvError::CorruptContainer("xref entry references unknown chunk"))
    }

    /// Iterates block preludes in `chunk_index`, starting at byte 0. Stops (yields no more
    /// items) at a short read (end of chunk) or a malformed prelude; a malformed
    /// prelude terminates scanning of that chunk without raising an error of its own, since
    /// entries already collected (in this or earlier chunks) remain valid.
    pub fn blocks(&self, chunk_index: u16) -> Result<BlockIter<'_>> {
        let file = self.file(chunk_index)?;
        let len = file.metadata()?.len();
        Ok(BlockIter { file, len, pos: 0, done: false })
    }
}

/// A single chunk's block-prelude scan.
pub struct BlockIter<'a> {
    file: &'a File,
    len: u64,
    pos: u64,
    done: bool,
}

impl Iterator for BlockIter<'_> {
    type Item = (BlockPrelude, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos + PRELUDE_SIZE > self.len {
            return None;
        }

        let buf = match read_at_into_vec(self.file, self.pos, PRELUDE_SIZE as usize) {
            Ok(buf) => buf,
            Err(_) => {
                self.done = true;
                return None;
            }
        };

        let mut r = BufReader::new(&buf);
        let prelude = match BlockPrelude::read(&mut r) {
            Ok(p) => p,
            Err(_) => {
                self.done = true;
                return None;
            }
        };

        if self.pos + prelude.size as u64 > self.len {
            // declared size overruns the chunk: truncated block, stop scanning.
            self.done = true;
            return None;
        }

        let start = self.pos;
        self.pos += prelude.size as u64;
        Some((prelude, start))
    }
}

/// Derives the path of the `seq`-th (`seq = 0` is `.M00`) follow-on chunk from `base_path`.
fn chunk_path(base_path: &Path, seq: usize) -> PathBuf {
    base_path.with_extension(format!("M{:02}", seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_block(buf: &mut Vec<u8>, tag: &[u8; 4], timestamp: u64, payload: &[u8]) {
        let size = 16 + payload.len() as u32;
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
    }

    #[test]
    fn open_stops_at_missing_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("test.MLV");
        std::fs::write(&base, b"x").unwrap();
        std::fs::write(dir.path().join("test.M00"), b"y").unwrap();
        // no test.M01

        let set = ChunkSet::open(&base).unwrap();
        assert_eq!(set.chunk_count(), 2);
    }

    #[test]
    fn blocks_iterates_and_stops_on_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("test.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"RTCI", 5, &[1, 2, 3, 4]);
        write_block(&mut bytes, b"VIDF", 10, &[0u8; 8]);
        let mut file = File::create(&base).unwrap();
        file.write_all(&bytes).unwrap();
        drop(file);

        let set = ChunkSet::open(&base).unwrap();
        let found: Vec<_> = set.blocks(0).unwrap().collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0.tag_str(), "RTCI");
        assert_eq!(found[1].0.tag_str(), "VIDF");
        assert_eq!(found[1].1, 20);
    }

    #[test]
    fn blocks_stops_on_malformed_prelude() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("test.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"RTCI", 5, &[1, 2, 3, 4]);
        bytes.extend_from_slice(b"VIDF");
        bytes.extend_from_slice(&4u32.to_le_bytes()); // size below minimum
        std::fs::write(&base, &bytes).unwrap();

        let set = ChunkSet::open(&base).unwrap();
        let found: Vec<_> = set.blocks(0).unwrap().collect();
        assert_eq!(found.len(), 1);
    }
}
