// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Audio stream emitter: a canonical 44-byte PCM-RIFF header followed by the
//! concatenation of every `AUDF` block's payload.
//!
//! Ported from `original_source/mlvfs/wav.c`. The header's `file_size`/`data size` fields are
//! kept byte-for-byte as the original computes them (the declared RIFF chunk size is the whole
//! file's size, not `size - 8` as a strict RIFF reader would expect), since a reader already
//! tolerant of that quirk is what synthetic audio files in the wild look like.

use mlvfs_core::block::{BlockKind, BlockPrelude};
use mlvfs_core::error::Result;
use mlvfs_core::io::BufReader;
use mlvfs_core::metadata::{AudfHeader, WavInfo};
use mlvfs_core::xref::{EntryKind, XrefTable};

use crate::chunks::ChunkSet;

pub const WAV_HEADER_SIZE: u64 = 44;

/// Finds the container's `WAVI` block, if it has audio at all.
pub fn find_wavi(chunks: &ChunkSet, table: &XrefTable) -> Result<Option<WavInfo>> {
    for entry in table.iter() {
        let prelude_bytes = chunks.read_at(entry.chunk_index, entry.offset_in_chunk, 16)?;
        let mut r = BufReader::new(&prelude_bytes);
        let prelude = match BlockPrelude::read(&mut r) {
            Ok(p) => p,
            Err(_) => continue,
        };
        if BlockKind::from_tag(&prelude.tag) == BlockKind::Wavi {
            let body = chunks.read_at(entry.chunk_index, entry.offset_in_chunk + 16, prelude.payload_len() as usize)?;
            let mut pr = BufReader::new(&body);
            return Ok(Some(WavInfo::parse(&mut pr, prelude.payload_len())?));
        }
    }
    Ok(None)
}

/// Declared size of the synthetic `audio.WAV` file:
/// `header + bytes_per_second * frame_count * fps_denom / fps_num`.
pub fn audio_size(wavi: &WavInfo, fps_num: u32, fps_den: u32, frame_count: u64) -> u64 {
    WAV_HEADER_SIZE + (wavi.bytes_per_second as u64 * frame_count * fps_den as u64) / fps_num.max(1) as u64
}

/// Builds the 44-byte canonical PCM header for `total_size` (the full synthetic file size).
pub fn wav_header(wavi: &WavInfo, total_size: u64) -> [u8; 44] {
    let mut h = [0u8; 44];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(total_size as u32).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    h[22..24].copy_from_slice(&wavi.channels.to_le_bytes());
    h[24..28].copy_from_slice(&wavi.sampling_rate.to_le_bytes());
    h[28..32].copy_from_slice(&wavi.bytes_per_second.to_le_bytes());
    h[32..34].copy_from_slice(&4u16.to_le_bytes()); // block_align
    h[34..36].copy_from_slice(&wavi.bits_per_sample.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&((total_size.saturating_sub(WAV_HEADER_SIZE) + 8) as u32).to_le_bytes());
    h
}

/// Reads up to `max_size` bytes of the synthetic `audio.WAV` file starting at `offset`,
/// serving header bytes then streaming `AUDF` payloads in index order.
pub fn read_audio(
    chunks: &ChunkSet,
    table: &XrefTable,
    wavi: &WavInfo,
    total_size: u64,
    offset: u64,
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    if offset < WAV_HEADER_SIZE {
        let header = wav_header(wavi, total_size);
        let start = offset as usize;
        let take = (WAV_HEADER_SIZE as usize - start).min(max_size);
        out.extend_from_slice(&header[start..start + take]);
    }

    if out.len() >= max_size {
        return Ok(out);
    }

    let requested_audio_offset = offset as i64 - WAV_HEADER_SIZE as i64;
    let mut audio_position: i64 = 0;

    for entry in table.iter().filter(|e| e.kind == EntryKind::Audf) {
        if out.len() >= max_size {
            break;
        }

        let prelude_bytes = chunks.read_at(entry.chunk_index, entry.offset_in_chunk, 16)?;
        let mut r = BufReader::new(&prelude_bytes);
        let prelude = match BlockPrelude::read(&mut r) {
            Ok(p) => p,
            Err(_) => continue,
        };

        let audf_bytes = chunks.read_at(entry.chunk_index, entry.offset_in_chunk + 16, 4)?;
        let mut apr = BufReader::new(&audf_bytes);
        let audf = match AudfHeader::parse(&mut apr) {
            Ok(a) => a,
            Err(_) => continue,
        };

        let frame_size = prelude.payload_len() as i64 - 4 - audf.frame_space as i64;
        if frame_size <= 0 {
            continue;
        }
        let frame_end = audio_position + frame_size;

        if frame_end >= requested_audio_offset {
            let start_offset = (requested_audio_offset - audio_position).max(0);
            if start_offset < frame_size {
                let payload_offset =
                    entry.offset_in_chunk + 16 + 4 + audf.frame_space as u64 + start_offset as u64;
                let want = ((frame_size - start_offset) as usize).min(max_size - out.len());
                let bytes = chunks.read_at(entry.chunk_index, payload_offset, want)?;
                out.extend_from_slice(&bytes);
            }
        }

        audio_position = frame_end;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::make_index;
    use std::fs::File;
    use std::io::Write;

    fn write_block(buf: &mut Vec<u8>, tag: &[u8; 4], timestamp: u64, payload: &[u8]) {
        let size = 16 + payload.len() as u32;
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
    }

    fn wavi_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&1u16.to_le_bytes()); // mono
        p.extend_from_slice(&48000u32.to_le_bytes());
        p.extend_from_slice(&192000u32.to_le_bytes());
        p.extend_from_slice(&16u16.to_le_bytes());
        p
    }

    fn audf_block(frame_space: u32, samples: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&frame_space.to_le_bytes());
        payload.extend_from_slice(&vec![0u8; frame_space as usize]);
        payload.extend_from_slice(samples);
        payload
    }

    #[test]
    fn audio_size_matches_expected_bytes() {
        let wavi = WavInfo { channels: 2, sampling_rate: 48000, bytes_per_second: 192000, bits_per_sample: 16 };
        let size = audio_size(&wavi, 24000, 1001, 240);
        assert_eq!(size, 1_921_964);
    }

    #[test]
    fn read_audio_serves_header_then_frame_payload() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("test.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"WAVI", 0, &wavi_payload());
        let frame = audf_block(0, &[1, 2, 3, 4]);
        write_block(&mut bytes, b"AUDF", 5, &frame);
        let mut file = File::create(&base).unwrap();
        file.write_all(&bytes).unwrap();
        drop(file);

        let chunks = ChunkSet::open(&base).unwrap();
        let table = make_index(&chunks).unwrap();
        let wavi = find_wavi(&chunks, &table).unwrap().unwrap();
        let total = audio_size(&wavi, 24000, 1001, 1);

        let all = read_audio(&chunks, &table, &wavi, total, 0, 1024).unwrap();
        assert_eq!(&all[0..4], b"RIFF");
        assert_eq!(&all[44..48], &[1, 2, 3, 4]);

        let mid = read_audio(&chunks, &table, &wavi, total, 46, 2).unwrap();
        assert_eq!(mid, vec![3, 4]);
    }
}
