// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The MLVFS facade: owns the open containers, the resource-manager caches, and the
//! synthetic path resolution that sits between a filesystem binding (`mlvfs-fs`) and the
//! container/image/DNG crates.
//!
//! Ported from `original_source/mlvfs/main.c`'s `mlvfs_getattr`/`mlvfs_open`/`mlvfs_readdir`/
//! `mlvfs_read`, which thread a single global `struct mlvfs` and a single `resource_manager`
//! through every FUSE callback. Here that shared state is [`Mount`], constructed once by the
//! binary and handed to every filesystem request.

pub mod config;
pub mod path;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use mlvfs_core::cache::{AttributeCache, BufferCache, FileAttr};
use mlvfs_core::error::{not_found_error, MlvError, Result};
use mlvfs_core::io::{BufReader, ReadBytes};
use mlvfs_core::metadata::{FrameHeaderBundle, VidfHeader, WavInfo};
use mlvfs_core::units::CfaPattern;
use mlvfs_core::xref::XrefTable;
use mlvfs_container::{audio, force_index, get_index, resolve_frame_header, ChunkSet};
use mlvfs_dng::preview::{self, FrameGeometry as PreviewGeometry};
use mlvfs_image::pipeline::{self, FrameGeometry, PipelineOptions};
use mlvfs_image::stripes::StripeCorrection;
use mlvfs_image::unpack::unpack_bpp;

pub use config::{Config, NameScheme};
pub use path::Entry;

/// A fixed EV-space target every frame's median is normalized toward when deflicker is enabled
/// chosen to sit mid-range for typical 14-bit raw data.
const DEFLICKER_TARGET: u16 = 8192;

/// One opened container: its chunk files, cross-reference table, and the handful of
/// container-wide facts (frame count, audio presence/size) worth computing once per open
/// rather than per request.
struct Container {
    base_path: PathBuf,
    chunks: ChunkSet,
    table: XrefTable,
    frame_count: usize,
    wavi: Option<WavInfo>,
    audio_total_size: u64,
    /// Stripe-correction record: estimated once from whichever frame of this
    /// container is decoded first, then reused for every subsequent frame.
    stripe_correction: Mutex<Option<StripeCorrection>>,
}

impl Container {
    fn open(base_path: PathBuf, fps_override: Option<(u32, u32)>) -> Result<Self> {
        let chunks = ChunkSet::open(&base_path)?;
        let table = get_index(&base_path, &chunks)?;
        let frame_count = table.video_frame_count();

        let wavi = audio::find_wavi(&chunks, &table)?;
        let (fps_num, fps_den) = fps_override.unwrap_or_else(|| {
            if frame_count > 0 {
                match resolve_frame_header(&chunks, &table, 0) {
                    Ok(bundle) => (bundle.mlvi.fps_num, bundle.mlvi.fps_den),
                    Err(_) => (24000, 1001),
                }
            } else {
                (24000, 1001)
            }
        });
        let audio_total_size = match &wavi {
            Some(w) => audio::audio_size(w, fps_num, fps_den, frame_count as u64),
            None => 0,
        };

        Ok(Container {
            base_path,
            chunks,
            table,
            frame_count,
            wavi,
            audio_total_size,
            stripe_correction: Mutex::new(None),
        })
    }

    /// Resolves a synthetic frame filename's embedded `number` to a position in the
    /// index-ordered video-frame sequence, per `scheme`.
    fn frame_index(&self, number: u32, scheme: NameScheme) -> Option<usize> {
        match scheme {
            NameScheme::Sequential => {
                let idx = number as usize;
                (idx < self.frame_count).then_some(idx)
            }
            NameScheme::VidfFrameNumber => {
                for n in 0..self.frame_count {
                    let (_, entry) = self.table.nth_video_frame(n)?;
                    let bytes = self.chunks.read_at(entry.chunk_index, entry.offset_in_chunk + 16, 8).ok()?;
                    let mut r = BufReader::new(&bytes);
                    let vidf = VidfHeader::parse(&mut r).ok()?;
                    if vidf.frame_number == number {
                        return Some(n);
                    }
                }
                None
            }
        }
    }
}

/// The full set of state one mounted MLVFS instance needs: configuration, opened containers,
/// and the resource-manager caches.
pub struct Mount {
    config: Config,
    containers: RwLock<HashMap<String, std::sync::Arc<Container>>>,
    open_lock: Mutex<()>,
    buffers: BufferCache,
    attrs: AttributeCache,
}

impl Mount {
    pub fn new(config: Config) -> Self {
        Mount {
            config,
            containers: RwLock::new(HashMap::new()),
            open_lock: Mutex::new(()),
            buffers: BufferCache::new(),
            attrs: AttributeCache::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn container(&self, name: &str) -> Result<std::sync::Arc<Container>> {
        if let Some(c) = self.containers.read().expect("container map poisoned").get(name) {
            return Ok(std::sync::Arc::clone(c));
        }

        // Serialize opens so two concurrent lookups for the same new container do not both
        // build the index; whichever loses the race just reuses the winner's entry.
        let _guard = self.open_lock.lock().expect("open lock poisoned");
        if let Some(c) = self.containers.read().expect("container map poisoned").get(name) {
            return Ok(std::sync::Arc::clone(c));
        }

        let base_path = path::container_file_path(&self.config.mlv_path, name);
        let opened = Container::open(base_path, self.config.fps_override)?;
        let arc = std::sync::Arc::new(opened);
        self.containers
            .write()
            .expect("container map poisoned")
            .insert(name.to_string(), std::sync::Arc::clone(&arc));
        Ok(arc)
    }

    /// Forces a fresh index rebuild for `name`'s container and drops its cached state, so the
    /// next lookup re-derives everything from a rescan (used after detecting the sidecar
    /// carries stale or zero counts).
    pub fn reindex(&self, name: &str) -> Result<()> {
        let base_path = path::container_file_path(&self.config.mlv_path, name);
        let chunks = ChunkSet::open(&base_path)?;
        force_index(&base_path, &chunks)?;
        self.containers.write().expect("container map poisoned").remove(name);
        Ok(())
    }

    /// Lists every `.MLV` container exposed at the mount root.
    pub fn list_root(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.mlv_path)? {
            let entry = entry?;
            if path::is_container_name(&entry.file_name()) {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Lists one container's synthetic directory: per-frame `.DNG` files in sequential order,
    /// plus `audio.WAV` when the container has an audio track and `preview.GIF` always.
    pub fn list_container(&self, container: &str) -> Result<Vec<String>> {
        let c = self.container(container)?;
        let mut names: Vec<String> = match self.config.name_scheme {
            NameScheme::Sequential => (0..c.frame_count).map(path::sequential_filename).collect(),
            NameScheme::VidfFrameNumber => {
                let mut names = Vec::with_capacity(c.frame_count);
                for n in 0..c.frame_count {
                    if let Some((_, entry)) = c.table.nth_video_frame(n) {
                        if let Ok(bytes) = c.chunks.read_at(entry.chunk_index, entry.offset_in_chunk + 16, 8) {
                            let mut r = BufReader::new(&bytes);
                            if let Ok(vidf) = VidfHeader::parse(&mut r) {
                                names.push(format!("{:08}.DNG", vidf.frame_number));
                                continue;
                            }
                        }
                    }
                    names.push(path::sequential_filename(n));
                }
                names
            }
        };
        if c.wavi.is_some() {
            names.push("audio.WAV".to_string());
        }
        names.push("preview.GIF".to_string());
        Ok(names)
    }

    /// Returns `{size, mtime}` for a synthetic path, building and caching it on first access
    /// (the attribute cache).
    pub fn getattr(&self, synthetic_path: &str) -> Result<FileAttr> {
        if let Some(attr) = self.attrs.get(synthetic_path) {
            return Ok(attr);
        }

        let entry = path::parse(synthetic_path).ok_or(MlvError::NotFound)?;
        let attr = match entry {
            Entry::Root | Entry::Container { .. } => {
                FileAttr { size: 0, mtime: SystemTime::now() }
            }
            Entry::Frame { container, number } => {
                let c = self.container(&container)?;
                let idx = c.frame_index(number, self.config.name_scheme).ok_or(MlvError::NotFound)?;
                let (bundle, pixels) = self.decode_frame(&c, idx)?;
                let image = mlvfs_dng::build(&bundle, &pixels);
                FileAttr { size: image.total_size(), mtime: container_mtime(&c.base_path) }
            }
            Entry::Audio { container } => {
                let c = self.container(&container)?;
                if c.wavi.is_none() {
                    return not_found_error();
                }
                FileAttr { size: c.audio_total_size, mtime: container_mtime(&c.base_path) }
            }
            Entry::Preview { container } => {
                let c = self.container(&container)?;
                let bytes = self.build_preview(&c)?;
                FileAttr { size: bytes.len() as u64, mtime: container_mtime(&c.base_path) }
            }
        };

        Ok(self.attrs.get_or_insert(synthetic_path, attr))
    }

    /// Serves up to `size` bytes at `offset` of a synthetic path's contents.
    pub fn read(&self, synthetic_path: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        let entry = path::parse(synthetic_path).ok_or(MlvError::NotFound)?;
        match entry {
            Entry::Root | Entry::Container { .. } => not_found_error(),
            Entry::Frame { container, number } => {
                let c = self.container(&container)?;
                let idx = c.frame_index(number, self.config.name_scheme).ok_or(MlvError::NotFound)?;

                // The buffer cache holds the decoded, corrected pixel plane — the expensive
                // part (unpack + pipeline). The TIFF/DNG header is cheap pure computation, so
                // it is rebuilt from the bundle on every call rather than duplicated in the
                // cache; `header_bytes` is left empty here since this crate's only caller is
                // `read`, which always re-derives a full `StillImage` view below.
                let (buffer, _) = self.buffers.get_or_create(synthetic_path, || {
                    let (bundle, pixels) = self.decode_frame(&c, idx)?;
                    let (width, height) = (bundle.rawi.x_res as u32, bundle.rawi.y_res as u32);
                    Ok((Vec::new(), pixels, width, height))
                })?;

                let guard = buffer.lock().expect("decoded buffer mutex poisoned");
                let bundle = self.resolve_bundle(&c, idx)?;
                let image = mlvfs_dng::build(&bundle, &guard.pixels);
                let result = image.read(&guard.pixels, offset, size);
                drop(guard);
                self.buffers.release(&buffer);
                Ok(result)
            }
            Entry::Audio { container } => {
                let c = self.container(&container)?;
                let wavi = c.wavi.ok_or(MlvError::NotFound)?;
                audio::read_audio(&c.chunks, &c.table, &wavi, c.audio_total_size, offset, size)
            }
            Entry::Preview { container } => {
                let c = self.container(&container)?;
                let bytes = self.build_preview(&c)?;
                let start = (offset as usize).min(bytes.len());
                let end = (start + size).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
        }
    }

    fn resolve_bundle(&self, c: &Container, idx: usize) -> Result<FrameHeaderBundle> {
        resolve_frame_header(&c.chunks, &c.table, idx)
    }

    /// Reads, unpacks, and runs the correction pipeline over one frame.
    fn decode_frame(&self, c: &Container, idx: usize) -> Result<(FrameHeaderBundle, Vec<u16>)> {
        let bundle = self.resolve_bundle(c, idx)?;
        let packed = mlvfs_container::read_frame_pixels(&c.chunks, &bundle)?;
        let sample_count = (bundle.rawi.x_res as usize) * (bundle.rawi.y_res as usize);
        let mut pixels = unpack_bpp(&packed, bundle.rawi.bits_per_pixel as u32, sample_count)?;

        let cfa = bundle.rawi.cfa_pattern().unwrap_or(CfaPattern::Rggb);
        let geometry = FrameGeometry {
            width: bundle.rawi.x_res as u32,
            height: bundle.rawi.y_res as u32,
            black: bundle.rawi.black_level,
            white: bundle.rawi.white_level,
            cfa,
        };
        let options = PipelineOptions {
            badpix: self.config.badpix,
            dual_iso: self.config.dual_iso,
            fix_stripes: self.config.fix_stripes,
            chroma_smooth: self.config.chroma_smooth,
            deflicker: self.config.deflicker,
        };
        let mut stripe_cache = c.stripe_correction.lock().expect("stripe correction mutex poisoned");
        pipeline::run(&mut pixels, geometry, &options, &mut stripe_cache, DEFLICKER_TARGET);
        drop(stripe_cache);

        debug!("decoded frame {} of {}: {}x{}", idx, c.base_path.display(), geometry.width, geometry.height);
        Ok((bundle, pixels))
    }

    /// Builds (without caching across calls beyond the attribute cache's size) the container's
    /// `preview.GIF` bytes by decoding [`preview::FRAME_COUNT`] sampled frames.
    fn build_preview(&self, c: &Container) -> Result<Vec<u8>> {
        if c.frame_count == 0 {
            return preview::encode(Vec::new());
        }

        let mut frames = Vec::with_capacity(preview::FRAME_COUNT);
        for idx in preview::sample_indices(c.frame_count) {
            let (bundle, pixels) = self.decode_frame(c, idx)?;
            let cfa = bundle.rawi.cfa_pattern().unwrap_or(CfaPattern::Rggb);
            let geometry = PreviewGeometry {
                width: bundle.rawi.x_res as u32,
                height: bundle.rawi.y_res as u32,
                black: bundle.rawi.black_level,
                white: bundle.rawi.white_level,
                cfa,
                active_area: bundle.rawi.active_area,
            };
            frames.push(preview::sample_frame(&pixels, &geometry));
        }

        let bytes = preview::encode(frames)?;
        if bytes.is_empty() {
            warn!("preview.GIF encode produced no frames for {}", c.base_path.display());
        }
        Ok(bytes)
    }
}

fn container_mtime(base_path: &std::path::Path) -> SystemTime {
    fs::metadata(base_path).and_then(|m| m.modified()).unwrap_or(UNIX_EPOCH)
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

    fn mlvi_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&1u64.to_le_bytes());
        p.extend_from_slice(&24000u32.to_le_bytes());
        p.extend_from_slice(&1001u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p
    }

    fn rawi_payload(width: u16, height: u16) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&width.to_le_bytes());
        p.extend_from_slice(&height.to_le_bytes());
        p.extend_from_slice(&16u16.to_le_bytes());
        p.extend_from_slice(&2048u16.to_le_bytes());
        p.extend_from_slice(&15000u16.to_le_bytes());
        p.extend_from_slice(&0x0102_0001u32.to_le_bytes());
        for _ in 0..9 {
            p.extend_from_slice(&1i32.to_le_bytes());
            p.extend_from_slice(&1i32.to_le_bytes());
        }
        for _ in 0..4 {
            p.extend_from_slice(&0i32.to_le_bytes());
        }
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&(width as i32).to_le_bytes());
        p.extend_from_slice(&(height as i32).to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes());
        p.extend_from_slice(&1i32.to_le_bytes());
        p.extend_from_slice(&((width as u32) * (height as u32) * 2).to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p
    }

    fn sample_container(dir: &std::path::Path, width: u16, height: u16, frame_count: u32) -> PathBuf {
        let base = dir.join("clip.MLV");
        let mut bytes = Vec::new();
        write_block(&mut bytes, b"MLVI", 0, &mlvi_payload());
        write_block(&mut bytes, b"RAWI", 1, &rawi_payload(width, height));
        for i in 0..frame_count {
            let sample_count = width as usize * height as usize;
            let mut payload = vec![0u8; 8 + sample_count * 2];
            payload[0..4].copy_from_slice(&i.to_le_bytes());
            payload[4..8].copy_from_slice(&0u32.to_le_bytes());
            for (n, chunk) in payload[8..].chunks_exact_mut(2).enumerate() {
                let sample = 3000u16 + n as u16;
                chunk.copy_from_slice(&sample.to_le_bytes());
            }
            write_block(&mut bytes, b"VIDF", 10 + i as u64, &payload);
        }
        let mut file = File::create(&base).unwrap();
        file.write_all(&bytes).unwrap();
        base
    }

    #[test]
    fn root_lists_only_mlv_files() {
        let dir = tempfile::tempdir().unwrap();
        sample_container(dir.path(), 4, 4, 1);
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let mount = Mount::new(Config { mlv_path: dir.path().to_path_buf(), ..Config::default() });
        let names = mount.list_root().unwrap();
        assert_eq!(names, vec!["clip.MLV".to_string()]);
    }

    #[test]
    fn container_listing_includes_frames_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        sample_container(dir.path(), 4, 4, 3);

        let mount = Mount::new(Config { mlv_path: dir.path().to_path_buf(), ..Config::default() });
        let names = mount.list_container("clip.MLV").unwrap();
        assert!(names.contains(&"00000000.DNG".to_string()));
        assert!(names.contains(&"00000002.DNG".to_string()));
        assert!(names.contains(&"preview.GIF".to_string()));
        assert!(!names.contains(&"audio.WAV".to_string()));
    }

    #[test]
    fn frame_read_produces_a_tiff_header() {
        let dir = tempfile::tempdir().unwrap();
        sample_container(dir.path(), 4, 4, 2);

        let mount = Mount::new(Config { mlv_path: dir.path().to_path_buf(), ..Config::default() });
        let attr = mount.getattr("/clip.MLV/00000000.DNG").unwrap();
        assert!(attr.size > 0);

        let bytes = mount.read("/clip.MLV/00000000.DNG", 0, 4).unwrap();
        assert_eq!(&bytes[0..2], b"II");
    }

    #[test]
    fn unknown_frame_number_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        sample_container(dir.path(), 4, 4, 1);

        let mount = Mount::new(Config { mlv_path: dir.path().to_path_buf(), ..Config::default() });
        assert!(matches!(mount.getattr("/clip.MLV/00000099.DNG"), Err(MlvError::NotFound)));
    }
}
