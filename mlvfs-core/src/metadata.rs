// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-frame metadata structs assembled by the frame-header resolver.
//!
//! Every block payload parser here follows the same discipline: read only the fields
//! this crate knows about, then skip the rest of the declared payload with `ignore_bytes`. A
//! future container revision that appends fields to a block is therefore still readable,
//! because `declared_size` is always honored even when it exceeds what we understand.

use crate::error::Result;
use crate::io::ReadBytes;
use crate::units::{CfaPattern, Crop, Rect, SRational};

/// Reads `payload_len` bytes worth of a block, calling `read_fields` for the part this crate
/// understands and discarding whatever declared bytes remain afterwards.
fn read_clamped<R: ReadBytes, T>(
    reader: &mut R,
    payload_len: u32,
    read_fields: impl FnOnce(&mut R) -> Result<T>,
) -> Result<T> {
    let start = reader.pos();
    let value = read_fields(reader)?;
    let consumed = reader.pos() - start;
    if consumed < payload_len as u64 {
        reader.ignore_bytes(payload_len as u64 - consumed)?;
    }
    Ok(value)
}

/// `MLVI` — container header.
#[derive(Debug, Clone, Default)]
pub struct MlviHeader {
    pub guid: u64,
    pub fps_num: u32,
    pub fps_den: u32,
    /// `0` = video only, `1` = video + audio.
    pub audio_class: u32,
    pub file_num: u16,
    pub video_frame_count: u32,
    pub audio_frame_count: u32,
}

impl MlviHeader {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            Ok(MlviHeader {
                guid: r.read_u64()?,
                fps_num: r.read_u32()?,
                fps_den: r.read_u32()?,
                audio_class: r.read_u32()?,
                file_num: r.read_u16()?,
                video_frame_count: r.read_u32()?,
                audio_frame_count: r.read_u32()?,
            })
        })
    }
}

/// `VIDF` prelude (payload starts with `frame_space` padding bytes then the packed sensor data;
/// the padding and pixel payload are handled by `mlvfs-container`, not here).
#[derive(Debug, Clone, Copy, Default)]
pub struct VidfHeader {
    pub frame_number: u32,
    pub frame_space: u32,
}

impl VidfHeader {
    pub fn parse<R: ReadBytes>(reader: &mut R) -> Result<Self> {
        Ok(VidfHeader { frame_number: reader.read_u32()?, frame_space: reader.read_u32()? })
    }
}

/// `AUDF` prelude.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudfHeader {
    pub frame_space: u32,
}

impl AudfHeader {
    pub fn parse<R: ReadBytes>(reader: &mut R) -> Result<Self> {
        Ok(AudfHeader { frame_space: reader.read_u32()? })
    }
}

/// `RAWI` — raw image info, including the nested sensor descriptor used throughout the DNG
/// emitter and correction pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawInfo {
    pub x_res: u16,
    pub y_res: u16,
    pub bits_per_pixel: u16,
    pub black_level: u16,
    pub white_level: u16,
    pub cfa_code: u32,
    pub color_matrix: [SRational; 9],
    pub active_area: Rect,
    pub crop: Crop,
    pub exposure_bias: SRational,
    pub frame_size: u32,
    pub pitch: u32,
}

impl RawInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            let x_res = r.read_u16()?;
            let y_res = r.read_u16()?;
            let bits_per_pixel = r.read_u16()?;
            let black_level = r.read_u16()?;
            let white_level = r.read_u16()?;
            let cfa_code = r.read_u32()?;

            let mut color_matrix = [SRational::default(); 9];
            for entry in &mut color_matrix {
                *entry = SRational::new(r.read_i32()?, r.read_i32()?);
            }

            let active_area = Rect {
                x1: r.read_i32()?,
                y1: r.read_i32()?,
                x2: r.read_i32()?,
                y2: r.read_i32()?,
            };
            let crop =
                Crop { x: r.read_i32()?, y: r.read_i32()?, w: r.read_i32()?, h: r.read_i32()? };
            let exposure_bias = SRational::new(r.read_i32()?, r.read_i32()?);
            let frame_size = r.read_u32()?;
            let pitch = r.read_u32()?;

            Ok(RawInfo {
                x_res,
                y_res,
                bits_per_pixel,
                black_level,
                white_level,
                cfa_code,
                color_matrix,
                active_area,
                crop,
                exposure_bias,
                frame_size,
                pitch,
            })
        })
    }

    pub fn cfa_pattern(&self) -> Option<CfaPattern> {
        CfaPattern::from_code(self.cfa_code)
    }
}

/// `WAVI` — audio stream info.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavInfo {
    pub channels: u16,
    pub sampling_rate: u32,
    pub bytes_per_second: u32,
    pub bits_per_sample: u16,
}

impl WavInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            Ok(WavInfo {
                channels: r.read_u16()?,
                sampling_rate: r.read_u32()?,
                bytes_per_second: r.read_u32()?,
                bits_per_sample: r.read_u16()?,
            })
        })
    }
}

/// `RTCI` — wall-clock stamp at start of recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtciInfo {
    pub seconds_since_epoch: u32,
    pub milliseconds: u16,
}

impl RtciInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            Ok(RtciInfo { seconds_since_epoch: r.read_u32()?, milliseconds: r.read_u16()? })
        })
    }
}

/// `IDNT` — camera identity.
#[derive(Debug, Clone, Default)]
pub struct IdntInfo {
    pub camera_model: String,
    pub camera_serial: String,
}

impl IdntInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            let model = read_fixed_cstr(r, 32)?;
            let serial = read_fixed_cstr(r, 32)?;
            Ok(IdntInfo { camera_model: model, camera_serial: serial })
        })
    }
}

/// `EXPO` — exposure parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpoInfo {
    pub shutter_ns: u64,
    pub iso: u32,
}

impl ExpoInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            Ok(ExpoInfo { shutter_ns: r.read_u64()?, iso: r.read_u32()? })
        })
    }
}

/// `LENS` — lens info.
#[derive(Debug, Clone, Default)]
pub struct LensInfo {
    pub focal_length_mm: u32,
    pub aperture_x100: u32,
    pub lens_model: String,
}

impl LensInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            let focal_length_mm = r.read_u32()?;
            let aperture_x100 = r.read_u32()?;
            let lens_model = read_fixed_cstr(r, 32)?;
            Ok(LensInfo { focal_length_mm, aperture_x100, lens_model })
        })
    }
}

/// `WBAL` — white-balance gains.
#[derive(Debug, Clone, Copy, Default)]
pub struct WbalInfo {
    pub gain_r: u32,
    pub gain_g: u32,
    pub gain_b: u32,
}

impl WbalInfo {
    pub fn parse<R: ReadBytes>(reader: &mut R, payload_len: u32) -> Result<Self> {
        read_clamped(reader, payload_len, |r| {
            Ok(WbalInfo { gain_r: r.read_u32()?, gain_g: r.read_u32()?, gain_b: r.read_u32()? })
        })
    }
}

fn read_fixed_cstr<R: ReadBytes>(reader: &mut R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_buf_exact(&mut buf)?;
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..nul]).into_owned())
}

/// The per-video-frame projection of metadata. Built on demand by
/// `mlvfs-container`'s frame-header resolver from a target `VIDF` entry.
#[derive(Debug, Clone, Default)]
pub struct FrameHeaderBundle {
    pub file_number: u32,
    pub position: u64,
    pub vidf: VidfHeader,
    pub mlvi: MlviHeader,
    pub rtci: Option<RtciInfo>,
    pub idnt: Option<IdntInfo>,
    pub rawi: RawInfo,
    pub expo: Option<ExpoInfo>,
    pub lens: Option<LensInfo>,
    pub wbal: Option<WbalInfo>,
}
