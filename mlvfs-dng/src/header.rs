// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembles the three IFDs of a still-image DNG header from a resolved
//! [`FrameHeaderBundle`]: IFD0 (the preview thumbnail), the raw SubIFD (the main Bayer image),
//! and the Exif IFD.
//!
//! Tag numbers, types, and values are ported from `original_source/mlvfs/mlvfs-dng.c`'s
//! `ifd0`/`ifd1`/`exif_ifd` tables. A few Exif values the source computes from placeholder APEX
//! constants are instead derived here from the frame's actual exposure fields (documented
//! per-tag below); that divergence is recorded in `DESIGN.md`.

use mlvfs_core::metadata::FrameHeaderBundle;
use mlvfs_core::units::{CfaPattern, Rational, SRational};

use crate::datetime::format_exif_datetime;
use crate::opcode::fix_bad_pixels_constant;
use crate::thumbnail::{THUMBNAIL_HEIGHT, THUMBNAIL_SIZE, THUMBNAIL_WIDTH};
use crate::tiff::{DirEntry, Ifd, Layout, TagValue};

const MAKE: &[u8] = b"Canon\0";
const SOFTWARE: &[u8] = b"MLVFS\0";

fn ascii(s: &str) -> TagValue {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    TagValue::Ascii(v)
}

/// As-shot white balance: `AsShotNeutral` is the *reciprocal* of each channel's recorded gain,
/// expressed as a rational over the gain's own fixed-point base (`1024`, the unity point the
/// container's `WBAL` block uses).
fn as_shot_neutral(gain_r: u32, gain_g: u32, gain_b: u32) -> [Rational; 3] {
    const UNITY: u32 = 1024;
    let r = if gain_r > 0 { Rational::new(UNITY, gain_r) } else { Rational::new(1, 1) };
    let g = if gain_g > 0 { Rational::new(UNITY, gain_g) } else { Rational::new(1, 1) };
    let b = if gain_b > 0 { Rational::new(UNITY, gain_b) } else { Rational::new(1, 1) };
    [r, g, b]
}

fn build_ifd0(bundle: &FrameHeaderBundle, thumb_offset: u32) -> Ifd {
    let camera_model = bundle.idnt.as_ref().map(|i| i.camera_model.as_str()).unwrap_or("");
    let camera_serial = bundle.idnt.as_ref().map(|i| i.camera_serial.as_str()).unwrap_or("");
    let lens_model = bundle.lens.as_ref().map(|l| l.lens_model.as_str()).unwrap_or("");
    let datetime = bundle.rtci.map(|r| r.seconds_since_epoch).map(format_exif_datetime).unwrap_or_else(|| format_exif_datetime(0));
    let wbal = bundle.wbal.unwrap_or_default();
    let rawi = &bundle.rawi;

    Ifd::new(vec![
        DirEntry::new(0x00FE, TagValue::Long(vec![1])), // NewSubFileType: reduced-resolution image
        DirEntry::new(0x0100, TagValue::Long(vec![THUMBNAIL_WIDTH])),
        DirEntry::new(0x0101, TagValue::Long(vec![THUMBNAIL_HEIGHT])),
        DirEntry::new(0x0102, TagValue::Short(vec![8, 8, 8])), // BitsPerSample
        DirEntry::new(0x0103, TagValue::Short(vec![1])),       // Compression: none
        DirEntry::new(0x0106, TagValue::Short(vec![2])),       // PhotometricInterpretation: RGB
        DirEntry::new(0x010E, ascii("")),                      // ImageDescription
        DirEntry::new(0x010F, TagValue::Ascii(MAKE.to_vec())), // Make
        DirEntry::new(0x0110, ascii(camera_model)),            // Model
        DirEntry::new(0x0111, TagValue::offset(thumb_offset)), // StripOffsets
        DirEntry::new(0x0112, TagValue::Short(vec![1])),       // Orientation
        DirEntry::new(0x0115, TagValue::Short(vec![3])),       // SamplesPerPixel
        DirEntry::new(0x0116, TagValue::Short(vec![THUMBNAIL_HEIGHT as u16])), // RowsPerStrip
        DirEntry::new(0x0117, TagValue::Long(vec![THUMBNAIL_SIZE as u32])),    // StripByteCounts
        DirEntry::new(0x011C, TagValue::Short(vec![1])),       // PlanarConfiguration
        DirEntry::new(0x0131, TagValue::Ascii(SOFTWARE.to_vec())),
        DirEntry::new(0x0132, TagValue::Ascii(datetime)), // DateTime
        DirEntry::new(0x013B, ascii("")),                 // Artist
        DirEntry::new(0x014A, TagValue::offset(0)),       // SubIFDs (patched)
        DirEntry::new(0x8298, ascii("")),                 // Copyright
        DirEntry::new(0x8769, TagValue::offset(0)),       // ExifIFD (patched)
        DirEntry::new(0x9216, TagValue::Byte(vec![1, 0, 0, 0])), // TIFF/EPStandardID
        DirEntry::new(0xA431, ascii(camera_serial)),      // BodySerialNumber
        DirEntry::new(0xA434, ascii(lens_model)),         // LensModel
        DirEntry::new(0xC612, TagValue::Byte(vec![1, 3, 0, 0])), // DNGVersion
        DirEntry::new(0xC613, TagValue::Byte(vec![1, 3, 0, 0])), // DNGBackwardVersion
        DirEntry::new(0xC614, ascii(camera_model)),       // UniqueCameraModel
        DirEntry::new(
            0xC621,
            TagValue::SRational(rawi.color_matrix.to_vec()), // ColorMatrix1
        ),
        DirEntry::new(0xC627, TagValue::Rational(vec![Rational::new(1, 1); 3])), // AnalogBalance
        DirEntry::new(0xC628, TagValue::Rational(as_shot_neutral(wbal.gain_r, wbal.gain_g, wbal.gain_b).to_vec())), // AsShotNeutral
        DirEntry::new(0xC62A, TagValue::SRational(vec![rawi.exposure_bias])), // BaselineExposureOffset
        DirEntry::new(0xC62B, TagValue::Rational(vec![Rational::new(1, 1)])), // BaselineNoise
        DirEntry::new(0xC62C, TagValue::Rational(vec![Rational::new(4, 3)])), // BaselineSharpness
        DirEntry::new(0xC62E, TagValue::Rational(vec![Rational::new(1, 1)])), // LinearResponseLimit
        DirEntry::new(0xC65A, TagValue::Short(vec![21])), // CalibrationIlluminant1: D65
        DirEntry::new(0xC65B, TagValue::Short(vec![21])), // CalibrationIlluminant2: D65
        DirEntry::new(0xC764, TagValue::SRational(vec![SRational::new(bundle.mlvi.fps_num as i32, bundle.mlvi.fps_den.max(1) as i32)])), // FrameRate
    ])
}

fn build_ifd1(bundle: &FrameHeaderBundle, main_offset: u32, strip_len: u32) -> Ifd {
    let rawi = &bundle.rawi;
    let cfa = rawi.cfa_pattern().unwrap_or(CfaPattern::Rggb);

    Ifd::new(vec![
        DirEntry::new(0x00FE, TagValue::Long(vec![0])), // NewSubFileType: full-resolution image
        DirEntry::new(0x0100, TagValue::Long(vec![rawi.x_res as u32])),
        DirEntry::new(0x0101, TagValue::Long(vec![rawi.y_res as u32])),
        DirEntry::new(0x0102, TagValue::Short(vec![rawi.bits_per_pixel])),
        DirEntry::new(0x0103, TagValue::Short(vec![1])), // Compression: none
        DirEntry::new(0x0106, TagValue::Short(vec![0x8023])), // PhotometricInterpretation: CFA
        DirEntry::new(0x0111, TagValue::offset(main_offset)), // StripOffsets
        DirEntry::new(0x0115, TagValue::Short(vec![1])), // SamplesPerPixel
        DirEntry::new(0x0116, TagValue::Short(vec![rawi.y_res])), // RowsPerStrip
        DirEntry::new(0x0117, TagValue::Long(vec![strip_len])), // StripByteCounts
        DirEntry::new(0x011A, TagValue::Rational(vec![Rational::new(180, 1)])), // XResolution
        DirEntry::new(0x011B, TagValue::Rational(vec![Rational::new(180, 1)])), // YResolution
        DirEntry::new(0x011C, TagValue::Short(vec![1])), // PlanarConfiguration
        DirEntry::new(0x0128, TagValue::Short(vec![2])), // ResolutionUnit: inch
        DirEntry::new(0x828D, TagValue::Short(vec![2, 2])), // CFARepeatPatternDim
        DirEntry::new(0x828E, TagValue::Byte(cfa.tiff_cfa_bytes().to_vec())), // CFAPattern
        DirEntry::new(0xC61A, TagValue::Long(vec![rawi.black_level as u32])), // BlackLevel
        DirEntry::new(0xC61D, TagValue::Long(vec![rawi.white_level as u32])), // WhiteLevel
        DirEntry::new(0xC61F, TagValue::Long(vec![rawi.crop.x.max(0) as u32, rawi.crop.y.max(0) as u32])), // DefaultCropOrigin
        DirEntry::new(0xC620, TagValue::Long(vec![rawi.crop.w.max(0) as u32, rawi.crop.h.max(0) as u32])), // DefaultCropSize
        DirEntry::new(
            0xC68D,
            TagValue::Long(vec![
                rawi.active_area.y1.max(0) as u32,
                rawi.active_area.x1.max(0) as u32,
                rawi.active_area.y2.max(0) as u32,
                rawi.active_area.x2.max(0) as u32,
            ]),
        ), // ActiveArea: top, left, bottom, right
        DirEntry::new(0xC740, TagValue::Undefined(fix_bad_pixels_constant(cfa))), // OpcodeList2
    ])
}

fn build_exif_ifd(bundle: &FrameHeaderBundle) -> Ifd {
    let expo = bundle.expo.unwrap_or_default();
    let lens = bundle.lens.clone().unwrap_or_default();
    let datetime = bundle.rtci.map(|r| r.seconds_since_epoch).map(format_exif_datetime).unwrap_or_else(|| format_exif_datetime(0));

    let shutter_seconds = Rational::new((expo.shutter_ns / 1000).min(u32::MAX as u64) as u32, 1_000_000);
    let fnumber = Rational::new(lens.aperture_x100, 100);

    let shutter_f64 = shutter_seconds.as_f64();
    let apex_shutter = if shutter_f64 > 0.0 { -shutter_f64.log2() } else { 0.0 };
    let aperture_f64 = fnumber.as_f64();
    let apex_aperture = if aperture_f64 > 0.0 { 2.0 * aperture_f64.log2() } else { 0.0 };

    Ifd::new(vec![
        DirEntry::new(0x829A, TagValue::Rational(vec![shutter_seconds])), // ExposureTime
        DirEntry::new(0x829D, TagValue::Rational(vec![fnumber])),         // FNumber
        DirEntry::new(0x8822, TagValue::Short(vec![0])),                  // ExposureProgram: not defined
        DirEntry::new(0x8827, TagValue::Short(vec![expo.iso.min(u16::MAX as u32) as u16])), // ISOSpeedRatings
        DirEntry::new(0x9000, TagValue::Undefined(b"0221".to_vec())),     // ExifVersion
        DirEntry::new(0x9003, TagValue::Ascii(datetime)),                 // DateTimeOriginal
        DirEntry::new(0x9201, TagValue::SRational(vec![SRational::new(apex_shutter.round() as i32, 1)])), // ShutterSpeedValue
        DirEntry::new(0x9202, TagValue::Rational(vec![Rational::new(apex_aperture.round().max(0.0) as u32, 1)])), // ApertureValue
        DirEntry::new(0x9204, TagValue::SRational(vec![bundle.rawi.exposure_bias])), // ExposureBiasValue
        DirEntry::new(0x9205, TagValue::Rational(vec![Rational::new(apex_aperture.round().max(0.0) as u32, 1)])), // MaxApertureValue
        DirEntry::new(0x9207, TagValue::Short(vec![0])), // MeteringMode: unknown
        DirEntry::new(0x9209, TagValue::Short(vec![0])), // Flash: no flash
        DirEntry::new(0x920A, TagValue::Rational(vec![Rational::new(lens.focal_length_mm, 1)])), // FocalLength
        DirEntry::new(0x9290, TagValue::Ascii(b"00\0".to_vec())), // SubSecTime
        DirEntry::new(0x9291, TagValue::Ascii(b"00\0".to_vec())), // SubSecTimeOriginal
        DirEntry::new(0xA405, TagValue::Short(vec![lens.focal_length_mm.min(u16::MAX as u32) as u16])), // FocalLengthIn35mmFilm
    ])
}

/// The assembled header plus the byte offsets the image-data reader needs: where the thumbnail
/// strip starts (right after the directories) and where the main raw strip starts (right after
/// the thumbnail).
pub struct Header {
    pub bytes: Vec<u8>,
    pub thumb_offset: u64,
    pub main_offset: u64,
    pub strip_len: u64,
}

/// Assembles the full TIFF/DNG header for `bundle`'s frame. `strip_len` is the byte length of
/// the main image strip this crate will emit (unpacked 16-bit samples, so
/// `width * height * 2`).
pub fn build(bundle: &FrameHeaderBundle, strip_len: u32) -> Header {
    // Offsets are self-referential (IFD0's StripOffsets/SubIFDs depend on the final layout),
    // so build once with placeholders, compute the layout, then patch in the real offsets —
    // patches never change an entry's encoded size, so the layout stays valid.
    let mut ifd0 = build_ifd0(bundle, 0);
    let mut ifd1 = build_ifd1(bundle, 0, strip_len);
    let exif = build_exif_ifd(bundle);

    let layout = Layout::compute(&ifd0, &ifd1, &exif);
    let thumb_offset = layout.data_offset;
    let main_offset = thumb_offset + THUMBNAIL_SIZE as u32;

    ifd0.patch(0x0111, TagValue::offset(thumb_offset));
    ifd0.patch(0x014A, TagValue::offset(layout.ifd1_offset));
    ifd0.patch(0x8769, TagValue::offset(layout.exif_offset));
    ifd1.patch(0x0111, TagValue::offset(main_offset));

    let bytes = crate::tiff::serialize(&ifd0, &ifd1, &exif, &layout);

    Header { bytes, thumb_offset: thumb_offset as u64, main_offset: main_offset as u64, strip_len: strip_len as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlvfs_core::metadata::{RawInfo, VidfHeader};
    use mlvfs_core::units::{Crop, Rect};

    fn sample_bundle() -> FrameHeaderBundle {
        let mut bundle = FrameHeaderBundle {
            vidf: VidfHeader { frame_number: 0, frame_space: 0 },
            rawi: RawInfo {
                x_res: 1920,
                y_res: 1080,
                bits_per_pixel: 14,
                black_level: 2048,
                white_level: 15000,
                cfa_code: 0x0201_0100,
                color_matrix: [SRational::new(1, 1); 9],
                active_area: Rect { x1: 0, y1: 0, x2: 1920, y2: 1080 },
                crop: Crop { x: 0, y: 0, w: 1920, h: 1080 },
                exposure_bias: SRational::new(0, 1),
                frame_size: 1920 * 1080 * 14 / 8,
                pitch: 0,
            },
            ..Default::default()
        };
        bundle.mlvi.fps_num = 24000;
        bundle.mlvi.fps_den = 1001;
        bundle
    }

    #[test]
    fn header_begins_with_little_endian_tiff_magic() {
        let bundle = sample_bundle();
        let strip_len = bundle.rawi.x_res as u32 * bundle.rawi.y_res as u32 * 2;
        let header = build(&bundle, strip_len);
        assert_eq!(&header.bytes[0..2], b"II");
        assert_eq!(u16::from_le_bytes([header.bytes[2], header.bytes[3]]), 42);
    }

    #[test]
    fn ifd0_declares_thumbnail_dimensions() {
        let bundle = sample_bundle();
        let strip_len = bundle.rawi.x_res as u32 * bundle.rawi.y_res as u32 * 2;
        let header = build(&bundle, strip_len);

        let ifd0_offset = u32::from_le_bytes(header.bytes[4..8].try_into().unwrap()) as usize;
        let count = u16::from_le_bytes(header.bytes[ifd0_offset..ifd0_offset + 2].try_into().unwrap());
        assert!(count > 0);

        // NewSubFileType is the first entry and must be 1 (reduced-resolution / preview).
        let first_entry = &header.bytes[ifd0_offset + 2..ifd0_offset + 14];
        assert_eq!(u16::from_le_bytes([first_entry[0], first_entry[1]]), 0x00FE);
        assert_eq!(u32::from_le_bytes(first_entry[8..12].try_into().unwrap()), 1);

        // second entry is ImageWidth == THUMBNAIL_WIDTH
        let second_entry = &header.bytes[ifd0_offset + 14..ifd0_offset + 26];
        assert_eq!(u16::from_le_bytes([second_entry[0], second_entry[1]]), 0x0100);
        assert_eq!(u32::from_le_bytes(second_entry[8..12].try_into().unwrap()), THUMBNAIL_WIDTH);
    }

    #[test]
    fn main_offset_follows_thumbnail() {
        let bundle = sample_bundle();
        let strip_len = bundle.rawi.x_res as u32 * bundle.rawi.y_res as u32 * 2;
        let header = build(&bundle, strip_len);
        assert_eq!(header.main_offset, header.thumb_offset + THUMBNAIL_SIZE as u64);
    }
}
