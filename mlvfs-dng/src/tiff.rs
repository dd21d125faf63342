// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Little-endian TIFF directory-entry primitives shared by every IFD the still-image emitter
//! builds.
//!
//! Ported from `original_source/mlvfs/mlvfs-dng.c`'s `dir_entry` table and the `add_to_buf`
//! helpers that lay out the directory plus its overflow "extra data" area. The original keeps
//! each IFD as a fixed C array and computes offsets with running totals; here an [`Ifd`] is
//! built up from typed [`TagValue`]s and the offset arithmetic is centralized in [`Layout`].

use mlvfs_core::units::{Rational, SRational};

/// TIFF field type codes (see the TIFF 6.0 specification's Image File Directory chapter).
mod type_code {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const UNDEFINED: u16 = 7;
    pub const SRATIONAL: u16 = 10;
}

/// A directory entry's value, already typed for serialization. Every variant's `Vec` length is
/// the TIFF "count" for that entry.
#[derive(Debug, Clone)]
pub enum TagValue {
    Byte(Vec<u8>),
    Ascii(Vec<u8>),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<Rational>),
    SRational(Vec<SRational>),
    Undefined(Vec<u8>),
}

impl TagValue {
    fn type_code(&self) -> u16 {
        match self {
            TagValue::Byte(_) => type_code::BYTE,
            TagValue::Ascii(_) => type_code::ASCII,
            TagValue::Short(_) => type_code::SHORT,
            TagValue::Long(_) => type_code::LONG,
            TagValue::Rational(_) => type_code::RATIONAL,
            TagValue::SRational(_) => type_code::SRATIONAL,
            TagValue::Undefined(_) => type_code::UNDEFINED,
        }
    }

    fn count(&self) -> u32 {
        (match self {
            TagValue::Byte(v) => v.len(),
            TagValue::Ascii(v) => v.len(),
            TagValue::Short(v) => v.len(),
            TagValue::Long(v) => v.len(),
            TagValue::Rational(v) => v.len(),
            TagValue::SRational(v) => v.len(),
            TagValue::Undefined(v) => v.len(),
        }) as u32
    }

    fn elem_size(&self) -> u32 {
        match self.type_code() {
            type_code::BYTE | type_code::ASCII | type_code::UNDEFINED => 1,
            type_code::SHORT => 2,
            type_code::LONG => 4,
            type_code::RATIONAL | type_code::SRATIONAL => 8,
            _ => unreachable!("exhaustive over TagValue::type_code"),
        }
    }

    fn byte_len(&self) -> u32 {
        self.count() * self.elem_size()
    }

    /// Raw little-endian bytes of this value, in file order, unpadded.
    fn encode(&self) -> Vec<u8> {
        match self {
            TagValue::Byte(v) | TagValue::Ascii(v) | TagValue::Undefined(v) => v.clone(),
            TagValue::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TagValue::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TagValue::Rational(v) => {
                v.iter().flat_map(|r| [r.num.to_le_bytes(), r.den.to_le_bytes()]).flatten().collect()
            }
            TagValue::SRational(v) => {
                v.iter().flat_map(|r| [r.num.to_le_bytes(), r.den.to_le_bytes()]).flatten().collect()
            }
        }
    }

    /// A single `LONG` value, the shape every cross-IFD offset patch (`SubIFDs`, `ExifIFD`,
    /// `StripOffsets`) takes.
    pub fn offset(value: u32) -> Self {
        TagValue::Long(vec![value])
    }
}

/// One directory entry: a tag number plus its value. IFDs are written with entries in ascending
/// tag order, as the TIFF spec requires and `mlvfs-dng.c`'s tables already are.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub tag: u16,
    pub value: TagValue,
}

impl DirEntry {
    pub fn new(tag: u16, value: TagValue) -> Self {
        DirEntry { tag, value }
    }
}

/// An unresolved image file directory: an ordered list of entries, some of whose values are
/// still placeholders for offsets that depend on the final layout (patched via
/// [`Ifd::patch`] once [`Layout::compute`] has run).
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    pub entries: Vec<DirEntry>,
}

impl Ifd {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        Ifd { entries }
    }

    /// Replaces the value of the entry tagged `tag`. The replacement must encode to the same
    /// byte length as the placeholder it replaces (true for every offset patch in this crate,
    /// since both are always a single `LONG`), so the layout already computed from the
    /// placeholder stays valid.
    pub fn patch(&mut self, tag: u16, value: TagValue) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag == tag) {
            debug_assert_eq!(entry.value.byte_len(), value.byte_len(), "patch must not resize entry {:#06x}", tag);
            entry.value = value;
        }
    }

    fn dir_size(&self) -> u32 {
        2 + 12 * self.entries.len() as u32 + 4
    }
}

/// The byte layout of the whole three-IFD header: IFD0 (preview), the raw SubIFD, and
/// the Exif IFD, each followed in turn by an "extra data" area for entries too large to fit
/// inline in their 4-byte value slot.
pub struct Layout {
    pub ifd0_offset: u32,
    pub ifd1_offset: u32,
    pub exif_offset: u32,
    /// Where the first byte after the three directories (and their extra-data areas) lands;
    /// the thumbnail strip starts here.
    pub data_offset: u32,
}

pub const TIFF_HEADER_SIZE: u32 = 8;

impl Layout {
    pub fn compute(ifd0: &Ifd, ifd1: &Ifd, exif: &Ifd) -> Self {
        let ifd0_offset = TIFF_HEADER_SIZE;
        let ifd1_offset = ifd0_offset + ifd0.dir_size();
        let exif_offset = ifd1_offset + ifd1.dir_size();
        let mut data_offset = exif_offset + exif.dir_size();
        for ifd in [ifd0, ifd1, exif] {
            for entry in &ifd.entries {
                if entry.value.byte_len() > 4 {
                    data_offset += entry.value.byte_len();
                    if entry.value.byte_len() % 2 == 1 {
                        data_offset += 1; // word-align the next extra-data entry.
                    }
                }
            }
        }
        Layout { ifd0_offset, ifd1_offset, exif_offset, data_offset }
    }
}

/// Serializes the TIFF header (`II*\0` + first-IFD offset) followed by all three IFDs and
/// their extra-data areas, in the order `compute` assumed.
pub fn serialize(ifd0: &Ifd, ifd1: &Ifd, exif: &Ifd, layout: &Layout) -> Vec<u8> {
    let mut out = Vec::with_capacity(layout.data_offset as usize);
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&layout.ifd0_offset.to_le_bytes());

    let mut extra = Vec::new();
    let mut extra_cursor = layout.data_offset;

    write_ifd(&mut out, ifd0, next_ifd_offset(layout.ifd1_offset, ifd1), &mut extra, &mut extra_cursor);
    write_ifd(&mut out, ifd1, next_ifd_offset(layout.exif_offset, exif), &mut extra, &mut extra_cursor);
    write_ifd(&mut out, exif, 0, &mut extra, &mut extra_cursor);

    debug_assert_eq!(out.len() as u32, layout.data_offset, "serialized directory size does not match computed layout");
    out.extend_from_slice(&extra);
    out
}

/// The `next IFD offset` field written at the end of a directory: 0 terminates the chain, so
/// only IFD0 and the raw SubIFD (which chain into the next directory) need a non-zero value.
fn next_ifd_offset(offset: u32, _ifd: &Ifd) -> u32 {
    offset
}

fn write_ifd(out: &mut Vec<u8>, ifd: &Ifd, next_ifd: u32, extra: &mut Vec<u8>, extra_cursor: &mut u32) {
    out.extend_from_slice(&(ifd.entries.len() as u16).to_le_bytes());
    for entry in &ifd.entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.value.type_code().to_le_bytes());
        out.extend_from_slice(&entry.value.count().to_le_bytes());

        let bytes = entry.value.encode();
        if bytes.len() <= 4 {
            let mut field = [0u8; 4];
            field[..bytes.len()].copy_from_slice(&bytes);
            out.extend_from_slice(&field);
        } else {
            out.extend_from_slice(&extra_cursor.to_le_bytes());
            extra.extend_from_slice(&bytes);
            *extra_cursor += bytes.len() as u32;
            if bytes.len() % 2 == 1 {
                extra.push(0);
                *extra_cursor += 1;
            }
        }
    }
    out.extend_from_slice(&next_ifd.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_overflow_entries_round_trip() {
        let ifd0 = Ifd::new(vec![
            DirEntry::new(0x00FE, TagValue::Long(vec![1])),
            DirEntry::new(0x0110, TagValue::Ascii(b"Canon\0".to_vec())),
        ]);
        let ifd1 = Ifd::new(vec![DirEntry::new(0x00FE, TagValue::Long(vec![0]))]);
        let exif = Ifd::new(vec![]);

        let layout = Layout::compute(&ifd0, &ifd1, &exif);
        let bytes = serialize(&ifd0, &ifd1, &exif, &layout);

        assert_eq!(&bytes[0..2], b"II");
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 42);
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), layout.ifd0_offset);

        let count = u16::from_le_bytes([bytes[8], bytes[9]]);
        assert_eq!(count, 2);
    }

    #[test]
    fn odd_length_extra_data_is_word_aligned() {
        let ifd0 = Ifd::new(vec![DirEntry::new(0x010E, TagValue::Ascii(b"abc\0\0".to_vec()))]);
        let ifd1 = Ifd::new(vec![]);
        let exif = Ifd::new(vec![]);
        let layout = Layout::compute(&ifd0, &ifd1, &exif);
        let bytes = serialize(&ifd0, &ifd1, &exif, &layout);
        assert_eq!(bytes.len() as u32, layout.data_offset + 5 + 1);
    }

    #[test]
    fn patch_overwrites_value_without_changing_layout() {
        let mut ifd0 = Ifd::new(vec![DirEntry::new(0x014A, TagValue::offset(0))]);
        let size_before = ifd0.dir_size();
        ifd0.patch(0x014A, TagValue::offset(1234));
        assert_eq!(ifd0.dir_size(), size_before);
        match &ifd0.entries[0].value {
            TagValue::Long(v) => assert_eq!(v[0], 1234),
            _ => panic!("expected Long"),
        }
    }
}
