// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic path parsing for the filesystem tree mounted at the root.
//!
//! Ported from `original_source/mlvfs/main.c`'s `string_ends_with`/`get_mlv_filename`/
//! `get_mlv_frame_number`. The source re-derives the container name and frame number by
//! string-splitting the FUSE path on every call; this keeps the same shape (a pure parse from
//! `&str` to a typed [`Entry`]) but returns a structured value instead of out-parameters.

use std::ffi::OsStr;
use std::path::Path;

/// One resolved synthetic path, relative to the mount root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// `/` — lists every `.MLV` container in `Config::mlv_path`.
    Root,
    /// `/<container>` — lists that container's frames plus `audio.WAV`/`preview.GIF`.
    Container { container: String },
    /// `/<container>/<NNNNNNNN>.DNG` — one synthesized still image. `number` is the filename's
    /// own digits, interpreted against `Config::name_scheme` at resolution time:
    /// either a position in the index-ordered frame sequence, or a `VIDF::frame_number` to
    /// search for.
    Frame { container: String, number: u32 },
    /// `/<container>/audio.WAV` — the synthetic PCM audio stream.
    Audio { container: String },
    /// `/<container>/preview.GIF` — the supplemented animated preview.
    Preview { container: String },
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Is `name` (a path component, not a full path) a container file this filesystem should
/// expose at the root?
pub fn is_container_name(name: &OsStr) -> bool {
    name.to_str().map(|s| ends_with_ignore_case(s, ".mlv")).unwrap_or(false)
}

/// Parses a FUSE-style absolute path (`/`-separated, starting with `/`) into a synthetic
/// [`Entry`]. Returns `None` for anything the filesystem does not recognize.
pub fn parse(path: &str) -> Option<Entry> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        return Some(Entry::Root);
    }

    let mut parts = path.splitn(2, '/');
    let container = parts.next()?;
    if !ends_with_ignore_case(container, ".mlv") {
        return None;
    }

    match parts.next() {
        None => Some(Entry::Container { container: container.to_string() }),
        Some(rest) if rest.eq_ignore_ascii_case("audio.wav") => Some(Entry::Audio { container: container.to_string() }),
        Some(rest) if rest.eq_ignore_ascii_case("preview.gif") => Some(Entry::Preview { container: container.to_string() }),
        Some(rest) if ends_with_ignore_case(rest, ".dng") => {
            let digits = &rest[..rest.len() - 4];
            digits.parse::<u32>().ok().map(|number| Entry::Frame { container: container.to_string(), number })
        }
        Some(_) => None,
    }
}

/// Joins `Config::mlv_path` with a container's synthetic name to get its real filesystem path.
pub fn container_file_path(mlv_dir: &Path, container: &str) -> std::path::PathBuf {
    mlv_dir.join(container)
}

/// The canonical sequential filename for frame `index` (`Config::NameScheme::Sequential`),
/// matching `main.c`'s `sprintf(temp, "%08d.DNG", i)`.
pub fn sequential_filename(index: usize) -> String {
    format!("{:08}.DNG", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_parses() {
        assert_eq!(parse("/"), Some(Entry::Root));
    }

    #[test]
    fn container_parses_case_insensitively() {
        assert_eq!(parse("/clip.mlv"), Some(Entry::Container { container: "clip.mlv".to_string() }));
        assert_eq!(parse("/CLIP.MLV"), Some(Entry::Container { container: "CLIP.MLV".to_string() }));
    }

    #[test]
    fn frame_parses_digits() {
        assert_eq!(
            parse("/clip.mlv/00000042.DNG"),
            Some(Entry::Frame { container: "clip.mlv".to_string(), number: 42 })
        );
    }

    #[test]
    fn audio_and_preview_parse() {
        assert_eq!(parse("/clip.mlv/audio.WAV"), Some(Entry::Audio { container: "clip.mlv".to_string() }));
        assert_eq!(parse("/clip.mlv/preview.GIF"), Some(Entry::Preview { container: "clip.mlv".to_string() }));
    }

    #[test]
    fn non_mlv_root_entry_is_rejected() {
        assert_eq!(parse("/notes.txt"), None);
    }

    #[test]
    fn malformed_frame_name_is_rejected() {
        assert_eq!(parse("/clip.mlv/not-a-number.DNG"), None);
    }

    #[test]
    fn sequential_filename_is_zero_padded() {
        assert_eq!(sequential_filename(7), "00000007.DNG");
        assert_eq!(sequential_filename(123456789), "123456789.DNG");
    }
}
