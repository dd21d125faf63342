// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mlvfs::Config` option surface: the single place every tunable configuration option
//! lives. `mlvfs-fs` populates this from `clap` argument parsing; nothing here persists to disk.

use std::path::PathBuf;

use mlvfs_image::pipeline::{BadPixelMode, ChromaSmoothMode};

/// How a container's per-frame `.DNG` filenames are generated (a supplemented feature:
/// `original_source/mlvfs/main.c`'s `mlvfs_readdir` always uses scheme 0, but its
/// sibling `mlvfs_read`/`get_mlv_frame_number` path resolves by matching a `VIDF`'s own
/// embedded `frameNumber` field, which only agrees with scheme 0 when no frames were dropped
/// during recording — scheme 1 exposes that alternative explicitly instead of silently
/// assuming the two always coincide).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameScheme {
    /// Zero-padded sequential numbering (`00000000.DNG`, `00000001.DNG`, ...) over the index
    /// order the container's cross-reference table yields.
    #[default]
    Sequential,
    /// Mirrors the `VIDF` block's own `frame_number` field, which can have gaps if the camera
    /// dropped frames mid-recording.
    VidfFrameNumber,
}

/// The full set of options a `mlvfs` mount can be configured with.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the `.MLV` containers to expose.
    pub mlv_path: PathBuf,
    pub badpix: BadPixelMode,
    pub chroma_smooth: ChromaSmoothMode,
    pub fix_stripes: bool,
    pub dual_iso: bool,
    /// Overrides the container's own frame rate when set (affects the `FrameRate` DNG tag and
    /// the audio-size computation); `None` uses the container's `MLVI` fps fields as-is.
    pub fps_override: Option<(u32, u32)>,
    pub name_scheme: NameScheme,
    /// Per-frame EV-space median normalization toward a fixed target.
    pub deflicker: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mlv_path: PathBuf::from("."),
            badpix: BadPixelMode::default(),
            chroma_smooth: ChromaSmoothMode::default(),
            fix_stripes: false,
            dual_iso: false,
            fps_override: None,
            name_scheme: NameScheme::default(),
            deflicker: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_every_pass_off() {
        let config = Config::default();
        assert_eq!(config.badpix, BadPixelMode::Off);
        assert_eq!(config.chroma_smooth, ChromaSmoothMode::Off);
        assert!(!config.fix_stripes);
        assert!(!config.dual_iso);
        assert!(!config.deflicker);
        assert_eq!(config.name_scheme, NameScheme::Sequential);
    }
}
