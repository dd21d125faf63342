// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mlvfs` binary: `clap` argument parsing into `mlvfs::Config`,
//! `pretty_env_logger` initialization, and a `fuser::Filesystem` binding that forwards kernel
//! requests to the `mlvfs::Mount` facade.
//!
//! Ported from `original_source/mlvfs/main.c`'s `main`/`mlvfs_opts`/the `fuse_operations` table.
//! The source parses its own `-o` option string by hand; `clap`'s derive API replaces that
//! entirely, and FUSE dispatch itself is `fuser`'s job rather than libfuse's.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use clap::{Parser, ValueEnum};
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, Request,
};
use libc::{EINVAL, EIO, ENOENT};
use log::{info, warn};

use mlvfs::config::{Config, NameScheme};
use mlvfs::path::Entry;
use mlvfs::Mount;
use mlvfs_core::error::MlvError;
use mlvfs_image::pipeline::{BadPixelMode, ChromaSmoothMode};

/// A short TTL on every reply: the mount is read-only and its synthetic contents only change
/// when the underlying `.MLV` files do, so the kernel does not need to revalidate often, but a
/// nonzero TTL keeps a stale directory listing from surviving a container being replaced.
const ATTR_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliBadPixelMode {
    Off,
    On,
    Aggressive,
}

impl From<CliBadPixelMode> for BadPixelMode {
    fn from(v: CliBadPixelMode) -> Self {
        match v {
            CliBadPixelMode::Off => BadPixelMode::Off,
            CliBadPixelMode::On => BadPixelMode::On,
            CliBadPixelMode::Aggressive => BadPixelMode::Aggressive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliChromaSmoothMode {
    Off,
    #[value(name = "2x2")]
    Method2,
    #[value(name = "3x3")]
    Method3,
    #[value(name = "5x5")]
    Method5,
}

impl From<CliChromaSmoothMode> for ChromaSmoothMode {
    fn from(v: CliChromaSmoothMode) -> Self {
        match v {
            CliChromaSmoothMode::Off => ChromaSmoothMode::Off,
            CliChromaSmoothMode::Method2 => ChromaSmoothMode::Method2,
            CliChromaSmoothMode::Method3 => ChromaSmoothMode::Method3,
            CliChromaSmoothMode::Method5 => ChromaSmoothMode::Method5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliNameScheme {
    Sequential,
    VidfFrameNumber,
}

impl From<CliNameScheme> for NameScheme {
    fn from(v: CliNameScheme) -> Self {
        match v {
            CliNameScheme::Sequential => NameScheme::Sequential,
            CliNameScheme::VidfFrameNumber => NameScheme::VidfFrameNumber,
        }
    }
}

/// Mounts a directory of Magic Lantern raw video (`.MLV`) files as a read-only tree of
/// per-frame DNG stills, a synthetic `audio.WAV`, and a `preview.GIF` per container.
#[derive(Debug, Parser)]
#[command(name = "mlvfs", version, about)]
struct Args {
    /// Directory containing the `.MLV` containers to expose.
    mlv_path: PathBuf,

    /// Where to mount the synthetic filesystem.
    mountpoint: PathBuf,

    /// Bad-pixel repair strength.
    #[arg(long, value_enum, default_value = "off")]
    badpix: CliBadPixelMode,

    /// Chroma smoothing kernel radius.
    #[arg(long, value_enum, default_value = "off")]
    chroma_smooth: CliChromaSmoothMode,

    /// Correct fixed-pattern vertical stripes before emitting each frame.
    #[arg(long)]
    fix_stripes: bool,

    /// Reconstruct full dynamic range from dual-ISO recordings.
    #[arg(long)]
    dual_iso: bool,

    /// Overrides the container's own frame rate as `NUM/DEN` (e.g. `24000/1001`); affects the
    /// `FrameRate` DNG tag and the synthetic `audio.WAV` size.
    #[arg(long, value_parser = parse_fps)]
    fps: Option<(u32, u32)>,

    /// How per-frame `.DNG` filenames are generated.
    #[arg(long, value_enum, default_value = "sequential")]
    name_scheme: CliNameScheme,

    /// Normalize each frame's median exposure toward a fixed target.
    #[arg(long)]
    deflicker: bool,

    /// Stay attached to the terminal instead of forking into the background.
    #[arg(long)]
    foreground: bool,
}

fn parse_fps(s: &str) -> Result<(u32, u32), String> {
    let (num, den) = s.split_once('/').ok_or_else(|| "expected NUM/DEN".to_string())?;
    let num: u32 = num.parse().map_err(|_| "invalid numerator".to_string())?;
    let den: u32 = den.parse().map_err(|_| "invalid denominator".to_string())?;
    Ok((num, den))
}

fn config_from_args(args: &Args) -> Config {
    Config {
        mlv_path: args.mlv_path.clone(),
        badpix: args.badpix.into(),
        chroma_smooth: args.chroma_smooth.into(),
        fix_stripes: args.fix_stripes,
        dual_iso: args.dual_iso,
        fps_override: args.fps,
        name_scheme: args.name_scheme.into(),
        deflicker: args.deflicker,
    }
}

/// Maps a facade error to the `errno` FUSE expects in a reply.
fn errno_for(err: &MlvError) -> i32 {
    match err {
        MlvError::NotFound => ENOENT,
        MlvError::UnsupportedParameters(_) => EINVAL,
        MlvError::CorruptContainer(_) | MlvError::OutOfMemory | MlvError::IoError(_) => EIO,
    }
}

/// Bidirectional inode <-> synthetic-path table. Inode 1 is always the mount root; every other
/// path is assigned an inode the first time it is looked up or listed.
#[derive(Default)]
struct Inodes {
    next: u64,
    path_to_ino: HashMap<String, u64>,
    ino_to_path: HashMap<u64, String>,
}

const ROOT_INO: u64 = 1;

impl Inodes {
    fn new() -> Self {
        let mut inodes = Inodes { next: 2, path_to_ino: HashMap::new(), ino_to_path: HashMap::new() };
        inodes.path_to_ino.insert("/".to_string(), ROOT_INO);
        inodes.ino_to_path.insert(ROOT_INO, "/".to_string());
        inodes
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.path_to_ino.insert(path.to_string(), ino);
        self.ino_to_path.insert(ino, path.to_string());
        ino
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.ino_to_path.get(&ino).cloned()
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

struct MlvfsFuse {
    mount: Arc<Mount>,
    inodes: Mutex<Inodes>,
}

impl MlvfsFuse {
    fn new(mount: Arc<Mount>) -> Self {
        MlvfsFuse { mount, inodes: Mutex::new(Inodes::new()) }
    }

    fn attr_for(&self, ino: u64, path: &str) -> Result<FileAttr, i32> {
        let now = SystemTime::now();
        let entry = mlvfs::path::parse(path).ok_or(ENOENT)?;
        match entry {
            Entry::Root | Entry::Container { .. } => Ok(directory_attr(ino, now)),
            _ => {
                let attr = self.mount.getattr(path).map_err(|e| errno_for(&e))?;
                Ok(file_attr(ino, attr.size, attr.mtime))
            }
        }
    }
}

fn directory_attr(ino: u64, now: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: 0o555,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

fn file_attr(ino: u64, size: u64, mtime: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size,
        blocks: (size + 511) / 512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: FileType::RegularFile,
        perm: 0o444,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

impl Filesystem for MlvfsFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        let parent_path = {
            let inodes = self.inodes.lock().expect("inode table poisoned");
            match inodes.path_for(parent) {
                Some(p) => p,
                None => {
                    reply.error(ENOENT);
                    return;
                }
            }
        };
        let child_path = join_path(&parent_path, name);

        let ino = self.inodes.lock().expect("inode table poisoned").ino_for(&child_path);
        match self.attr_for(ino, &child_path) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = match self.inodes.lock().expect("inode table poisoned").path_for(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        match self.attr_for(ino, &path) {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.inodes.lock().expect("inode table poisoned").path_for(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };
        let offset = offset.max(0) as u64;
        match self.mount.read(&path, offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                warn!("read {} at {}: {}", path, offset, e);
                reply.error(errno_for(&e));
            }
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = match self.inodes.lock().expect("inode table poisoned").path_for(ino) {
            Some(p) => p,
            None => {
                reply.error(ENOENT);
                return;
            }
        };

        let (parent_kind, names) = match mlvfs::path::parse(&path) {
            Some(mlvfs::path::Entry::Root) => match self.mount.list_root() {
                Ok(names) => (FileType::Directory, names),
                Err(e) => {
                    reply.error(errno_for(&e));
                    return;
                }
            },
            Some(mlvfs::path::Entry::Container { container }) => match self.mount.list_container(&container) {
                Ok(names) => (FileType::RegularFile, names),
                Err(e) => {
                    reply.error(errno_for(&e));
                    return;
                }
            },
            _ => {
                reply.error(ENOENT);
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![(ino, FileType::Directory, ".".to_string())];
        entries.push((1, FileType::Directory, "..".to_string()));
        for name in names {
            let child_path = join_path(&path, &name);
            let child_ino = self.inodes.lock().expect("inode table poisoned").ino_for(&child_path);
            entries.push((child_ino, parent_kind, name));
        }

        for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: fuser::ReplyEmpty) {
        reply.ok();
    }
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();
    let config = config_from_args(&args);

    info!(
        "mounting {} at {} (badpix={:?} chroma_smooth={:?} dual_iso={} fix_stripes={})",
        config.mlv_path.display(),
        args.mountpoint.display(),
        config.badpix,
        config.chroma_smooth,
        config.dual_iso,
        config.fix_stripes
    );

    let mount = Arc::new(Mount::new(config));
    let fs = MlvfsFuse::new(mount);

    let mut options = vec![MountOption::RO, MountOption::FSName("mlvfs".to_string())];
    if !args.foreground {
        options.push(MountOption::AutoUnmount);
    }

    if let Err(e) = fuser::mount2(fs, &args.mountpoint, &options) {
        eprintln!("mlvfs: failed to mount {}: {}", args.mountpoint.display(), e);
        std::process::exit(1);
    }
}
