// MLVFS
// Copyright (c) 2024 The MLVFS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the common error type shared by every MLVFS crate.

use std::fmt;
use std::io;

/// `MlvError` enumerates every way container indexing, frame-header resolution, image
/// synthesis, or the correction pipeline can fail.
#[derive(Debug)]
pub enum MlvError {
    /// The requested synthetic path has no corresponding container or frame.
    NotFound,
    /// The container was malformed: a block's declared size was out of bounds, the chunk's
    /// GUID did not match the container's, or a block was truncated mid-read.
    CorruptContainer(&'static str),
    /// A pipeline step was asked to operate on parameters it does not support (an overlarge
    /// black level, a frame width that isn't a multiple of 8, an unknown chroma-smooth radius).
    /// The step is skipped rather than failing the whole frame.
    UnsupportedParameters(&'static str),
    /// Allocation of a scratch or output buffer failed.
    OutOfMemory,
    /// A read from, or seek within, a chunk file failed.
    IoError(io::Error),
}

impl fmt::Display for MlvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlvError::NotFound => write!(f, "no such container or frame"),
            MlvError::CorruptContainer(msg) => write!(f, "corrupt container: {}", msg),
            MlvError::UnsupportedParameters(msg) => write!(f, "unsupported parameters: {}", msg),
            MlvError::OutOfMemory => write!(f, "out of memory"),
            MlvError::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for MlvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MlvError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MlvError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => MlvError::CorruptContainer("unexpected end of chunk"),
            _ => MlvError::IoError(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, MlvError>;

/// Convenience function to create a not-found error.
pub fn not_found_error<T>() -> Result<T> {
    Err(MlvError::NotFound)
}

/// Convenience function to create a corrupt-container error.
pub fn corrupt_error<T>(desc: &'static str) -> Result<T> {
    Err(MlvError::CorruptContainer(desc))
}

/// Convenience function to create an unsupported-parameters error.
pub fn unsupported_error<T>(desc: &'static str) -> Result<T> {
    Err(MlvError::UnsupportedParameters(desc))
}

/// Convenience function to create an out-of-memory error.
pub fn oom_error<T>() -> Result<T> {
    Err(MlvError::OutOfMemory)
}
