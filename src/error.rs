//! Error type for frame store operations.
//!
//! Every failure is returned to the immediate caller. The C ABI flattens
//! errors to negative status codes via [`FrameStoreError::status_code`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for frame store operations.
#[derive(Error, Debug)]
pub enum FrameStoreError {
    // === Attachment ===
    /// No shared memory key was supplied, remembered, or found in the environment.
    #[error("no shared memory key available (set {var} or attach with an explicit key)")]
    NoKey { var: String },

    /// Attaching the main arena failed.
    #[error("unable to attach shared memory segment {key}: {source}")]
    Attach {
        key: i32,
        #[source]
        source: io::Error,
    },

    /// Attaching the graphics arena failed.
    #[error("unable to attach graphics shared memory segment {key}: {source}")]
    GraphicsAttach {
        key: i32,
        #[source]
        source: io::Error,
    },

    // === Layout ===
    /// Frame id is negative after resolution or exceeds the frame count.
    #[error("invalid frame number {frame}{}", .count.map(|c| format!(" (frame count {c})")).unwrap_or_default())]
    InvalidFrame { frame: i32, count: Option<i32> },

    /// A read or write would leave the segment.
    #[error("arena access out of bounds: {len} bytes at offset {offset} exceeds segment of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    /// A write reached a segment mapped read-only.
    #[error("segment is read-only: {len} bytes at offset {offset} not written")]
    ReadOnly { offset: usize, len: usize },

    /// The graphics block list cannot be walked.
    #[error("graphics list for frame {frame} is corrupt: {detail}")]
    CorruptGraphics { frame: i32, detail: String },

    // === Frame directory file ===
    /// The path list environment variable is not set.
    #[error("{var} is not set")]
    NoPath { var: String },

    /// Directory files exist only for frames 1 and up.
    #[error("no frame directory for frame {frame}")]
    InvalidDirectoryFrame { frame: i32 },

    /// The directory file could not be opened.
    #[error("unable to open frame directory '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The directory file holds fewer words than required.
    #[error("short read on '{}': expected {expected} words, got {actual}", .path.display())]
    ShortRead { path: PathBuf, expected: usize, actual: usize },

    /// Any other I/O failure while reading the directory file.
    #[error("error reading frame directory '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using [`FrameStoreError`].
pub type Result<T> = std::result::Result<T, FrameStoreError>;

impl FrameStoreError {
    /// Negative status reported across the C ABI.
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::NoKey { .. } => -1,
            Self::Attach { .. } => -2,
            Self::InvalidFrame { .. } => -3,
            Self::GraphicsAttach { .. } => -4,
            Self::CorruptGraphics { .. } => -5,
            Self::OutOfBounds { .. } => -6,
            Self::NoPath { .. } => -7,
            Self::InvalidDirectoryFrame { .. } => -8,
            Self::Open { .. } => -9,
            Self::ShortRead { .. } => -10,
            Self::Read { .. } => -11,
            Self::ReadOnly { .. } => -12,
        }
    }
}
