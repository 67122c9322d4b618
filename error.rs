// Copyright © 2023 David Caldwell <david@porkrind.org>

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Disk image closed or no memory allocated to it")]
    Closed,

    #[error("Cannot open the file {}: {source}", .path.display())]
    Open { path: PathBuf, source: std::io::Error },

    #[error("Cannot re-open file {} for writing: {source}", .path.display())]
    Reopen { path: PathBuf, source: std::io::Error },

    #[error("Image is Read Only")]
    ReadOnly,

    #[error("invalid sector # {sector} (image has {blocks} sectors)")]
    InvalidSector { sector: usize, blocks: usize },

    #[error("sector {sector} lives in slot {slot}, past the end of a {size} byte image")]
    SlotPastEnd { sector: usize, slot: usize, size: u64 },

    #[error("Buffer is {got} bytes, expected {expected}")]
    BadLength { got: usize, expected: usize },

    #[error("Could not mmap the file or allocate memory: {0}")]
    Provision(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageError {
    /// Numeric status code, compatible with the codes the emulator's disk layer expects.
    pub fn code(&self) -> i32 {
        match self {
            ImageError::Closed              => -3,
            ImageError::Open { .. }         => -6,
            ImageError::ReadOnly            => -8,
            ImageError::BadLength { .. }    => -9,
            ImageError::Io(_)               => -10,
            ImageError::Reopen { .. }       => -86,
            ImageError::Provision(_)        => -99,
            ImageError::SlotPastEnd { .. }  => 998,
            ImageError::InvalidSector { .. } => 999,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Outcome of the most recent operation on an image handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn ok(message: impl Into<String>) -> Status {
        Status { code: 0, message: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

impl From<&ImageError> for Status {
    fn from(e: &ImageError) -> Status {
        Status { code: e.code(), message: e.to_string() }
    }
}
