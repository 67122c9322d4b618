// Copyright © 2023 David Caldwell <david@porkrind.org>

use std::convert::Infallible;
use std::str::FromStr;

use strum::{Display, EnumString, EnumVariantNames};

pub const HAVE_MMAP: bool = cfg!(any(unix, windows));

const MAX_DIAGNOSTIC: usize = 80;
const SUFFIX: &str = " unknown opts";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, EnumVariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Writable,
    ReadOnly,
    Private, // Writes stay in memory and never reach the file.
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, EnumVariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum Strategy {
    Direct,
    Mapped,
    Buffered,
}

/// Parsed form of an option string such as `"wb"` or `"rs"`.
///
/// | char | effect |
/// |------|--------|
/// | `r`  | read only |
/// | `w`  | writable (default) |
/// | `p`  | private: writes kept in memory only |
/// | `m`  | memory mapped if the platform can, else direct |
/// | `n`  | direct positioned I/O, never mapped or buffered |
/// | `a`  | always load the whole file into memory |
/// | `b`  | best available: mapped, else buffered |
/// | `s`  | sync after every write |
///
/// Later characters override earlier ones. Anything else is collected into [`ImageOptions::unknown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageOptions {
    pub mode: Mode,
    pub strategy: Strategy,
    pub sync_on_write: bool,
    pub unknown: String,
}

impl Default for ImageOptions {
    fn default() -> Self {
        ImageOptions {
            mode: Mode::Writable,
            strategy: if HAVE_MMAP { Strategy::Mapped } else { Strategy::Direct },
            sync_on_write: false,
            unknown: String::new(),
        }
    }
}

impl ImageOptions {
    pub fn parse(options: &str) -> ImageOptions {
        let mut o = ImageOptions::default();
        for c in options.chars() {
            match c.to_ascii_lowercase() {
                'r' => o.mode = Mode::ReadOnly,
                'w' => o.mode = Mode::Writable,
                'p' => o.mode = Mode::Private,
                'm' => o.strategy = if HAVE_MMAP { Strategy::Mapped } else { Strategy::Direct },
                'n' => o.strategy = Strategy::Direct,
                'a' => o.strategy = Strategy::Buffered,
                'b' => o.strategy = if HAVE_MMAP { Strategy::Mapped } else { Strategy::Buffered },
                's' => o.sync_on_write = true,
                _ if o.unknown.chars().count() < MAX_DIAGNOSTIC => o.unknown.push(c),
                _ => {},
            }
        }
        o
    }

    pub fn writable(&self) -> bool {
        self.mode == Mode::Writable
    }

    /// Message describing any option characters that were ignored. The suffix is only added while the
    /// whole message still fits in 80 characters.
    pub fn diagnostic(&self) -> Option<String> {
        match self.unknown.chars().count() {
            0 => None,
            n if n < MAX_DIAGNOSTIC - SUFFIX.len() - 1 => Some(format!("{}{}", self.unknown, SUFFIX)),
            _ => Some(self.unknown.clone()),
        }
    }
}

impl FromStr for ImageOptions {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ImageOptions::parse(s))
    }
}
