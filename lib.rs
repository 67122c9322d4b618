// Copyright © 2023 David Caldwell <david@porkrind.org>

//! Sector level access to raw Apple ProFile/Widget hard disk images.
//!
//! An image is a file of 532 byte records (20 bytes of tags followed by 512 bytes of data) stored in the
//! drive's 5:1 interleaved order. [`ProfileImage`] hides the interleave and lets callers pick how the file
//! is reached: positioned reads and writes, a memory mapping, or a full copy in RAM.
//!
//! ```rust,no_run
//! use profimg::ProfileImage;
//!
//! let mut image = ProfileImage::open("profile.image", "wb")?;
//! let boot = image.read_sector_data(0)?.to_vec();
//! image.write_sector_data(1, &boot)?;
//! image.close()?;
//! # Ok::<(), profimg::ImageError>(())
//! ```

pub mod block;
pub mod error;

pub use block::options::{ImageOptions, Mode, Strategy};
pub use block::profile::ProfileImage;
pub use block::{BlockDevice, Geometry, RECORD_SIZE, SECTOR_SIZE, TAG_SIZE};
pub use error::{ImageError, Result, Status};
