// Copyright © 2023 David Caldwell <david@porkrind.org>

// Raw Apple ProFile/Widget hard disk images, as used by IDEFile, ESProfile, Cameo/Aphid and friends.
// The file is nothing but 532 byte records (20 bytes of tags, then 512 bytes of data) in 5:1 interleaved
// order, usually followed by some padding. There is no header, so there is nothing to validate.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::backing::{Backing, Field};
use super::interleave::interleave;
use super::options::{ImageOptions, Mode, Strategy};
use super::{BlockDevice, Geometry, RECORD_SIZE};
use crate::error::{ImageError, Result, Status};

struct Open {
    file: File,
    backing: Backing,
}

impl Open {
    fn flush(&mut self, options: &ImageOptions) -> Result<()> {
        if !options.writable() {
            return Err(ImageError::ReadOnly);
        }
        self.backing.flush(&mut self.file)
    }
}

pub struct ProfileImage {
    path: PathBuf,
    geometry: Geometry,
    options: ImageOptions,
    open: Option<Open>, // None once closed
    last_result: Status,
}

impl ProfileImage {
    /// Opens `path` according to an option string (see [`ImageOptions`]). The emulator uses `"wb"`.
    pub fn open(path: impl AsRef<Path>, options: &str) -> Result<ProfileImage> {
        Self::open_with(path, ImageOptions::parse(options))
    }

    pub fn open_with(path: impl AsRef<Path>, options: ImageOptions) -> Result<ProfileImage> {
        let path = path.as_ref().to_owned();
        let size = std::fs::metadata(&path)
            .map_err(|source| ImageError::Open { path: path.clone(), source })?
            .len();
        let geometry = Geometry::from_size(size);

        if let Some(d) = options.diagnostic() {
            warn!(path = %path.display(), "{}", d);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(options.writable())
            .open(&path)
            .map_err(|source| match options.writable() {
                true  => ImageError::Reopen { path: path.clone(), source },
                false => ImageError::Open { path: path.clone(), source },
            })?;

        // On failure `file` is dropped here, so nothing stays open.
        let backing = Backing::provision(&mut file, options.strategy, options.mode, size)?;

        info!(path = %path.display(), size, blocks = geometry.blocks, mode = %options.mode, strategy = %options.strategy,
              "opened raw profile image");

        let last_result = Status::ok(options.diagnostic().unwrap_or_else(|| "Raw Profile image opened".to_string()));
        Ok(ProfileImage {
            path,
            geometry,
            options,
            open: Some(Open { file, backing }),
            last_result,
        })
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn geometry(&self) -> &Geometry { &self.geometry }
    pub fn options(&self) -> &ImageOptions { &self.options }
    pub fn mode(&self) -> Mode { self.options.mode }
    pub fn sync_on_write(&self) -> bool { self.options.sync_on_write }
    pub fn is_open(&self) -> bool { self.open.is_some() }

    /// The strategy actually in use. `None` once closed.
    pub fn strategy(&self) -> Option<Strategy> {
        self.open.as_ref().map(|o| o.backing.strategy())
    }

    /// Status of the most recent operation, successful or not.
    pub fn last_result(&self) -> &Status {
        &self.last_result
    }

    /// 512 bytes of data for `sector`.
    ///
    /// With the direct strategy the slice points at a scratch record that the next access overwrites; the
    /// borrow on `self` makes holding it across calls impossible.
    pub fn read_sector_data(&mut self, sector: usize) -> Result<&[u8]> {
        self.read_field(sector, Field::Data, "Sector Read")
    }

    /// 20 bytes of tags for `sector`.
    pub fn read_sector_tags(&mut self, sector: usize) -> Result<&[u8]> {
        self.read_field(sector, Field::Tags, "Sector Tags Read")
    }

    pub fn write_sector_data(&mut self, sector: usize, data: &[u8]) -> Result<()> {
        self.write_field(sector, Field::Data, data, "Sector Written")
    }

    pub fn write_sector_tags(&mut self, sector: usize, tags: &[u8]) -> Result<()> {
        self.write_field(sector, Field::Tags, tags, "Sector Tag Written")
    }

    /// Writes anything held in memory back to the file and forces it to stable storage.
    /// Read only and private images refuse.
    pub fn sync(&mut self) -> Result<()> {
        self.track("Image Synced", |img| {
            let open = img.open.as_mut().ok_or(ImageError::Closed)?;
            open.flush(&img.options)
        })
    }

    /// Flushes (best effort), then releases the mapping or buffer and the file. Every later call reports
    /// [`ImageError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.track("Image Closed", |img| {
            let mut open = img.open.take().ok_or(ImageError::Closed)?;
            match open.flush(&img.options) {
                Ok(()) | Err(ImageError::ReadOnly) => {},
                Err(e) => warn!(path = %img.path.display(), "flush before close failed: {}", e),
            }
            drop(open);
            info!(path = %img.path.display(), "closed raw profile image");
            Ok(())
        })
    }

    fn track<T>(&mut self, ok: &str, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self);
        self.last_result = match &result {
            Ok(_)  => Status::ok(ok),
            Err(e) => {
                debug!(path = %self.path.display(), code = e.code(), "{}", e);
                Status::from(e)
            },
        };
        result
    }

    fn read_field(&mut self, sector: usize, field: Field, ok: &str) -> Result<&[u8]> {
        let range = self.track(ok, |img| {
            let open = img.open.as_mut().ok_or(ImageError::Closed)?;
            img.geometry.check(sector)?;
            open.backing.load(&mut open.file, sector, field)
        })?;
        let open = self.open.as_ref().ok_or(ImageError::Closed)?;
        Ok(open.backing.view(range))
    }

    fn write_field(&mut self, sector: usize, field: Field, buf: &[u8], ok: &str) -> Result<()> {
        self.track(ok, |img| {
            let open = img.open.as_mut().ok_or(ImageError::Closed)?;
            if img.options.mode == Mode::ReadOnly {
                return Err(ImageError::ReadOnly);
            }
            img.geometry.check(sector)?;
            if buf.len() != field.len() {
                return Err(ImageError::BadLength { got: buf.len(), expected: field.len() });
            }
            open.backing.store(&mut open.file, sector, field, buf)?;
            if img.options.sync_on_write && img.options.writable() {
                open.flush(&img.options)?;
            }
            Ok(())
        })
    }
}

impl Geometry {
    // A sector can be in range and still land past the end of the file when the image isn't a whole
    // number of 32 sector periods, since interleaving pulls slots forward from later in the period.
    fn check(&self, sector: usize) -> Result<usize> {
        if sector >= self.blocks {
            return Err(ImageError::InvalidSector { sector, blocks: self.blocks });
        }
        let slot = interleave(sector);
        if ((slot + 1) * RECORD_SIZE) as u64 > self.total_size {
            return Err(ImageError::SlotPastEnd { sector, slot, size: self.total_size });
        }
        Ok(slot)
    }
}

impl Drop for ProfileImage {
    fn drop(&mut self) {
        if self.open.is_some() {
            let _ = self.close();
        }
    }
}

impl BlockDevice for ProfileImage {
    fn read_sector(&mut self, sector: usize) -> Result<&[u8]> { self.read_sector_data(sector) }
    fn read_tags(&mut self, sector: usize) -> Result<&[u8]> { self.read_sector_tags(sector) }
    fn write_sector(&mut self, sector: usize, buf: &[u8]) -> Result<()> { self.write_sector_data(sector, buf) }
    fn write_tags(&mut self, sector: usize, buf: &[u8]) -> Result<()> { self.write_sector_tags(sector, buf) }
    fn sync(&mut self) -> Result<()> { ProfileImage::sync(self) }
    fn close(&mut self) -> Result<()> { ProfileImage::close(self) }
    fn sectors(&self) -> usize { self.geometry.blocks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{SECTOR_SIZE, TAG_SIZE};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image(len: usize) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&vec![0u8; len]).unwrap();
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn open_reports_geometry() {
        let temp = image(32 * RECORD_SIZE + 100);
        let img = ProfileImage::open(temp.path(), "rn").unwrap();
        assert_eq!(img.geometry().blocks, 32);
        assert_eq!(img.geometry().total_size, (32 * RECORD_SIZE + 100) as u64);
        assert_eq!(img.geometry().unused_bytes(), 100);
        assert_eq!(img.mode(), Mode::ReadOnly);
        assert_eq!(img.strategy(), Some(Strategy::Direct));
        assert_eq!(img.last_result(), &Status::ok("Raw Profile image opened"));
    }

    #[test]
    fn open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProfileImage::open(dir.path().join("nope.image"), "r").err().unwrap();
        assert!(matches!(err, ImageError::Open { .. }));
        assert_eq!(err.code(), -6);
    }

    #[cfg(unix)]
    #[test]
    fn open_fails_cleanly_when_resources_cant_be_had() {
        // A directory has a size and opens read only, but can't be mapped or opened for writing.
        let dir = tempfile::tempdir().unwrap();
        let err = ProfileImage::open(dir.path(), "rm").err().unwrap();
        assert!(matches!(err, ImageError::Provision(_)));
        assert_eq!(err.code(), -99);
        let err = ProfileImage::open(dir.path(), "wa").err().unwrap();
        assert!(matches!(err, ImageError::Reopen { .. }));
        assert_eq!(err.code(), -86);
    }

    #[test]
    fn unknown_options_dont_stop_the_open() {
        let temp = image(32 * RECORD_SIZE);
        let img = ProfileImage::open(temp.path(), "wqa").unwrap();
        assert_eq!(img.strategy(), Some(Strategy::Buffered));
        assert_eq!(img.last_result().code, 0);
        assert_eq!(img.last_result().message, "q unknown opts");
    }

    #[test]
    fn status_tracks_each_call() {
        let temp = image(32 * RECORD_SIZE);
        let mut img = ProfileImage::open(temp.path(), "wn").unwrap();
        assert!(img.read_sector_data(32).is_err());
        assert_eq!(img.last_result().code, 999);
        img.write_sector_data(0, &[1; SECTOR_SIZE]).unwrap();
        assert_eq!(img.last_result(), &Status::ok("Sector Written"));
        assert!(img.write_sector_tags(0, &[1; 3]).is_err());
        assert_eq!(img.last_result().code, -9);
    }

    #[test]
    fn slot_past_end() {
        // Two records: sector 1 interleaves to slot 5.
        let temp = image(2 * RECORD_SIZE);
        let mut img = ProfileImage::open(temp.path(), "wa").unwrap();
        assert_eq!(img.geometry().blocks, 2);
        assert!(img.read_sector_tags(0).is_ok());
        let err = img.read_sector_data(1).err().unwrap();
        assert!(matches!(err, ImageError::SlotPastEnd { sector: 1, slot: 5, .. }));
    }

    #[test]
    fn direct_private_never_touches_the_file() {
        let temp = image(32 * RECORD_SIZE);
        let mut img = ProfileImage::open(temp.path(), "pn").unwrap();
        img.write_sector_tags(7, &[9; TAG_SIZE]).unwrap();
        assert_eq!(img.read_sector_tags(7).unwrap(), &[9u8; TAG_SIZE][..]);
        assert!(matches!(img.sync(), Err(ImageError::ReadOnly)));
        img.close().unwrap();
        assert!(std::fs::read(temp.path()).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn closed_handle() {
        let temp = image(32 * RECORD_SIZE);
        let mut img = ProfileImage::open(temp.path(), "wb").unwrap();
        img.close().unwrap();
        assert_eq!(img.last_result(), &Status::ok("Image Closed"));
        assert!(!img.is_open());
        assert_eq!(img.strategy(), None);
        assert!(matches!(img.read_sector_data(0), Err(ImageError::Closed)));
        assert!(matches!(img.write_sector_tags(0, &[0; TAG_SIZE]), Err(ImageError::Closed)));
        assert!(matches!(img.sync(), Err(ImageError::Closed)));
        assert!(matches!(img.close(), Err(ImageError::Closed)));
        assert_eq!(img.last_result().code, -3);
    }

    #[test]
    fn sync_on_write_direct() {
        let temp = image(32 * RECORD_SIZE);
        let mut img = ProfileImage::open(temp.path(), "wns").unwrap();
        assert!(img.sync_on_write());
        img.write_sector_data(1, &[0x42; SECTOR_SIZE]).unwrap();
        let on_disk = std::fs::read(temp.path()).unwrap();
        let at = 5 * RECORD_SIZE + TAG_SIZE;
        assert_eq!(&on_disk[at..at + SECTOR_SIZE], &[0x42u8; SECTOR_SIZE][..]);
    }
}
