// Copyright © 2023 David Caldwell <david@porkrind.org>

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, trace};

use super::interleave::{data_pos, tag_pos};
use super::options::{Mode, Strategy};
use super::{RECORD_SIZE, SECTOR_SIZE, TAG_SIZE};
use crate::error::{ImageError, Result};

/// Which half of an on-disk record an access is aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Tags,
    Data,
}

impl Field {
    pub fn len(self) -> usize {
        match self {
            Field::Tags => TAG_SIZE,
            Field::Data => SECTOR_SIZE,
        }
    }

    /// Byte offset of this field of `sector` in the image file.
    pub fn pos(self, sector: usize) -> usize {
        match self {
            Field::Tags => tag_pos(sector),
            Field::Data => data_pos(sector),
        }
    }

    // Offset of the field inside its record (tags first, then data).
    fn in_record(self) -> usize {
        match self {
            Field::Tags => 0,
            Field::Data => TAG_SIZE,
        }
    }

    // Where the direct backend parks the field in its scratch record: data first, then tags.
    fn in_scratch(self) -> Range<usize> {
        match self {
            Field::Data => 0..SECTOR_SIZE,
            Field::Tags => SECTOR_SIZE..RECORD_SIZE,
        }
    }
}

pub struct Direct {
    scratch: [u8; RECORD_SIZE],
    // Private mode only: records written since open, keyed by their file offset, in on-disk layout.
    overlay: Option<HashMap<usize, Box<[u8; RECORD_SIZE]>>>,
}

/// The memory behind sector access. Exactly one shape is live per open image.
pub enum Backing {
    Direct(Direct),
    Mapped(MmapMut),
    Buffered(Vec<u8>),
}

impl Backing {
    pub fn provision(file: &mut File, strategy: Strategy, mode: Mode, size: u64) -> Result<Backing> {
        Ok(match strategy {
            Strategy::Direct => Backing::Direct(Direct {
                scratch: [0; RECORD_SIZE],
                overlay: (mode == Mode::Private).then(HashMap::new),
            }),
            Strategy::Mapped => Backing::Mapped(match mode {
                // SAFETY: the image file is exclusively ours for the lifetime of the handle. Outside
                // modification of a mapped image is as undefined here as it is for the emulator.
                Mode::Writable => unsafe { MmapOptions::new().map_mut(&*file) },
                Mode::ReadOnly | Mode::Private => unsafe { MmapOptions::new().map_copy(&*file) },
            }.map_err(ImageError::Provision)?),
            Strategy::Buffered => {
                let len = usize::try_from(size).map_err(|e| ImageError::Provision(std::io::Error::new(std::io::ErrorKind::OutOfMemory, e)))?;
                let mut ram = vec![];
                ram.try_reserve_exact(len).map_err(|e| ImageError::Provision(std::io::Error::new(std::io::ErrorKind::OutOfMemory, e)))?;
                ram.resize(len, 0);
                file.seek(SeekFrom::Start(0)).map_err(ImageError::Provision)?;
                file.read_exact(&mut ram).map_err(ImageError::Provision)?;
                Backing::Buffered(ram)
            },
        })
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Backing::Direct(_)   => Strategy::Direct,
            Backing::Mapped(_)   => Strategy::Mapped,
            Backing::Buffered(_) => Strategy::Buffered,
        }
    }

    /// Makes `field` of `sector` available and returns where to find it in [`Backing::view`].
    /// The caller has already checked that the whole record lies inside the image.
    pub fn load(&mut self, file: &mut File, sector: usize, field: Field) -> Result<Range<usize>> {
        let pos = field.pos(sector);
        match self {
            Backing::Direct(d) => {
                let range = field.in_scratch();
                match d.overlay.as_ref().and_then(|o| o.get(&(pos - field.in_record()))) {
                    Some(record) => {
                        let at = field.in_record();
                        d.scratch[range.clone()].copy_from_slice(&record[at..at + field.len()]);
                    },
                    None => {
                        file.seek(SeekFrom::Start(pos as u64))?;
                        file.read_exact(&mut d.scratch[range.clone()])?;
                    },
                }
                trace!(sector, ?field, pos, "direct read");
                Ok(range)
            },
            Backing::Mapped(_) | Backing::Buffered(_) => Ok(pos..pos + field.len()),
        }
    }

    pub fn view(&self, range: Range<usize>) -> &[u8] {
        match self {
            Backing::Direct(d)     => &d.scratch[range],
            Backing::Mapped(m)     => &m[range],
            Backing::Buffered(ram) => &ram[range],
        }
    }

    pub fn store(&mut self, file: &mut File, sector: usize, field: Field, buf: &[u8]) -> Result<()> {
        let pos = field.pos(sector);
        match self {
            Backing::Direct(Direct { overlay: Some(overlay), .. }) => {
                let start = pos - field.in_record();
                let record = match overlay.entry(start) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        let mut record = Box::new([0; RECORD_SIZE]);
                        file.seek(SeekFrom::Start(start as u64))?;
                        file.read_exact(&mut record[..])?;
                        e.insert(record)
                    },
                };
                let at = field.in_record();
                record[at..at + field.len()].copy_from_slice(buf);
            },
            Backing::Direct(_) => {
                file.seek(SeekFrom::Start(pos as u64))?;
                file.write_all(buf)?;
            },
            Backing::Mapped(m)     => m[pos..pos + buf.len()].copy_from_slice(buf),
            Backing::Buffered(ram) => ram[pos..pos + buf.len()].copy_from_slice(buf),
        }
        trace!(sector, ?field, pos, "write");
        Ok(())
    }

    /// Pushes everything held in memory back to the file and makes it durable.
    pub fn flush(&mut self, file: &mut File) -> Result<()> {
        match self {
            Backing::Direct(_) => {}, // Every write already went straight to the file.
            Backing::Mapped(m) => m.flush()?,
            Backing::Buffered(ram) => {
                file.seek(SeekFrom::Start(0))?;
                file.write_all(ram)?;
            },
        }
        file.sync_all()?;
        debug!(strategy = %self.strategy(), "flushed image to disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn image(records: usize) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        let mut bytes = vec![0u8; records * RECORD_SIZE];
        for (slot, record) in bytes.chunks_mut(RECORD_SIZE).enumerate() {
            record.fill(slot as u8);
        }
        temp.write_all(&bytes).unwrap();
        temp
    }

    #[test]
    fn field_offsets() {
        assert_eq!(Field::Tags.pos(1), 5 * RECORD_SIZE);
        assert_eq!(Field::Data.pos(1), 5 * RECORD_SIZE + TAG_SIZE);
        assert_eq!(Field::Data.len(), 512);
        assert_eq!(Field::Tags.len(), 20);
    }

    #[test]
    fn every_strategy_reads_the_interleaved_slot() {
        let temp = image(32);
        for strategy in [Strategy::Direct, Strategy::Mapped, Strategy::Buffered] {
            let mut file = temp.reopen().unwrap();
            let mut b = Backing::provision(&mut file, strategy, Mode::ReadOnly, (32 * RECORD_SIZE) as u64).unwrap();
            assert_eq!(b.strategy(), strategy);
            let r = b.load(&mut file, 2, Field::Data).unwrap();
            assert_eq!(b.view(r), &[10u8; SECTOR_SIZE][..]);
            let r = b.load(&mut file, 13, Field::Tags).unwrap();
            assert_eq!(b.view(r), &[1u8; TAG_SIZE][..]);
        }
    }

    #[test]
    fn direct_scratch_keeps_data_and_tags_apart() {
        let temp = image(32);
        let mut file = temp.reopen().unwrap();
        let mut b = Backing::provision(&mut file, Strategy::Direct, Mode::ReadOnly, 0).unwrap();
        let data = b.load(&mut file, 1, Field::Data).unwrap();
        let tags = b.load(&mut file, 2, Field::Tags).unwrap();
        assert_eq!(b.view(data), &[5u8; SECTOR_SIZE][..]);
        assert_eq!(b.view(tags), &[10u8; TAG_SIZE][..]);
    }

    #[test]
    fn private_direct_writes_stay_in_the_overlay() {
        let temp = image(32);
        let mut file = temp.reopen().unwrap();
        let mut b = Backing::provision(&mut file, Strategy::Direct, Mode::Private, 0).unwrap();
        b.store(&mut file, 3, Field::Data, &[0xaa; SECTOR_SIZE]).unwrap();
        let r = b.load(&mut file, 3, Field::Data).unwrap();
        assert_eq!(b.view(r), &[0xaau8; SECTOR_SIZE][..]);
        // The tags of the same record come from the overlay too, untouched.
        let r = b.load(&mut file, 3, Field::Tags).unwrap();
        assert_eq!(b.view(r), &[15u8; TAG_SIZE][..]);

        let on_disk = std::fs::read(temp.path()).unwrap();
        assert!(on_disk[15 * RECORD_SIZE..16 * RECORD_SIZE].iter().all(|b| *b == 15));
    }

    #[test]
    fn buffered_flush_rewrites_the_file() {
        let temp = image(32);
        let mut file = temp.reopen().unwrap();
        let mut b = Backing::provision(&mut file, Strategy::Buffered, Mode::Writable, (32 * RECORD_SIZE) as u64).unwrap();
        b.store(&mut file, 0, Field::Tags, &[0x55; TAG_SIZE]).unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap()[0], 0);
        b.flush(&mut file).unwrap();
        assert_eq!(&std::fs::read(temp.path()).unwrap()[..TAG_SIZE], &[0x55u8; TAG_SIZE][..]);
    }
}
