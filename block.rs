// Copyright © 2023 David Caldwell <david@porkrind.org>

pub mod interleave;
pub mod options;

// Storage backends
pub mod backing;
pub mod profile;

use bytebuffer::ByteBuffer;

use crate::error::Result;

pub const SECTOR_SIZE: usize = 512;
pub const TAG_SIZE: usize = 20; // Lisa filesystem metadata that rides along with every sector.
pub const RECORD_SIZE: usize = SECTOR_SIZE + TAG_SIZE; // Tags come first in each on-disk record, then data.

/// What the disk controller sees: a flat run of logical sectors, each with its tags.
pub trait BlockDevice {
    fn read_sector(&mut self, sector: usize) -> Result<&[u8]>;
    fn read_tags(&mut self, sector: usize) -> Result<&[u8]>;
    fn write_sector(&mut self, sector: usize, buf: &[u8]) -> Result<()>;
    fn write_tags(&mut self, sector: usize, buf: &[u8]) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn sectors(&self) -> usize;

    fn read_blocks(&mut self, block: usize, count: usize) -> anyhow::Result<ByteBuffer> {
        let mut buf = ByteBuffer::new();
        for s in block..block+count {
            buf.write_bytes(self.read_sector(s)?);
        }
        buf.set_rpos(0);
        Ok(buf)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub total_size: u64,
    pub blocks: usize,
}

impl Geometry {
    pub fn from_size(total_size: u64) -> Geometry {
        // Images are usually padded out past the last record. The padding is never addressed.
        Geometry { total_size, blocks: (total_size / RECORD_SIZE as u64) as usize }
    }

    pub fn sector_size(&self) -> usize { SECTOR_SIZE }
    pub fn tag_size(&self) -> usize { TAG_SIZE }
    pub fn data_size_total(&self) -> usize { self.blocks * SECTOR_SIZE }
    pub fn tag_size_total(&self) -> usize { self.blocks * TAG_SIZE }
    pub fn unused_bytes(&self) -> u64 { self.total_size - (self.blocks * RECORD_SIZE) as u64 }
}
