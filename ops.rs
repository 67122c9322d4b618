// Copyright © 2023 David Caldwell <david@porkrind.org>

// Various operations we can do on raw profile images

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{anyhow, Context};
use pretty_hex::PrettyHex;
use profimg::{BlockDevice, ProfileImage, RECORD_SIZE, SECTOR_SIZE};

pub fn info(image: &ProfileImage) {
    let g = image.geometry();
    println!("Image    {}", image.path().to_string_lossy());
    println!("Size     {} bytes ({} unused)", g.total_size, g.unused_bytes());
    println!("Sectors  {} ({} data bytes, {} tag bytes)", g.blocks, g.data_size_total(), g.tag_size_total());
    println!("Mode     {}{}", image.mode(), if image.sync_on_write() { ", sync on write" } else { "" });
    if let Some(strategy) = image.strategy() {
        println!("Strategy {}", strategy);
    }
}

pub fn dump(image: &mut impl BlockDevice, sector: Option<usize>, tags: bool) -> anyhow::Result<()> {
    let range = match sector {
        Some(s) => s..s+1,
        None => 0..image.sectors(),
    };
    for s in range {
        if tags {
            println!("Sector {} tags\n{:?}", s, image.read_tags(s)?.hex_dump());
        }
        println!("Sector {}\n{:?}", s, image.read_sector(s)?.hex_dump());
    }
    Ok(())
}

pub fn extract(image: &mut impl BlockDevice, dest: &Path) -> anyhow::Result<()> {
    let count = image.sectors();
    let data = image.read_blocks(0, count)?;
    std::fs::write(dest, data.as_bytes()).with_context(|| format!("{}", dest.to_string_lossy()))?;
    println!("Extracted {} sectors ({} bytes) to {}", count, count * SECTOR_SIZE, dest.to_string_lossy());
    Ok(())
}

pub fn import(image: &mut impl BlockDevice, src: &Path) -> anyhow::Result<()> {
    let buf = std::fs::read(src).with_context(|| format!("{}", src.to_string_lossy()))?;
    let needed = (buf.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
    if needed > image.sectors() {
        return Err(anyhow!("{} needs {} sectors but the image only has {}", src.to_string_lossy(), needed, image.sectors()));
    }
    for (s, chunk) in buf.chunks(SECTOR_SIZE).enumerate() {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[..chunk.len()].copy_from_slice(chunk);
        image.write_sector(s, &sector).with_context(|| format!("sector {}", s))?;
    }
    image.sync()?;
    println!("Imported {} bytes into {} sectors", buf.len(), needed);
    Ok(())
}

pub fn create(path: &Path, sectors: usize) -> anyhow::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)
        .with_context(|| format!("{}", path.to_string_lossy()))?;
    file.set_len((sectors * RECORD_SIZE) as u64)?;
    file.sync_all()?;
    Ok(())
}
