// Copyright © 2023 David Caldwell <david@porkrind.org>

mod ops;

use std::path::PathBuf;

use docopt::Docopt;
use profimg::{ImageOptions, ProfileImage, Strategy};
use serde::Deserialize;
use strum::VariantNames;
use tracing_subscriber::EnvFilter;

fn usage() -> String {
    format!(r#"
Usage:
  profimg -h
  profimg [-h] -i <image> [-o <opts>] info
  profimg [-h] -i <image> [-o <opts>] dump [--tags] [<sector>]
  profimg [-h] -i <image> [-o <opts>] extract <dest-file>
  profimg [-h] -i <image> [-o <opts>] import <source-file>
  profimg [-h] -i <image> create <sectors>

Options:
  -h --help              Show this screen.
  -i --image <image>     Use <image> as the raw ProFile/Widget disk image.
  -o --options <opts>    How to open the image [default: rb]. One or more of:
                           r  read only           w  read/write
                           p  private (writes are kept in memory and never saved)
                           m  memory mapped       n  direct file I/O
                           a  whole image in RAM  b  best available
                           s  sync to disk after every write
                         Strategies: {}

 info:
   Prints the image geometry and how it was opened.

 dump:
   -t --tags             Dump each sector's tags too.

   Dumps the image in logical sector order (de-interleaved).

   If <sector> is specified, dumps only that sector.

 extract:
   Writes the data of every sector, in logical order, to <dest-file> on the
   local machine. Tags are not included.

 import:
   Writes <source-file> from the local machine into the image starting at
   sector 0. The last sector is padded with zeros. Open with `-o w...`.

 create:
   Creates a new zeroed image with room for <sectors> sectors. The <image>
   file specified by `-i` must _not_ already exist.
"#,
    Strategy::VARIANTS.join(", "))
}

#[derive(Debug, Deserialize)]
struct Args {
    flag_image:       PathBuf,
    flag_options:     String,
    flag_tags:        bool,
    cmd_info:         bool,
    cmd_dump:         bool,
    cmd_extract:      bool,
    cmd_import:       bool,
    cmd_create:       bool,
    arg_sector:       Option<usize>,
    arg_sectors:      Option<usize>,
    arg_source_file:  PathBuf,
    arg_dest_file:    PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args = Docopt::new(usage())
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    // Do this very early since opening dies if the image file doesn't exist
    if args.cmd_create {
        return ops::create(&args.flag_image, args.arg_sectors.unwrap_or(0));
    }

    let mut image = ProfileImage::open_with(&args.flag_image, ImageOptions::parse(&args.flag_options))?;

    if args.cmd_info {
        ops::info(&image);
    }

    if args.cmd_dump {
        ops::dump(&mut image, args.arg_sector, args.flag_tags)?;
    }

    if args.cmd_extract {
        ops::extract(&mut image, &args.arg_dest_file)?;
    }

    if args.cmd_import {
        ops::import(&mut image, &args.arg_source_file)?;
    }

    image.close()?;
    Ok(())
}
