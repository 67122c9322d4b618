// Copyright © 2023 David Caldwell <david@porkrind.org>

// The ProFile's controller laid sectors out 5:1 so that the Lisa had time to digest one sector before the
// next one came around under the head. Raw images keep that physical order, so logical sector n lives in
// record slot interleave(n) of the file.

use super::{RECORD_SIZE, TAG_SIZE};

/// The pattern repeats every 32 sectors.
pub const PERIOD: usize = 32;

#[cfg(test)]
const SLOT: [usize; PERIOD] = [ 0,  5, 10, 15,  4,  9, 14,  3,  8, 13,  2,  7, 12,  1,  6, 11,
                               16, 21, 26, 31, 20, 25, 30, 19, 24, 29, 18, 23, 28, 17, 22, 27];

const SECTOR: [usize; PERIOD] = [ 0, 13, 10,  7,  4,  1, 14, 11,  8,  5,  2, 15, 12,  9,  6,  3,
                                 16, 29, 26, 23, 20, 17, 30, 27, 24, 21, 18, 31, 28, 25, 22, 19];

// Both halves of a period use the same shuffle, so 16 deltas are enough.
const DELTA: [isize; 16] = [0, 4, 8, 12, 0, 4, 8, -4, 0, 4, -8, -4, 0, -12, -8, -4];

/// Logical sector -> physical slot.
pub fn interleave(sector: usize) -> usize {
    sector.wrapping_add_signed(DELTA[sector & 15])
}

// Same mapping as `interleave`, straight from the 32 entry table. Kept to check the delta table against.
#[cfg(test)]
fn interleave_by_table(sector: usize) -> usize {
    sector - sector % PERIOD + SLOT[sector % PERIOD]
}

/// Physical slot -> logical sector.
pub fn deinterleave(slot: usize) -> usize {
    slot - slot % PERIOD + SECTOR[slot % PERIOD]
}

pub fn tag_pos(sector: usize) -> usize {
    interleave(sector) * RECORD_SIZE
}

pub fn data_pos(sector: usize) -> usize {
    tag_pos(sector) + TAG_SIZE
}
