use std::num::NonZeroU64;
use std::ops::Range;

use crate::TransferError;

/// One contiguous byte range of the source file, uploaded as a unit.
///
/// Parts are produced once by [`plan`] and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// 1-based part number.
    pub index: u32,
    /// First byte (inclusive).
    pub start: u64,
    /// End byte (exclusive).
    pub end: u64,
    /// Whether this is the final part; its `end` equals the file size.
    pub is_last: bool,
}

impl Part {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// Number of parts a file of `total_size` bytes is split into.
///
/// A trailing remainder smaller than a fifth of `part_size` is folded into
/// the previous part instead of becoming a tiny part of its own.
pub fn part_count(total_size: u64, part_size: NonZeroU64) -> u64 {
    let part_size = part_size.get();
    let whole = total_size / part_size;
    let remainder = total_size % part_size;

    if whole == 0 {
        return 1;
    }
    // remainder / part_size < 0.2, evaluated without floats.
    if u128::from(remainder) * 5 < u128::from(part_size) {
        whole
    } else {
        whole + 1
    }
}

/// Splits `total_size` bytes into ordered, contiguous parts.
///
/// Every part but the last is exactly `part_size` long; the last part ends at
/// `total_size`. An empty file still yields a single zero-length part.
pub fn plan(total_size: u64, part_size: NonZeroU64) -> Result<Vec<Part>, TransferError> {
    let count = part_count(total_size, part_size);
    let count_u32 = u32::try_from(count).map_err(|_| TransferError::TooManyParts(count))?;
    let size = part_size.get();

    let parts = (1..=count_u32)
        .map(|index| {
            let start = u64::from(index - 1) * size;
            let is_last = index == count_u32;
            let end = if is_last { total_size } else { start + size };
            Part {
                index,
                start,
                end,
                is_last,
            }
        })
        .collect();
    Ok(parts)
}
