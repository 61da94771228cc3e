use serde::{Deserialize, Serialize};

use crate::error::DownloadError;

/// An inclusive span of bytes within the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        (self.end - self.start) + 1
    }

    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Splits `[0, total_size - 1]` into `connections` contiguous ranges.
///
/// `already_completed` only applies to the single-connection plan: the lone
/// range picks up from that offset so an interrupted download can resume.
/// Multi-connection plans always start from zero; partially downloaded
/// files are re-fetched whole in that mode.
pub fn plan(
    total_size: u64,
    connections: usize,
    already_completed: u64,
) -> Result<Vec<ByteRange>, DownloadError> {
    if total_size == 0 {
        return Ok(Vec::new());
    }

    if connections <= 1 {
        if already_completed >= total_size {
            return Ok(Vec::new());
        }
        return Ok(vec![ByteRange::new(already_completed, total_size - 1)]);
    }

    if connections as u64 > total_size {
        return Err(DownloadError::InvalidPartition {
            total: total_size,
            connections,
        });
    }

    let part_size = total_size / connections as u64;
    let mut ranges = Vec::with_capacity(connections);

    for i in 0..connections as u64 {
        let start = i * part_size;
        let end = if i == connections as u64 - 1 {
            total_size - 1
        } else {
            (i + 1) * part_size - 1
        };
        ranges.push(ByteRange::new(start, end));
    }

    Ok(ranges)
}

/// Largest connection count the planner accepts for `total_size`.
pub fn clamp_connections(requested: usize, total_size: u64) -> usize {
    let cap = usize::try_from(total_size).unwrap_or(usize::MAX).max(1);
    requested.clamp(1, cap)
}
