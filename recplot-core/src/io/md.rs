//! `MD:Z:` edit-tag arithmetic shared by the SAM and BAM readers.
//!
//! Identity here is an approximation: it counts digit runs as matches and
//! every other character (mismatched base, `^`, deleted base) as one
//! mismatch. Insertions never appear in the tag and are not counted.

use super::{RawHit, SkipReason};
use crate::types::GenomicPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditTag {
    pub matches: u64,
    pub mismatches: u64,
}

impl EditTag {
    /// Tally a tag value. Counts that do not fit in a `u64` are `InvalidEditTag`.
    pub fn parse(value: &[u8]) -> Result<Self, SkipReason> {
        let mut tag = EditTag::default();
        let mut run: u64 = 0;
        for &b in value {
            if b.is_ascii_digit() {
                run = run
                    .checked_mul(10)
                    .and_then(|r| r.checked_add(u64::from(b - b'0')))
                    .ok_or(SkipReason::InvalidEditTag)?;
            } else {
                tag.matches = tag.matches.checked_add(run).ok_or(SkipReason::InvalidEditTag)?;
                tag.mismatches += 1;
                run = 0;
            }
        }
        tag.matches = tag.matches.checked_add(run).ok_or(SkipReason::InvalidEditTag)?;
        tag.matches
            .checked_add(tag.mismatches)
            .ok_or(SkipReason::InvalidEditTag)?;
        Ok(tag)
    }

    /// Reference bases spanned by the alignment.
    pub fn aligned_length(&self) -> u64 {
        self.matches.saturating_add(self.mismatches)
    }

    pub fn pct_identity(&self) -> Option<f64> {
        match self.aligned_length() {
            0 => None,
            len => Some(100.0 * self.matches as f64 / len as f64),
        }
    }

    /// Build a hit starting at the 1-based `start` on `target`.
    pub fn to_hit(&self, target: String, start: GenomicPos) -> Result<RawHit, SkipReason> {
        let pct_identity = self.pct_identity().ok_or(SkipReason::ZeroLengthAlignment)?;
        let stop = (self.aligned_length() - 1)
            .checked_add(start)
            .ok_or(SkipReason::InvalidEditTag)?;
        Ok(RawHit {
            target,
            pct_identity,
            start,
            stop,
        })
    }
}
