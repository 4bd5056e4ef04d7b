//! Filling a recruitment matrix from the hits of one sample.

use serde::Serialize;

use super::{bins, ContigMatrix, MatrixError, RecruitmentMatrix};
use crate::store::SampleStore;
use crate::types::{GenomicPos, NormalizedHit};

/// What happened to a single hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Credited,
    /// Identity strictly below the lowest identity boundary.
    BelowIdentityFloor,
    /// Contig not part of this matrix's MAG.
    UnknownContig,
    /// Hit starts past the end of the contig.
    OutsideContig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FillSummary {
    pub visited: u64,
    pub credited: u64,
    pub below_floor: u64,
    pub unknown_contig: u64,
    pub outside_contig: u64,
    /// Credited hits whose stop was clipped to the contig length.
    pub truncated: u64,
}

impl FillSummary {
    fn record(&mut self, placement: Placement) {
        self.visited += 1;
        match placement {
            Placement::Credited => self.credited += 1,
            Placement::BelowIdentityFloor => self.below_floor += 1,
            Placement::UnknownContig => self.unknown_contig += 1,
            Placement::OutsideContig => self.outside_contig += 1,
        }
    }
}

impl ContigMatrix {
    /// Add the bases of `[start, stop]` to identity row `id_bin`, split over
    /// the position bins the span crosses.
    ///
    /// `stop` is clipped to the contig length. Returns `false` without
    /// touching the counts when `start` lies past the contig end.
    pub fn credit(&mut self, id_bin: usize, start: GenomicPos, stop: GenomicPos) -> bool {
        if start > self.length {
            return false;
        }
        let stop = stop.min(self.length);
        let row = &mut self.counts[id_bin];

        let first = bins::position_bin(&self.ends, start);
        let mut remaining = stop - start + 1;
        for (j, &end) in self.ends.iter().enumerate().skip(first) {
            let overflow = stop.saturating_sub(end);
            if overflow == 0 {
                row[j] += remaining;
                break;
            }
            row[j] += remaining - overflow;
            remaining = overflow;
        }
        true
    }
}

impl RecruitmentMatrix {
    /// Place one hit. Hits of other MAGs count as unknown contigs.
    pub fn add_hit(&mut self, hit: &NormalizedHit) -> Placement {
        let contig = match self.contigs.get_mut(&hit.contig_id) {
            Some(contig) if hit.mag_id == self.mag_id => contig,
            _ => return Placement::UnknownContig,
        };
        let Some(id_bin) = bins::identity_bin(&self.identity_bins, hit.pct_identity) else {
            return Placement::BelowIdentityFloor;
        };
        if contig.credit(id_bin, hit.start, hit.stop) {
            Placement::Credited
        } else {
            Placement::OutsideContig
        }
    }

    /// Place a sequence of hits and tally the outcome.
    pub fn add_hits<'a, I>(&mut self, hits: I) -> FillSummary
    where
        I: IntoIterator<Item = &'a NormalizedHit>,
    {
        let mut summary = FillSummary::default();
        for hit in hits {
            self.place(hit, &mut summary);
        }
        summary
    }

    fn place(&mut self, hit: &NormalizedHit, summary: &mut FillSummary) {
        let placement = self.add_hit(hit);
        if placement == Placement::Credited {
            let length = self.contigs.get(&hit.contig_id).map(|c| c.length);
            if length.is_some_and(|length| hit.stop > length) {
                summary.truncated += 1;
            }
        }
        summary.record(placement);
    }
}

/// Fill `matrix` with the stored hits of `sample_id` on its MAG.
///
/// Counts already in the matrix are kept, so filling an empty matrix twice
/// from the same sample doubles every cell.
pub fn fill(
    store: &SampleStore,
    sample_id: &str,
    matrix: &mut RecruitmentMatrix,
) -> Result<FillSummary, MatrixError> {
    let mut summary = FillSummary::default();
    store.for_each_hit(sample_id, matrix.mag_id, |hit| matrix.place(&hit, &mut summary))?;

    if summary.below_floor + summary.outside_contig > 0 {
        log::debug!(
            "{} / {}: {} hits below identity floor, {} outside contig bounds",
            sample_id,
            matrix.mag_name,
            summary.below_floor,
            summary.outside_contig
        );
    }
    if summary.truncated > 0 {
        log::warn!(
            "{} / {}: {} hits ran past the contig end and were truncated",
            sample_id,
            matrix.mag_name,
            summary.truncated
        );
    }
    log::info!(
        "Filled {} from {}: {} of {} hits credited",
        matrix.mag_name,
        sample_id,
        summary.credited,
        summary.visited
    );
    Ok(summary)
}
