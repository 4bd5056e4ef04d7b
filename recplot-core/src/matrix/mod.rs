//! Recruitment matrices
//!
//! A matrix covers one MAG: per contig, position bins along the contig and
//! identity bins shared by all contigs, holding the number of aligned bases
//! that fall in each (identity, position) cell.

pub mod bins;
pub mod fill;

pub use fill::{fill, FillSummary, Placement};

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::store::StoreError;
use crate::types::{ContigId, GenomicPos, MagId};

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Unknown MAG: {0}")]
    UnknownMag(String),
    #[error("Position bin width must be positive")]
    InvalidBinWidth,
    #[error("Identity step must be a positive number, got {0}")]
    InvalidIdentityStep(f64),
    #[error("Identity lower bound {0} leaves no identity bins below 100")]
    EmptyIdentityRange(f64),
    #[error("Identity lower bound must be a finite number, got {0}")]
    InvalidIdentityLower(f64),
    #[error("Identity range {lower}..100 in steps of {step} needs more than {max} bins", max = MAX_IDENTITY_BINS)]
    TooManyIdentityBins { step: f64, lower: f64 },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Upper limit on identity rows per matrix.
pub const MAX_IDENTITY_BINS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinParams {
    /// Approximate position bin width in bases.
    pub bin_width: GenomicPos,
    /// Identity bin height in percent.
    pub id_step: f64,
    /// Identity boundaries stop above this value; hits below the lowest boundary are left out.
    pub id_lower: f64,
}

impl Default for BinParams {
    fn default() -> Self {
        Self {
            bin_width: 1000,
            id_step: 0.5,
            id_lower: 70.0,
        }
    }
}

impl BinParams {
    fn validate(&self) -> Result<(), MatrixError> {
        if self.bin_width == 0 {
            return Err(MatrixError::InvalidBinWidth);
        }
        if !(self.id_step.is_finite() && self.id_step > 0.0) {
            return Err(MatrixError::InvalidIdentityStep(self.id_step));
        }
        if !self.id_lower.is_finite() {
            return Err(MatrixError::InvalidIdentityLower(self.id_lower));
        }
        if self.id_lower >= 100.0 {
            return Err(MatrixError::EmptyIdentityRange(self.id_lower));
        }
        if (100.0 - self.id_lower) / self.id_step > MAX_IDENTITY_BINS as f64 {
            return Err(MatrixError::TooManyIdentityBins {
                step: self.id_step,
                lower: self.id_lower,
            });
        }
        Ok(())
    }
}

/// Bins and counts for one contig.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContigMatrix {
    pub contig_id: ContigId,
    pub contig_name: String,
    pub length: GenomicPos,
    pub starts: Vec<GenomicPos>,
    pub ends: Vec<GenomicPos>,
    /// `counts[identity_bin][position_bin]`, in bases.
    pub counts: Vec<Vec<u64>>,
}

impl ContigMatrix {
    pub fn new(
        contig_id: ContigId,
        contig_name: String,
        length: GenomicPos,
        bin_width: GenomicPos,
        identity_bins: usize,
    ) -> Self {
        let (starts, ends) = bins::position_bins(length, bin_width);
        let counts = vec![vec![0; starts.len()]; identity_bins];
        Self {
            contig_id,
            contig_name,
            length,
            starts,
            ends,
            counts,
        }
    }

    pub fn position_bins(&self) -> usize {
        self.starts.len()
    }

    pub fn total_bases(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecruitmentMatrix {
    pub mag_id: MagId,
    pub mag_name: String,
    /// Ascending identity boundaries shared by every contig.
    pub identity_bins: Vec<f64>,
    pub contigs: BTreeMap<ContigId, ContigMatrix>,
}

impl RecruitmentMatrix {
    /// Empty matrix for every contig of `mag_name`.
    pub fn build(catalog: &Catalog, mag_name: &str, params: &BinParams) -> Result<Self, MatrixError> {
        params.validate()?;
        let mag = catalog
            .mag(mag_name)
            .ok_or_else(|| MatrixError::UnknownMag(mag_name.to_string()))?;

        let identity_bins = bins::identity_bins(params.id_step, params.id_lower);
        let contigs = catalog
            .contigs_of(mag)
            .map(|contig| {
                let matrix = ContigMatrix::new(
                    contig.id,
                    contig.name.clone(),
                    contig.length,
                    params.bin_width,
                    identity_bins.len(),
                );
                (contig.id, matrix)
            })
            .collect();

        log::debug!(
            "Prepared matrix for {} ({} identity bins)",
            mag_name,
            identity_bins.len()
        );
        Ok(Self {
            mag_id: mag.id,
            mag_name: mag.name.clone(),
            identity_bins,
            contigs,
        })
    }

    pub fn identity_bin(&self, pct_identity: f64) -> Option<usize> {
        bins::identity_bin(&self.identity_bins, pct_identity)
    }

    pub fn total_bases(&self) -> u64 {
        self.contigs.values().map(ContigMatrix::total_bases).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContigLengths, Membership};

    fn catalog() -> Catalog {
        let lengths: ContigLengths = [("ctgA", 2350), ("ctgB", 640), ("ctgC", 5000)]
            .into_iter()
            .map(|(name, len)| (name.to_string(), len))
            .collect();
        let membership: Membership = [("ctgA", "mag1"), ("ctgC", "mag2"), ("ctgB", "mag1")]
            .into_iter()
            .map(|(contig, mag)| (contig.to_string(), mag.to_string()))
            .collect();
        Catalog::build(&lengths, &membership).unwrap()
    }

    #[test]
    fn test_build_matrix_for_mag() {
        let matrix = RecruitmentMatrix::build(&catalog(), "mag1", &BinParams::default()).unwrap();
        assert_eq!(matrix.mag_id, 1);
        assert_eq!(matrix.identity_bins.len(), 60);
        assert_eq!(matrix.contigs.keys().copied().collect::<Vec<_>>(), vec![1, 3]);

        let a = &matrix.contigs[&1];
        assert_eq!(a.position_bins(), 2);
        assert_eq!(a.counts.len(), 60);
        assert!(a.counts.iter().all(|row| row.len() == 2));

        let b = &matrix.contigs[&3];
        assert_eq!((b.starts.clone(), b.ends.clone()), (vec![1], vec![640]));
        assert_eq!(matrix.total_bases(), 0);
    }

    #[test]
    fn test_unknown_mag() {
        let err = RecruitmentMatrix::build(&catalog(), "mag9", &BinParams::default()).unwrap_err();
        assert!(matches!(err, MatrixError::UnknownMag(ref name) if name == "mag9"));
    }

    #[test]
    fn test_invalid_params() {
        let catalog = catalog();
        let zero_width = BinParams { bin_width: 0, ..BinParams::default() };
        let bad_step = BinParams { id_step: 0.0, ..BinParams::default() };
        let no_range = BinParams { id_lower: 100.0, ..BinParams::default() };
        assert!(matches!(
            RecruitmentMatrix::build(&catalog, "mag1", &zero_width),
            Err(MatrixError::InvalidBinWidth)
        ));
        assert!(matches!(
            RecruitmentMatrix::build(&catalog, "mag1", &bad_step),
            Err(MatrixError::InvalidIdentityStep(_))
        ));
        assert!(matches!(
            RecruitmentMatrix::build(&catalog, "mag1", &no_range),
            Err(MatrixError::EmptyIdentityRange(_))
        ));
    }

    #[test]
    fn test_identity_range_is_bounded() {
        let catalog = catalog();
        for id_lower in [f64::NEG_INFINITY, f64::NAN] {
            let params = BinParams { id_lower, ..BinParams::default() };
            assert!(matches!(
                RecruitmentMatrix::build(&catalog, "mag1", &params),
                Err(MatrixError::InvalidIdentityLower(_))
            ));
        }

        let far_below = BinParams { id_lower: -1e12, ..BinParams::default() };
        let tiny_step = BinParams { id_step: 1e-9, ..BinParams::default() };
        for params in [far_below, tiny_step] {
            assert!(matches!(
                RecruitmentMatrix::build(&catalog, "mag1", &params),
                Err(MatrixError::TooManyIdentityBins { .. })
            ));
        }

        let negative = BinParams { id_lower: -1000.0, ..BinParams::default() };
        let matrix = RecruitmentMatrix::build(&catalog, "mag1", &negative).unwrap();
        assert_eq!(matrix.identity_bins.len(), 2200);
    }

    #[test]
    fn test_serializes_to_json() {
        let matrix = RecruitmentMatrix::build(&catalog(), "mag2", &BinParams::default()).unwrap();
        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json["mag_name"], "mag2");
        assert_eq!(json["contigs"]["2"]["ends"][4], 5000);
    }
}
