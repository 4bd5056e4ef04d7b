use serde::{Deserialize, Serialize};

pub type GenomicPos = u64;
pub type MagId = u32;
pub type ContigId = u32;

/// One retained alignment, normalized against the reference catalog.
///
/// `start <= stop` always holds; both are 1-based inclusive contig coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHit {
    pub mag_id: MagId,
    pub contig_id: ContigId,
    pub pct_identity: f64,
    pub start: GenomicPos,
    pub stop: GenomicPos,
}

impl NormalizedHit {
    pub fn new(
        mag_id: MagId,
        contig_id: ContigId,
        pct_identity: f64,
        pos1: GenomicPos,
        pos2: GenomicPos,
    ) -> Self {
        Self {
            mag_id,
            contig_id,
            pct_identity,
            start: pos1.min(pos2),
            stop: pos1.max(pos2),
        }
    }

    /// Number of reference bases covered by the hit.
    pub fn read_length(&self) -> GenomicPos {
        self.stop - self.start + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigInfo {
    pub id: ContigId,
    pub name: String,
    pub length: GenomicPos,
    pub mag_id: MagId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagInfo {
    pub id: MagId,
    pub name: String,
    /// Contig ids in catalog order.
    pub contigs: Vec<ContigId>,
}

/// A registered alignment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub source_name: String,
    pub sample_id: String,
    pub sequence_number: u32,
}

impl Sample {
    pub fn id_for(sequence_number: u32) -> String {
        format!("sample_{}", sequence_number)
    }
}
