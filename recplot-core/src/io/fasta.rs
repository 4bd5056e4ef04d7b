//! Contig lengths from a FASTA file.
//!
//! Gzipped input is detected by needletail. The contig name is the first
//! whitespace-delimited token of the header line.

use std::path::Path;

use needletail::parse_fastx_file;

use super::ParseError;
use crate::catalog::ContigLengths;
use crate::types::GenomicPos;

pub fn read_contig_lengths<P: AsRef<Path>>(path: P) -> Result<ContigLengths, ParseError> {
    log::info!("Reading contig lengths from {}", path.as_ref().display());
    let mut reader = parse_fastx_file(&path).map_err(|e| ParseError::Fasta(e.to_string()))?;

    let mut lengths = ContigLengths::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| ParseError::Fasta(e.to_string()))?;
        let id = String::from_utf8_lossy(record.id());
        let name = id.split_whitespace().next().unwrap_or_default().to_string();
        lengths.insert(name, record.num_bases() as GenomicPos);
    }

    log::info!("Read {} contigs", lengths.len());
    Ok(lengths)
}
