//! Alignment and reference input for recplot
//!
//! Each alignment format yields [`RawRecord`]s naming a target contig; a
//! [`HitStream`] then normalizes them against the [`Catalog`], dropping hits
//! to contigs outside it and tallying records skipped as malformed.

pub mod bam;
pub mod fasta;
pub mod md;
pub mod membership;
pub mod sam;
pub mod tabular;

pub use bam::BamReader;
pub use md::EditTag;
pub use sam::TaggedTextReader;
pub use tabular::{TabularParser, TabularReader};

use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::types::{GenomicPos, NormalizedHit};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported alignment format '{0}' (expected blast, sam or bam)")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SAM parsing error: {0}")]
    Sam(String),
    #[error("BAM parsing error: {0}")]
    Bam(String),
    #[error("FASTA parsing error: {0}")]
    Fasta(String),
    #[error("Invalid membership line {line}: {message}")]
    Membership { line: usize, message: String },
}

/// Why a record was skipped without aborting the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// The edit tag describes no aligned bases.
    ZeroLengthAlignment,
    MissingField,
    InvalidNumber,
    InvalidEditTag,
    MissingPosition,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::ZeroLengthAlignment => "zero-length alignment",
            SkipReason::MissingField => "missing field",
            SkipReason::InvalidNumber => "invalid number",
            SkipReason::InvalidEditTag => "invalid edit tag",
            SkipReason::MissingPosition => "missing position",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentFormat {
    /// BLAST tabular output (outfmt 6).
    Tabular,
    /// SAM text carrying `MD:Z:` tags.
    TaggedText,
    /// BAM.
    Binary,
}

impl FromStr for AlignmentFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blast" | "tabular" => Ok(AlignmentFormat::Tabular),
            "sam" | "tagged-text" => Ok(AlignmentFormat::TaggedText),
            "bam" | "binary" => Ok(AlignmentFormat::Binary),
            _ => Err(ParseError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for AlignmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlignmentFormat::Tabular => "blast",
            AlignmentFormat::TaggedText => "sam",
            AlignmentFormat::Binary => "bam",
        };
        f.write_str(name)
    }
}

/// An alignment as read from the file, before catalog lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub target: String,
    pub pct_identity: f64,
    pub start: GenomicPos,
    pub stop: GenomicPos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Hit(RawHit),
    /// Comments, headers, unmapped records and records without an edit tag.
    Ignored,
    Malformed(SkipReason),
}

pub type RecordIter = Box<dyn Iterator<Item = Result<RawRecord, ParseError>>>;

/// Open an alignment file for reading in the declared format.
///
/// Text formats are transparently decompressed when the path ends in `.gz`.
pub fn open_alignment_file<P: AsRef<Path>>(path: P, format: AlignmentFormat) -> Result<RecordIter, ParseError> {
    let path = path.as_ref();
    match format {
        AlignmentFormat::Tabular => Ok(Box::new(TabularReader::new(open_text(path)?))),
        AlignmentFormat::TaggedText => Ok(Box::new(TaggedTextReader::new(open_text(path)?)?)),
        AlignmentFormat::Binary => Ok(Box::new(BamReader::from_path(path)?)),
    }
}

fn open_text(path: &Path) -> Result<BufReader<Box<dyn Read>>, ParseError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.to_string_lossy().ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(BufReader::new(reader))
}

/// Read lines one at a time, reusing one buffer.
pub(crate) struct LineSource<R: BufRead> {
    reader: R,
    buffer: String,
    line_number: usize,
}

impl<R: BufRead> LineSource<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            line_number: 0,
        }
    }

    pub(crate) fn next_line(&mut self) -> Option<Result<&str, ParseError>> {
        self.buffer.clear();
        match self.reader.read_line(&mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                self.line_number += 1;
                Some(Ok(self.buffer.trim_end_matches(['\n', '\r'])))
            }
            Err(e) => Some(Err(e.into())),
        }
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }
}

/// Counts gathered while streaming one alignment file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseSummary {
    pub retained: u64,
    pub out_of_catalog: u64,
    pub ignored: u64,
    pub malformed: u64,
    /// Distinct catalog contigs with at least one retained hit.
    pub contigs_seen: BTreeSet<String>,
}

/// Normalizes raw records against the catalog.
///
/// Yields only retained hits; fatal I/O errors are passed through and end the
/// stream for the caller.
pub struct HitStream<'c, I> {
    records: I,
    catalog: &'c Catalog,
    summary: ParseSummary,
}

impl<'c, I> HitStream<'c, I>
where
    I: Iterator<Item = Result<RawRecord, ParseError>>,
{
    pub fn new(records: I, catalog: &'c Catalog) -> Self {
        Self {
            records,
            catalog,
            summary: ParseSummary::default(),
        }
    }

    pub fn summary(&self) -> &ParseSummary {
        &self.summary
    }

    pub fn into_summary(self) -> ParseSummary {
        self.summary
    }

    fn normalize(&mut self, raw: RawHit) -> Option<NormalizedHit> {
        let contig = match self.catalog.contig(&raw.target) {
            Some(contig) => contig,
            None => {
                self.summary.out_of_catalog += 1;
                return None;
            }
        };
        if !self.summary.contigs_seen.contains(&raw.target) {
            self.summary.contigs_seen.insert(raw.target.clone());
        }
        self.summary.retained += 1;
        Some(NormalizedHit::new(
            contig.mag_id,
            contig.id,
            raw.pct_identity,
            raw.start,
            raw.stop,
        ))
    }
}

impl<'c, I> Iterator for HitStream<'c, I>
where
    I: Iterator<Item = Result<RawRecord, ParseError>>,
{
    type Item = Result<NormalizedHit, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.records.next()? {
                Err(e) => return Some(Err(e)),
                Ok(RawRecord::Ignored) => self.summary.ignored += 1,
                Ok(RawRecord::Malformed(reason)) => {
                    self.summary.malformed += 1;
                    log::debug!("Skipping malformed record: {}", reason);
                }
                Ok(RawRecord::Hit(raw)) => {
                    if let Some(hit) = self.normalize(raw) {
                        return Some(Ok(hit));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContigLengths, Membership};
    use std::io::Write;

    fn catalog() -> Catalog {
        let lengths: ContigLengths = [("ctgA".to_string(), 2350), ("ctgB".to_string(), 900)]
            .into_iter()
            .collect();
        let membership: Membership = [
            ("ctgA".to_string(), "mag1".to_string()),
            ("ctgB".to_string(), "mag2".to_string()),
        ]
        .into_iter()
        .collect();
        Catalog::build(&lengths, &membership).unwrap()
    }

    fn raw(target: &str, start: GenomicPos, stop: GenomicPos) -> Result<RawRecord, ParseError> {
        Ok(RawRecord::Hit(RawHit {
            target: target.to_string(),
            pct_identity: 99.0,
            start,
            stop,
        }))
    }

    #[test]
    fn test_format_tags() {
        assert_eq!("blast".parse::<AlignmentFormat>().unwrap(), AlignmentFormat::Tabular);
        assert_eq!("SAM".parse::<AlignmentFormat>().unwrap(), AlignmentFormat::TaggedText);
        assert_eq!("bam".parse::<AlignmentFormat>().unwrap(), AlignmentFormat::Binary);
        let err = "paf".parse::<AlignmentFormat>().unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(ref tag) if tag == "paf"));
    }

    #[test]
    fn test_stream_drops_unknown_contigs() {
        let catalog = catalog();
        let records = vec![
            raw("ctgA", 100, 150),
            raw("plasmid", 1, 50),
            Ok(RawRecord::Ignored),
            Ok(RawRecord::Malformed(SkipReason::ZeroLengthAlignment)),
            raw("ctgB", 30, 10),
            raw("ctgA", 500, 600),
        ];
        let mut stream = HitStream::new(records.into_iter(), &catalog);
        let hits: Vec<NormalizedHit> = stream.by_ref().map(|hit| hit.unwrap()).collect();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], NormalizedHit::new(1, 1, 99.0, 100, 150));
        assert_eq!((hits[1].mag_id, hits[1].contig_id, hits[1].start, hits[1].stop), (2, 2, 10, 30));

        let summary = stream.into_summary();
        assert_eq!(summary.retained, 3);
        assert_eq!(summary.out_of_catalog, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(
            summary.contigs_seen.into_iter().collect::<Vec<_>>(),
            vec!["ctgA".to_string(), "ctgB".to_string()]
        );
    }

    #[test]
    fn test_open_gzipped_tabular() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let file = tempfile::Builder::new().suffix(".blast.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        writeln!(encoder, "q1\tctgA\t98.5\t51\t0\t0\t1\t51\t100\t150\t1e-20\t90").unwrap();
        encoder.finish().unwrap();

        let records: Vec<RawRecord> = open_alignment_file(file.path(), AlignmentFormat::Tabular)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], RawRecord::Hit(ref hit) if hit.target == "ctgA"));
    }
}
