//! BLAST tabular (outfmt 6) reader
//!
//! Columns: qseqid sseqid pident length mismatch gapopen qstart qend
//! sstart send evalue bitscore. Only sseqid, pident, sstart and send are used.

use std::io::BufRead;

use super::{LineSource, ParseError, RawHit, RawRecord, SkipReason};
use crate::types::GenomicPos;

const TARGET_COL: usize = 1;
const IDENTITY_COL: usize = 2;
const SUBJECT_START_COL: usize = 8;
const SUBJECT_END_COL: usize = 9;

/// Parser for single tabular lines
pub struct TabularParser;

impl TabularParser {
    /// Classify one line of tabular output.
    pub fn parse_line(line: &str) -> RawRecord {
        if line.trim().is_empty() || line.starts_with('#') {
            return RawRecord::Ignored;
        }
        match Self::extract(line) {
            Ok(hit) => RawRecord::Hit(hit),
            Err(reason) => RawRecord::Malformed(reason),
        }
    }

    fn extract(line: &str) -> Result<RawHit, SkipReason> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= SUBJECT_END_COL {
            return Err(SkipReason::MissingField);
        }

        let pct_identity: f64 = fields[IDENTITY_COL]
            .trim()
            .parse()
            .map_err(|_| SkipReason::InvalidNumber)?;
        if !(0.0..=100.0).contains(&pct_identity) {
            return Err(SkipReason::InvalidNumber);
        }

        let pos1 = parse_position(fields[SUBJECT_START_COL])?;
        let pos2 = parse_position(fields[SUBJECT_END_COL])?;

        Ok(RawHit {
            target: fields[TARGET_COL].to_string(),
            pct_identity,
            start: pos1.min(pos2),
            stop: pos1.max(pos2),
        })
    }
}

fn parse_position(field: &str) -> Result<GenomicPos, SkipReason> {
    match field.trim().parse::<GenomicPos>() {
        Ok(0) => Err(SkipReason::MissingPosition),
        Ok(pos) => Ok(pos),
        Err(_) => Err(SkipReason::InvalidNumber),
    }
}

/// Streams [`RawRecord`]s from tabular output
pub struct TabularReader<R: BufRead> {
    lines: LineSource<R>,
}

impl<R: BufRead> TabularReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineSource::new(reader),
        }
    }
}

impl<R: BufRead> Iterator for TabularReader<R> {
    type Item = Result<RawRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next_line()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        let record = TabularParser::parse_line(line);
        if let RawRecord::Malformed(reason) = &record {
            log::debug!("Tabular line {}: {}", self.lines.line_number(), reason);
        }
        Some(Ok(record))
    }
}
