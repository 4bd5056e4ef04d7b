//! BAM reader
//!
//! Same edit-tag arithmetic as the SAM text path, but the `MD` value is read
//! through the record's typed data accessor and the reference name is
//! resolved from the header.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::sam::{self, alignment::record::data::field::{Tag, Value}};

use super::md::EditTag;
use super::{ParseError, RawRecord, SkipReason};

pub struct BamReader<R: Read> {
    reader: bam::io::Reader<bgzf::Reader<R>>,
    header: sam::Header,
    record: bam::Record,
}

impl BamReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read> BamReader<R> {
    pub fn new(inner: R) -> Result<Self, ParseError> {
        let mut reader = bam::io::Reader::new(inner);
        let header = reader
            .read_header()
            .map_err(|e| ParseError::Bam(format!("invalid header: {}", e)))?;
        Ok(Self {
            reader,
            header,
            record: bam::Record::default(),
        })
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }

    fn classify(&self) -> RawRecord {
        let record = &self.record;
        if record.flags().is_unmapped() {
            return RawRecord::Ignored;
        }

        let md = match record.data().get(&Tag::MISMATCHED_POSITIONS) {
            None => return RawRecord::Ignored,
            Some(Ok(Value::String(value))) => EditTag::parse(value),
            Some(_) => Err(SkipReason::InvalidEditTag),
        };
        let tag = match md {
            Ok(tag) => tag,
            Err(reason) => return RawRecord::Malformed(reason),
        };

        let target = match record.reference_sequence_id().transpose() {
            Ok(Some(id)) => self
                .header
                .reference_sequences()
                .get_index(id)
                .map(|(name, _)| name.to_string()),
            _ => None,
        };
        let target = match target {
            Some(target) => target,
            None => return RawRecord::Malformed(SkipReason::MissingField),
        };

        let start = match record.alignment_start().transpose() {
            Ok(Some(position)) => position.get() as u64,
            _ => return RawRecord::Malformed(SkipReason::MissingPosition),
        };

        match tag.to_hit(target, start) {
            Ok(hit) => RawRecord::Hit(hit),
            Err(reason) => RawRecord::Malformed(reason),
        }
    }
}

impl<R: Read> Iterator for BamReader<R> {
    type Item = Result<RawRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(0) => None,
            Ok(_) => Some(Ok(self.classify())),
            Err(e) => Some(Err(e.into())),
        }
    }
}
