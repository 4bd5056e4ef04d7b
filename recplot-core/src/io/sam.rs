//! SAM text reader for records carrying an `MD:Z:` tag
//!
//! Records are read with noodles. Aligners such as magicblast do not always
//! write `@SQ` lines, so the reference name is taken verbatim from RNAME and
//! never resolved against the header.

use std::io::{self, BufRead};

use noodles::sam::{
    self,
    alignment::record::data::field::{Tag, Value},
    alignment::record::Data as _,
};

use super::md::EditTag;
use super::{ParseError, RawRecord, SkipReason};

/// Streams [`RawRecord`]s from SAM text
pub struct TaggedTextReader<R: BufRead> {
    reader: sam::io::Reader<R>,
    header: sam::Header,
    record: sam::Record,
    records_read: usize,
}

impl<R: BufRead> TaggedTextReader<R> {
    /// Read the header (possibly empty) and position the reader at the first record.
    pub fn new(inner: R) -> Result<Self, ParseError> {
        let mut reader = sam::io::Reader::new(inner);
        let header = reader
            .read_header()
            .map_err(|e| ParseError::Sam(format!("invalid header: {}", e)))?;
        Ok(Self {
            reader,
            header,
            record: sam::Record::default(),
            records_read: 0,
        })
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }

    /// Consume empty lines so they are not reported as truncated records.
    fn skip_blank_lines(&mut self) -> io::Result<()> {
        loop {
            let inner = self.reader.get_mut();
            let blank = match inner.fill_buf()? {
                [b'\n', ..] => 1,
                [b'\r', b'\n', ..] => 2,
                _ => return Ok(()),
            };
            inner.consume(blank);
        }
    }

    fn classify(&self) -> RawRecord {
        let record = &self.record;
        match record.flags() {
            Ok(flags) if flags.is_unmapped() => return RawRecord::Ignored,
            Ok(_) => {}
            Err(_) => return RawRecord::Malformed(SkipReason::InvalidNumber),
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

        // `*` RNAME or POS 0 mark a record without a placement
        let target = match record.reference_sequence_name() {
            Some(name) => String::from_utf8_lossy(name.as_ref()).into_owned(),
            None => return RawRecord::Ignored,
        };
        let start = match record.alignment_start() {
            Some(Ok(position)) => position.get() as u64,
            Some(Err(_)) => return RawRecord::Malformed(SkipReason::InvalidNumber),
            None => return RawRecord::Ignored,
        };

        match tag.to_hit(target, start) {
            Ok(hit) => RawRecord::Hit(hit),
            Err(reason) => RawRecord::Malformed(reason),
        }
    }
}

impl<R: BufRead> Iterator for TaggedTextReader<R> {
    type Item = Result<RawRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.skip_blank_lines() {
            return Some(Err(e.into()));
        }
        let record = match self.reader.read_record(&mut self.record) {
            Ok(0) => return None,
            Ok(_) => self.classify(),
            // Fewer than 11 fields; the reader has already moved past the line.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => RawRecord::Malformed(SkipReason::MissingField),
            Err(e) => return Some(Err(e.into())),
        };
        self.records_read += 1;
        if let RawRecord::Malformed(reason) = &record {
            log::debug!("SAM record {}: {}", self.records_read, reason);
        }
        Some(Ok(record))
    }
}
