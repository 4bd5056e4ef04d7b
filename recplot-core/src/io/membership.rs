//! Contig → MAG membership file.
//!
//! One `contig<whitespace>mag` pair per line. A contig listed twice keeps its
//! first position in the iteration order but takes the last MAG given.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{LineSource, ParseError};
use crate::catalog::Membership;

pub fn read_membership<P: AsRef<Path>>(path: P) -> Result<Membership, ParseError> {
    let file = File::open(path)?;
    parse_membership(BufReader::new(file))
}

pub fn parse_membership<R: BufRead>(reader: R) -> Result<Membership, ParseError> {
    let mut lines = LineSource::new(reader);
    let mut membership = Membership::new();
    let mut line_number = 0;

    while let Some(line) = lines.next_line() {
        let line = line?;
        line_number += 1;
        let mut fields = line.split_whitespace();
        let (contig, mag) = match (fields.next(), fields.next()) {
            (None, _) => continue,
            (Some(contig), Some(mag)) => (contig.to_string(), mag.to_string()),
            (Some(_), None) => {
                return Err(ParseError::Membership {
                    line: line_number,
                    message: "expected contig and MAG columns".to_string(),
                })
            }
        };
        membership.insert(contig, mag);
    }

    Ok(membership)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_pairs() {
        let data = "ctgA\tmag1\nctgB\tmag2\n\nctgC mag1\n";
        let membership = parse_membership(Cursor::new(data)).unwrap();
        let pairs: Vec<(&str, &str)> = membership
            .iter()
            .map(|(c, m)| (c.as_str(), m.as_str()))
            .collect();
        assert_eq!(pairs, vec![("ctgA", "mag1"), ("ctgB", "mag2"), ("ctgC", "mag1")]);
    }

    #[test]
    fn test_duplicate_contig_keeps_position() {
        let data = "ctgA\tmag1\nctgB\tmag2\nctgA\tmag3\n";
        let membership = parse_membership(Cursor::new(data)).unwrap();
        assert_eq!(membership.len(), 2);
        assert_eq!(membership.get_index(0).unwrap(), (&"ctgA".to_string(), &"mag3".to_string()));
    }

    #[test]
    fn test_single_column_is_an_error() {
        let data = "ctgA\tmag1\nctgB\n";
        let err = parse_membership(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, ParseError::Membership { line: 2, .. }));
    }
}
