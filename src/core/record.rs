//! Record access helpers.
//!
//! Stages never poke at [`RecordBuf`] fields directly; they go through the
//! functions here so that coordinate conventions and tag decoding live in one
//! place. Coordinates returned from this module are 0-based and half-open.

use noodles::sam;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::RecordBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("record {0} has no NM (edit distance) tag")]
    MissingEditDistance(String),

    #[error("record {name} has an NM tag that is not a non-negative integer: {value}")]
    InvalidEditDistance { name: String, value: String },

    #[error("record {0} references a sequence id missing from the header")]
    UnknownReference(String),
}

/// Per-operation length totals over a record's CIGAR
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CigarTally {
    /// M, = and X operations
    pub match_mismatch: u64,
    pub insertion: u64,
    pub deletion: u64,
    pub skip: u64,
}

impl CigarTally {
    #[must_use]
    pub fn from_record(record: &RecordBuf) -> Self {
        let mut tally = Self::default();

        for op in record.cigar().as_ref() {
            let len = op.len() as u64;
            match op.kind() {
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                    tally.match_mismatch += len;
                }
                Kind::Insertion => tally.insertion += len,
                Kind::Deletion => tally.deletion += len,
                Kind::Skip => tally.skip += len,
                Kind::SoftClip | Kind::HardClip | Kind::Pad => {}
            }
        }

        tally
    }

    /// Aligned length: matches/mismatches plus inserted and deleted bases.
    /// Skipped regions (introns) are not part of the alignment.
    #[must_use]
    pub fn aligned_len(&self) -> u64 {
        self.match_mismatch + self.insertion + self.deletion
    }

    /// Number of reference bases covered, skips included
    #[must_use]
    pub fn reference_span(&self) -> u64 {
        self.match_mismatch + self.deletion + self.skip
    }
}

/// A record's placement on the reference, 0-based half-open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub contig: String,
    pub start: i64,
    pub end: i64,
}

/// Whether the unmapped flag (0x4) is clear
#[must_use]
pub fn is_mapped(record: &RecordBuf) -> bool {
    !record.flags().is_unmapped()
}

/// Read name for diagnostics, `*` when absent
#[must_use]
pub fn display_name(record: &RecordBuf) -> String {
    record
        .name()
        .map_or_else(|| "*".to_string(), ToString::to_string)
}

/// Resolve where a record sits on the reference.
///
/// Returns `Ok(None)` for records without a reference sequence id or
/// alignment start. The end is derived from the CIGAR reference span, so an
/// empty CIGAR yields `end == start`.
///
/// # Errors
///
/// Returns `RecordError::UnknownReference` if the reference sequence id is
/// not present in `header`.
pub fn placement(
    record: &RecordBuf,
    header: &sam::Header,
) -> Result<Option<Placement>, RecordError> {
    let (Some(id), Some(alignment_start)) =
        (record.reference_sequence_id(), record.alignment_start())
    else {
        return Ok(None);
    };

    let (name, _) = header
        .reference_sequences()
        .get_index(id)
        .ok_or_else(|| RecordError::UnknownReference(display_name(record)))?;

    #[allow(clippy::cast_possible_wrap)] // BAM positions fit in i32
    let start = (usize::from(alignment_start) - 1) as i64;
    #[allow(clippy::cast_possible_wrap)]
    let end = start + CigarTally::from_record(record).reference_span() as i64;

    Ok(Some(Placement {
        contig: name.to_string(),
        start,
        end,
    }))
}

/// Decode the NM tag as a non-negative integer, whatever width it was
/// stored with.
///
/// # Errors
///
/// Returns `RecordError::MissingEditDistance` if the tag is absent and
/// `RecordError::InvalidEditDistance` if it holds a negative number or a
/// non-integer value.
pub fn edit_distance(record: &RecordBuf) -> Result<u64, RecordError> {
    let value = record
        .data()
        .get(&Tag::EDIT_DISTANCE)
        .ok_or_else(|| RecordError::MissingEditDistance(display_name(record)))?;

    let n: i64 = match value {
        Value::Int8(n) => i64::from(*n),
        Value::UInt8(n) => i64::from(*n),
        Value::Int16(n) => i64::from(*n),
        Value::UInt16(n) => i64::from(*n),
        Value::Int32(n) => i64::from(*n),
        Value::UInt32(n) => i64::from(*n),
        other => {
            return Err(RecordError::InvalidEditDistance {
                name: display_name(record),
                value: format!("{other:?}"),
            })
        }
    };

    u64::try_from(n).map_err(|_| RecordError::InvalidEditDistance {
        name: display_name(record),
        value: n.to_string(),
    })
}
