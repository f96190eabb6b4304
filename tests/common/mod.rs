//! Shared fixtures: a small reference and BAM files written with noodles.

#![allow(dead_code)]

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use noodles::bam;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{QualityScores, Sequence};
use noodles::sam::alignment::RecordBuf;
use noodles::sam::header::record::value::map::ReferenceSequence;
use noodles::sam::header::record::value::Map;

/// chr1, 30 bases over three lines
pub const REFERENCE: &[u8] = b">chr1 test contig\nACGTACGTAA\nAAAAAAGGGG\nCCCCTTTTAC\n";

pub fn write_reference(dir: &Path) -> PathBuf {
    let path = dir.join("ref.fa");
    std::fs::write(&path, REFERENCE).unwrap();
    path
}

pub fn header() -> sam::Header {
    sam::Header::builder()
        .add_reference_sequence(
            "chr1",
            Map::<ReferenceSequence>::new(NonZeroUsize::new(30).unwrap()),
        )
        .build()
}

/// Mapped record on chr1 with a 1-based start and a single `=` run
pub fn mapped(name: &str, start: usize, len: usize, nm: Option<u8>) -> RecordBuf {
    let data = nm
        .map(|nm| vec![(Tag::EDIT_DISTANCE, Value::UInt8(nm))])
        .unwrap_or_default()
        .into_iter()
        .collect();

    RecordBuf::builder()
        .set_name(name)
        .set_flags(Flags::empty())
        .set_reference_sequence_id(0)
        .set_alignment_start(Position::new(start).unwrap())
        .set_cigar([Op::new(Kind::SequenceMatch, len)].into_iter().collect())
        .set_sequence(Sequence::from(vec![b'A'; len]))
        .set_quality_scores(QualityScores::from(vec![30; len]))
        .set_data(data)
        .build()
}

pub fn unmapped(name: &str) -> RecordBuf {
    RecordBuf::builder()
        .set_name(name)
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(b"ACGT".to_vec()))
        .set_quality_scores(QualityScores::from(vec![30; 4]))
        .build()
}

/// The standard input: one record dropped by a start-flank `^ACGTA` filter,
/// two mapped survivors at 90% accuracy and one unmapped record.
pub fn standard_records() -> Vec<RecordBuf> {
    vec![
        mapped("r1", 1, 4, Some(0)),
        mapped("r2", 2, 10, Some(1)),
        unmapped("u1"),
        mapped("r3", 11, 10, Some(1)),
    ]
}

pub fn write_bam(path: &Path, records: &[RecordBuf]) {
    let header = header();
    let mut writer = bam::io::Writer::new(File::create(path).unwrap());
    writer.write_header(&header).unwrap();
    for record in records {
        writer.write_alignment_record(&header, record).unwrap();
    }
    writer.try_finish().unwrap();
}

/// Names of every record in a BAM file, in file order
pub fn read_names(path: &Path) -> Vec<String> {
    let mut reader = bam::io::Reader::new(File::open(path).unwrap());
    let header = reader.read_header().unwrap();

    reader
        .record_bufs(&header)
        .map(|result| {
            let record = result.unwrap();
            record.name().map(ToString::to_string).unwrap_or_default()
        })
        .collect()
}

/// `AlnContext` dropping records whose first five reference bases are ACGTA
pub fn aln_context_yaml(reference: &Path) -> String {
    format!(
        "AlnContext:\n  Ref: {}\n  LeftShift: 0\n  RightShift: 5\n  RegexStart: '^ACGTA'\n",
        reference.display()
    )
}
