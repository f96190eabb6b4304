//! `AccStats`: mean alignment accuracy, plain and weighted by aligned length.
//!
//! For each mapped record:
//!
//! - `L = M + I + D`, where `M` counts `M`, `=` and `X` operations
//! - `accuracy = (1 - NM / L) * 100`
//!
//! At the end of the stream a two-column summary is written:
//!
//! ```text
//! AccMean	WeightedAccMean
//! 90.000	90.000
//! ```
//!
//! `AccMean` is the mean of the per-record accuracies and `WeightedAccMean`
//! is `sum(accuracy * L) / sum(L)`. Mapped records with `L = 0` have no
//! defined accuracy: they are forwarded, left out of both means and reported
//! in a warning. A mean with no contributing records is written as `NA`.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};

use noodles::sam::alignment::RecordBuf;
use serde::Deserialize;
use tracing::{info, warn};

use super::{forward, StageContext, StageError};
use crate::config::StageParams;
use crate::core::record::{edit_distance, is_mapped, CigarTally, RecordError};
use crate::pipeline::channel::{RecordReceiver, RecordSender};

/// Destination meaning the diagnostic stream
pub const STDERR: &str = "-";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AccStatsParams {
    /// Summary destination; `-` or absent means stderr
    #[serde(default)]
    pub tsv: Option<String>,
}

/// Helper function to convert a count to f64 with explicit precision loss allowance
#[inline]
fn count_to_f64(count: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

/// Accuracy of a single alignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentAccuracy {
    pub aligned_len: u64,
    pub edit_distance: u64,
    /// Percent identity over the aligned length
    pub accuracy: f64,
}

impl AlignmentAccuracy {
    /// Compute accuracy from CIGAR and NM. Returns `Ok(None)` when the aligned
    /// length is zero.
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if NM is missing or not an integer.
    pub fn from_record(record: &RecordBuf) -> Result<Option<Self>, RecordError> {
        let edit_distance = edit_distance(record)?;
        let aligned_len = CigarTally::from_record(record).aligned_len();

        if aligned_len == 0 {
            return Ok(None);
        }

        let accuracy =
            (1.0 - count_to_f64(edit_distance) / count_to_f64(aligned_len)) * 100.0;

        Ok(Some(Self {
            aligned_len,
            edit_distance,
            accuracy,
        }))
    }

    /// Contribution to the weighted sum
    pub fn weighted(&self) -> f64 {
        self.accuracy * count_to_f64(self.aligned_len)
    }
}

/// Running totals over mapped records
#[derive(Debug, Clone, Default)]
pub struct AccuracyAccumulator {
    aligned_len: u64,
    accuracy_sum: f64,
    weighted_sum: f64,
    contributing: u64,
    zero_length: u64,
}

impl AccuracyAccumulator {
    /// Add a mapped record.
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if NM is missing or not an integer.
    pub fn add(&mut self, record: &RecordBuf) -> Result<(), RecordError> {
        match AlignmentAccuracy::from_record(record)? {
            Some(acc) => {
                self.aligned_len += acc.aligned_len;
                self.accuracy_sum += acc.accuracy;
                self.weighted_sum += acc.weighted();
                self.contributing += 1;
            }
            None => self.zero_length += 1,
        }
        Ok(())
    }

    pub fn summary(&self) -> AccuracySummary {
        let mean = (self.contributing > 0)
            .then(|| self.accuracy_sum / count_to_f64(self.contributing));
        let weighted_mean =
            (self.aligned_len > 0).then(|| self.weighted_sum / count_to_f64(self.aligned_len));

        AccuracySummary {
            mean,
            weighted_mean,
            contributing: self.contributing,
            zero_length: self.zero_length,
        }
    }
}

/// End-of-stream result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracySummary {
    pub mean: Option<f64>,
    pub weighted_mean: Option<f64>,
    /// Mapped records included in the means
    pub contributing: u64,
    /// Mapped records excluded because their aligned length is zero
    pub zero_length: u64,
}

struct Mean(Option<f64>);

impl fmt::Display for Mean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.3}"),
            None => f.write_str("NA"),
        }
    }
}

impl AccuracySummary {
    /// Write the two-column TSV summary
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "AccMean\tWeightedAccMean")?;
        writeln!(
            writer,
            "{}\t{}",
            Mean(self.mean),
            Mean(self.weighted_mean)
        )?;
        writer.flush()
    }
}

pub struct AccStats {
    destination: Box<dyn Write + Send>,
    label: String,
    accumulator: AccuracyAccumulator,
}

impl fmt::Debug for AccStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccStats")
            .field("destination", &self.label)
            .field("accumulator", &self.accumulator)
            .finish_non_exhaustive()
    }
}

impl AccStats {
    /// Build the stage, creating the summary file up front so an unwritable
    /// destination fails before any record is read.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Config` for invalid parameters and
    /// `StageError::CreateFile` if the destination cannot be created.
    pub fn from_params(params: &StageParams, _ctx: &StageContext) -> Result<Self, StageError> {
        let p: AccStatsParams = params.parse()?;
        let label = p.tsv.unwrap_or_else(|| STDERR.to_string());

        let destination: Box<dyn Write + Send> = if label == STDERR {
            Box::new(std::io::stderr())
        } else {
            let file = File::create(&label).map_err(|source| StageError::CreateFile {
                path: label.clone().into(),
                source,
            })?;
            Box::new(BufWriter::new(file))
        };

        Ok(Self {
            destination,
            label,
            accumulator: AccuracyAccumulator::default(),
        })
    }

    pub(crate) fn run(
        mut self,
        mut input: RecordReceiver,
        output: RecordSender,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        let mut forwarded: u64 = 0;

        while let Some(record) = input.blocking_recv() {
            if is_mapped(&record) {
                self.accumulator.add(&record)?;
            }
            forward(&output, record)?;
            forwarded += 1;
        }

        let summary = self.accumulator.summary();
        summary
            .write_tsv(&mut self.destination)
            .map_err(|source| StageError::WriteSummary {
                destination: self.label.clone(),
                source,
            })?;

        if summary.zero_length > 0 {
            warn!(
                stage = "AccStats",
                rank = ctx.rank,
                records = summary.zero_length,
                "Mapped records with zero aligned length were excluded from accuracy means"
            );
        }

        if !ctx.quiet {
            info!(
                stage = "AccStats",
                rank = ctx.rank,
                forwarded,
                mapped = summary.contributing,
                destination = %self.label,
                "Stage finished"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::tests::{header_with, mapped, unmapped};
    use crate::stages::tests::{context, run_stage};
    use crate::stages::Stage;
    use noodles::sam::alignment::record::cigar::op::Kind;
    use noodles::sam::alignment::record_buf::data::field::Value;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_single_record_accuracy() {
        let record = mapped("r1", 1, &[(Kind::SequenceMatch, 10)], Some(Value::UInt8(1)));
        let acc = AlignmentAccuracy::from_record(&record).unwrap().unwrap();

        assert_eq!(acc.aligned_len, 10);
        assert_eq!(acc.edit_distance, 1);
        assert!(close(acc.accuracy, 90.0));
        assert!(close(acc.weighted(), 900.0));
    }

    #[test]
    fn test_aligned_length_counts_indels_not_clips_or_skips() {
        let record = mapped(
            "r1",
            1,
            &[
                (Kind::SoftClip, 5),
                (Kind::Match, 6),
                (Kind::Insertion, 2),
                (Kind::Skip, 50),
                (Kind::Deletion, 2),
            ],
            Some(Value::Int32(4)),
        );
        let acc = AlignmentAccuracy::from_record(&record).unwrap().unwrap();

        assert_eq!(acc.aligned_len, 10);
        assert!(close(acc.accuracy, 60.0));
    }

    #[test]
    fn test_means_exclude_unmapped() {
        let mut accumulator = AccuracyAccumulator::default();
        for name in ["r1", "r2"] {
            let record = mapped(name, 1, &[(Kind::SequenceMatch, 10)], Some(Value::UInt8(1)));
            accumulator.add(&record).unwrap();
        }

        let summary = accumulator.summary();
        assert!(close(summary.mean.unwrap(), 90.0));
        assert!(close(summary.weighted_mean.unwrap(), 90.0));
        assert_eq!(summary.contributing, 2);
    }

    #[test]
    fn test_weighted_mean_differs_from_mean() {
        let mut accumulator = AccuracyAccumulator::default();
        // 10 bases at 90% and 90 bases at 100%
        accumulator
            .add(&mapped("short", 1, &[(Kind::Match, 10)], Some(Value::UInt8(1))))
            .unwrap();
        accumulator
            .add(&mapped("long", 1, &[(Kind::Match, 90)], Some(Value::UInt8(0))))
            .unwrap();

        let summary = accumulator.summary();
        assert!(close(summary.mean.unwrap(), 95.0));
        assert!(close(summary.weighted_mean.unwrap(), 99.0));
    }

    #[test]
    fn test_zero_length_is_excluded() {
        let mut accumulator = AccuracyAccumulator::default();
        accumulator
            .add(&mapped("empty", 1, &[(Kind::SoftClip, 10)], Some(Value::UInt8(0))))
            .unwrap();

        let summary = accumulator.summary();
        assert_eq!(summary.zero_length, 1);
        assert_eq!(summary.contributing, 0);
        assert!(summary.mean.is_none());
        assert!(summary.weighted_mean.is_none());

        let mut out = Vec::new();
        summary.write_tsv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "AccMean\tWeightedAccMean\nNA\tNA\n");
    }

    #[test]
    fn test_missing_nm_is_fatal() {
        let mut accumulator = AccuracyAccumulator::default();
        let result = accumulator.add(&mapped("r1", 1, &[(Kind::Match, 10)], None));
        assert!(matches!(result, Err(RecordError::MissingEditDistance(_))));
    }

    #[test]
    fn test_run_writes_summary_and_forwards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("acc.tsv");
        let ctx = context(header_with(&[("chr1", 100)]));

        let yaml: serde_yaml::Value =
            serde_yaml::from_str(&format!("Tsv: {}", tsv.display())).unwrap();
        let stage = AccStats::from_params(&StageParams::new("AccStats", yaml), &ctx).unwrap();

        let records = vec![
            mapped("r1", 1, &[(Kind::SequenceMatch, 10)], Some(Value::UInt8(1))),
            unmapped("u1"),
            mapped("r2", 5, &[(Kind::SequenceMatch, 10)], Some(Value::Int16(1))),
        ];
        let expected = records.clone();

        let out = run_stage(Stage::AccStats(stage), records, &ctx).unwrap();
        assert_eq!(out, expected);

        let summary = std::fs::read_to_string(&tsv).unwrap();
        assert_eq!(summary, "AccMean\tWeightedAccMean\n90.000\t90.000\n");
    }

    #[test]
    fn test_unmapped_without_nm_is_not_inspected() {
        let ctx = context(header_with(&[("chr1", 100)]));
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("acc.tsv");
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(&format!("Tsv: {}", tsv.display())).unwrap();
        let stage = AccStats::from_params(&StageParams::new("AccStats", yaml), &ctx).unwrap();

        let out = run_stage(Stage::AccStats(stage), vec![unmapped("u1")], &ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&tsv).unwrap(),
            "AccMean\tWeightedAccMean\nNA\tNA\n"
        );
    }

    #[test]
    fn test_unwritable_destination() {
        let ctx = context(header_with(&[("chr1", 100)]));
        let yaml: serde_yaml::Value = serde_yaml::from_str("Tsv: /nonexistent/dir/acc.tsv").unwrap();
        let err = AccStats::from_params(&StageParams::new("AccStats", yaml), &ctx).unwrap_err();
        assert!(matches!(err, StageError::CreateFile { .. }));
        assert!(err.to_string().contains("/nonexistent/dir/acc.tsv"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_summary_names_destination() {
        let ctx = context(header_with(&[("chr1", 100)]));
        let stage = AccStats {
            destination: Box::new(BrokenPipe),
            label: "summary.tsv".to_string(),
            accumulator: AccuracyAccumulator::default(),
        };

        let err = run_stage(Stage::AccStats(stage), vec![unmapped("u1")], &ctx).unwrap_err();
        assert!(matches!(err, StageError::WriteSummary { .. }));
        assert_eq!(err.to_string(), "Failed to write summary to summary.tsv");
    }
}
