//! `AlnContext`: drop records by the reference context around their ends.
//!
//! For a record placed at `[start, end)` (0-based) two windows are examined:
//!
//! - start flank: `[start + LeftShift, start + RightShift)`
//! - end flank: `[end + LeftShift, end + RightShift)`
//!
//! A record is dropped when `RegexStart` matches the start flank or
//! `RegexEnd` matches the end flank. A side without a pattern is not
//! examined, so its window is never fetched.
//!
//! A typical use is removing reads that were likely primed internally on
//! genomic poly-A stretches:
//!
//! ```yaml
//! AlnContext:
//!   Ref: ref.fa
//!   LeftShift: 0
//!   RightShift: 12
//!   RegexEnd: "[Aa]{8,}"
//! ```

use std::path::PathBuf;

use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use regex::bytes::Regex;
use serde::Deserialize;
use tracing::info;

use super::{forward, StageContext, StageError};
use crate::config::{ConfigError, StageParams};
use crate::core::record::placement;
use crate::pipeline::channel::{RecordReceiver, RecordSender};
use crate::reference::{IndexError, ReferenceIndex, DEFAULT_ID_PATTERN};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AlnContextParams {
    /// FASTA file of the reference the records are aligned to
    #[serde(rename = "Ref")]
    pub reference: PathBuf,

    pub left_shift: i64,

    pub right_shift: i64,

    #[serde(default)]
    pub regex_start: Option<String>,

    #[serde(default)]
    pub regex_end: Option<String>,

    /// Pattern whose first group names a contig from its FASTA header line
    #[serde(default)]
    pub id_regexp: Option<String>,
}

/// Which flank caused a record to be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flank {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Drop(Flank),
}

#[derive(Debug)]
pub struct AlnContext {
    index: ReferenceIndex,
    left_shift: i64,
    right_shift: i64,
    start_pattern: Option<Regex>,
    end_pattern: Option<Regex>,
}

impl AlnContext {
    /// # Errors
    ///
    /// Returns `StageError::Config` for missing keys, invalid patterns or a
    /// `RightShift` smaller than `LeftShift`, and `StageError::Index` if the
    /// reference cannot be indexed.
    pub fn from_params(params: &StageParams, ctx: &StageContext) -> Result<Self, StageError> {
        let p: AlnContextParams = params.parse()?;

        if p.right_shift < p.left_shift {
            return Err(ConfigError::InvalidParameters {
                stage: params.stage().to_string(),
                message: format!(
                    "RightShift ({}) must not be smaller than LeftShift ({})",
                    p.right_shift, p.left_shift
                ),
            }
            .into());
        }

        let start_pattern = params.pattern("RegexStart", p.regex_start.as_deref())?;
        let end_pattern = params.pattern("RegexEnd", p.regex_end.as_deref())?;
        let id_pattern = Regex::new(p.id_regexp.as_deref().unwrap_or(DEFAULT_ID_PATTERN))
            .map_err(|source| ConfigError::InvalidPattern {
                stage: params.stage().to_string(),
                key: "IdRegexp".to_string(),
                source,
            })?;

        let index = ReferenceIndex::open(&p.reference, &id_pattern, ctx.silent)?;

        Ok(Self {
            index,
            left_shift: p.left_shift,
            right_shift: p.right_shift,
            start_pattern,
            end_pattern,
        })
    }

    /// Decide whether `record` survives.
    ///
    /// Records without a reference placement are always forwarded.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Index` when a window falls outside its contig or
    /// the contig is missing from the reference, and `StageError::Record` if
    /// the record names a reference absent from `header`.
    pub fn evaluate(&mut self, record: &RecordBuf, header: &sam::Header) -> Result<Decision, StageError> {
        let Some(placement) = placement(record, header)? else {
            return Ok(Decision::Forward);
        };

        let sides = [
            (Flank::Start, placement.start, self.start_pattern.as_ref()),
            (Flank::End, placement.end, self.end_pattern.as_ref()),
        ];

        for (flank, anchor, pattern) in sides {
            let Some(pattern) = pattern else {
                continue;
            };

            let (Some(start), Some(end)) = (
                anchor.checked_add(self.left_shift),
                anchor.checked_add(self.right_shift),
            ) else {
                return Err(IndexError::OutOfBounds {
                    contig: placement.contig.clone(),
                    start: anchor.saturating_add(self.left_shift),
                    end: anchor.saturating_add(self.right_shift),
                    length: self.index.length(&placement.contig).unwrap_or_default(),
                }
                .into());
            };

            let window = self.index.sub_sequence(&placement.contig, start, end)?;

            if pattern.is_match(&window) {
                return Ok(Decision::Drop(flank));
            }
        }

        Ok(Decision::Forward)
    }

    pub(crate) fn run(
        mut self,
        mut input: RecordReceiver,
        output: RecordSender,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        let mut forwarded: u64 = 0;
        let mut dropped_start: u64 = 0;
        let mut dropped_end: u64 = 0;

        while let Some(record) = input.blocking_recv() {
            match self.evaluate(&record, &ctx.header)? {
                Decision::Forward => {
                    forward(&output, record)?;
                    forwarded += 1;
                }
                Decision::Drop(Flank::Start) => dropped_start += 1,
                Decision::Drop(Flank::End) => dropped_end += 1,
            }
        }

        if !ctx.quiet {
            info!(
                stage = "AlnContext",
                rank = ctx.rank,
                forwarded,
                dropped_start,
                dropped_end,
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
    use serde_yaml::Value;
    use std::path::Path;

    const REFERENCE: &[u8] = b">chr1 test contig\nACGTACGTAA\nAAAAAAGGGG\nCCCCTTTTAC\n";

    fn write_reference(dir: &Path) -> PathBuf {
        let path = dir.join("ref.fa");
        std::fs::write(&path, REFERENCE).unwrap();
        path
    }

    fn params(yaml: &str) -> StageParams {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        StageParams::new("AlnContext", value)
    }

    fn stage(reference: &Path, extra: &str) -> AlnContext {
        let yaml = format!("Ref: {}\n{extra}", reference.display());
        let ctx = context(header_with(&[("chr1", 30)]));
        AlnContext::from_params(&params(&yaml), &ctx).unwrap()
    }

    #[test]
    fn test_start_window_is_half_open() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        // Only the exact five bases [0, 5) satisfy this anchored pattern
        let mut filter = stage(&reference, "LeftShift: 0\nRightShift: 5\nRegexStart: '^ACGTA$'\n");
        let record = mapped("r1", 1, &[(Kind::Match, 4)], None);
        assert_eq!(
            filter.evaluate(&record, &header).unwrap(),
            Decision::Drop(Flank::Start)
        );
        assert_eq!(filter.index.sub_sequence("chr1", 0, 5).unwrap(), b"ACGTA");
    }

    #[test]
    fn test_end_flank_match_drops() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        // Record covers [0, 8); end flank [8, 16) is AAAAAAAA
        let mut filter = stage(&reference, "LeftShift: 0\nRightShift: 8\nRegexEnd: 'A{8}'\n");
        let record = mapped("r1", 1, &[(Kind::Match, 8)], None);
        assert_eq!(
            filter.evaluate(&record, &header).unwrap(),
            Decision::Drop(Flank::End)
        );

        // Record covers [12, 20); end flank [20, 28) is CCCCTTTT
        let record = mapped("r2", 13, &[(Kind::Match, 8)], None);
        assert_eq!(filter.evaluate(&record, &header).unwrap(), Decision::Forward);
    }

    #[test]
    fn test_negative_left_shift() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        // Start at 16; window [13, 16) is AAA
        let mut filter = stage(&reference, "LeftShift: -3\nRightShift: 0\nRegexStart: '^AAA$'\n");
        let record = mapped("r1", 17, &[(Kind::Match, 4)], None);
        assert_eq!(
            filter.evaluate(&record, &header).unwrap(),
            Decision::Drop(Flank::Start)
        );
    }

    #[test]
    fn test_out_of_bounds_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        let mut filter = stage(&reference, "LeftShift: -5\nRightShift: 0\nRegexStart: 'A'\n");
        let record = mapped("r1", 1, &[(Kind::Match, 4)], None);
        assert!(matches!(
            filter.evaluate(&record, &header),
            Err(StageError::Index(_))
        ));
    }

    #[test]
    fn test_shift_overflow_is_out_of_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        // end = 4, so end + RightShift does not fit in an i64
        let mut filter = stage(
            &reference,
            "LeftShift: 0\nRightShift: 9223372036854775807\nRegexEnd: 'A'\n",
        );
        let record = mapped("r1", 1, &[(Kind::Match, 4)], None);
        assert!(matches!(
            filter.evaluate(&record, &header),
            Err(StageError::Index(IndexError::OutOfBounds { length: 30, .. }))
        ));
    }

    #[test]
    fn test_unconfigured_side_is_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        // The end window would run past the contig, but no RegexEnd is set
        let mut filter = stage(&reference, "LeftShift: 0\nRightShift: 5\nRegexStart: 'TTTTT'\n");
        let record = mapped("r1", 1, &[(Kind::Match, 28)], None);
        assert_eq!(filter.evaluate(&record, &header).unwrap(), Decision::Forward);
    }

    #[test]
    fn test_unplaced_records_pass() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let header = header_with(&[("chr1", 30)]);

        let mut filter = stage(&reference, "LeftShift: 0\nRightShift: 5\nRegexStart: '.*'\n");
        assert_eq!(
            filter.evaluate(&unmapped("u1"), &header).unwrap(),
            Decision::Forward
        );
    }

    #[test]
    fn test_run_forwards_unchanged_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let ctx = context(header_with(&[("chr1", 30)]));

        let filter = stage(&reference, "LeftShift: 0\nRightShift: 5\nRegexStart: '^ACGTA'\n");
        let records = vec![
            mapped("keep1", 2, &[(Kind::Match, 4)], None),
            mapped("drop1", 1, &[(Kind::Match, 4)], None),
            unmapped("keep2"),
            mapped("keep3", 11, &[(Kind::Match, 4)], None),
        ];
        let expected = vec![records[0].clone(), records[2].clone(), records[3].clone()];

        let out = run_stage(Stage::AlnContext(filter), records, &ctx).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_invalid_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write_reference(dir.path());
        let ctx = context(header_with(&[("chr1", 30)]));

        let cases = [
            format!("Ref: {}\nLeftShift: 5\nRightShift: 0\n", reference.display()),
            format!("Ref: {}\nLeftShift: 0\n", reference.display()),
            format!("Ref: {}\nLeftShift: 0\nRightShift: 5\nRegexStart: '('\n", reference.display()),
            format!("Ref: {}\nLeftShift: 0\nRightShift: 5\nUnknown: 1\n", reference.display()),
        ];

        for yaml in cases {
            assert!(
                matches!(
                    AlnContext::from_params(&params(&yaml), &ctx),
                    Err(StageError::Config(_))
                ),
                "{yaml} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_reference() {
        let ctx = context(header_with(&[("chr1", 30)]));
        let result = AlnContext::from_params(
            &params("Ref: /nonexistent/ref.fa\nLeftShift: 0\nRightShift: 5\n"),
            &ctx,
        );
        assert!(matches!(result, Err(StageError::Index(_))));
    }
}
