//! Stage implementations.
//!
//! Every stage follows the same contract: it is built from its parameters
//! and the shared [`StageContext`] before any record flows, then [`Stage::run`]
//! consumes its input channel until it closes, forwarding surviving records to
//! its output channel. Returning from `run` drops the output sender, which
//! closes the channel for the next node.
//!
//! Stages run on blocking threads and use the blocking channel operations.

pub mod acc_stats;
pub mod aln_context;

use std::path::PathBuf;
use std::sync::Arc;

use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use thiserror::Error;

use crate::config::{ConfigError, StageParams};
use crate::core::record::RecordError;
use crate::pipeline::channel::{RecordReceiver, RecordSender};
use crate::reference::IndexError;
use crate::toolshed::{StageKind, Toolshed};

pub use acc_stats::AccStats;
pub use aln_context::AlnContext;

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Failed to create {path}")]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write summary to {destination}")]
    WriteSummary {
        destination: String,
        source: std::io::Error,
    },

    #[error("Failed to read records from {input}")]
    ReadInput {
        input: String,
        source: std::io::Error,
    },

    #[error("Failed to write records to {destination}")]
    WriteOutput {
        destination: String,
        source: std::io::Error,
    },

    #[error("downstream stage closed its input")]
    DownstreamClosed,
}

impl StageError {
    /// Errors that only happen because another node failed first
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::DownstreamClosed)
    }
}

/// Run-wide settings shared by every stage
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Suppress per-stage summaries
    pub quiet: bool,
    /// Suppress reference index notices
    pub silent: bool,
    pub threads: usize,
    /// Zero-based position in the chain
    pub rank: usize,
    /// Header of the input stream
    pub header: Arc<sam::Header>,
    pub toolshed: &'static Toolshed,
}

impl StageContext {
    #[must_use]
    pub fn with_rank(&self, rank: usize) -> Self {
        Self {
            rank,
            ..self.clone()
        }
    }
}

/// A built stage, ready to run
#[derive(Debug)]
pub enum Stage {
    AlnContext(AlnContext),
    AccStats(AccStats),
}

impl Stage {
    /// Build the stage registered as `kind` from its parameters.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Config` for invalid parameters and whatever the
    /// stage's setup raises (reference indexing, opening output files).
    /// The listing request is answered before any stage is built, so asking
    /// to build it is a configuration error.
    pub fn build(kind: StageKind, params: &StageParams, ctx: &StageContext) -> Result<Self, StageError> {
        Ok(match kind {
            StageKind::AlnContext => Self::AlnContext(AlnContext::from_params(params, ctx)?),
            StageKind::AccStats => Self::AccStats(AccStats::from_params(params, ctx)?),
            StageKind::Listing => {
                return Err(ConfigError::InvalidParameters {
                    stage: params.stage().to_string(),
                    message: "only valid as a listing request".to_string(),
                }
                .into())
            }
        })
    }

    /// Consume `input` until it closes, forwarding survivors to `output`.
    ///
    /// # Errors
    ///
    /// Returns the first error the stage hits; the output channel is closed
    /// either way.
    pub fn run(self, input: RecordReceiver, output: RecordSender, ctx: &StageContext) -> Result<(), StageError> {
        match self {
            Self::AlnContext(stage) => stage.run(input, output, ctx),
            Self::AccStats(stage) => stage.run(input, output, ctx),
        }
    }
}

/// Send a record downstream, blocking while the channel is full
pub(crate) fn forward(output: &RecordSender, record: RecordBuf) -> Result<(), StageError> {
    output
        .blocking_send(record)
        .map_err(|_| StageError::DownstreamClosed)
}
