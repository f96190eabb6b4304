//! Terminal consumer: the node after the last stage.
//!
//! A [`Terminal::Writer`] encodes surviving records as BAM with the input
//! header; a [`Terminal::Sink`] reads and discards them. Either way the
//! destination is finished (BGZF EOF marker written, buffers flushed) before
//! the completion signal fires, so the orchestrator never reports success
//! for a partially written file.

use std::fmt;
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use noodles::sam::alignment::io::Write as _;
use tokio::sync::oneshot;
use tracing::debug;

use super::open_output;
use crate::pipeline::channel::RecordReceiver;
use crate::stages::StageError;

pub enum Terminal {
    /// Discard every record
    Sink,
    /// Encode records as BAM
    Writer {
        destination: BufWriter<Box<dyn Write + Send>>,
        label: String,
        header: sam::Header,
        /// BGZF compression threads
        workers: NonZeroUsize,
    },
}

impl fmt::Debug for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink => f.write_str("Sink"),
            Self::Writer { label, workers, .. } => f
                .debug_struct("Writer")
                .field("destination", label)
                .field("workers", workers)
                .finish_non_exhaustive(),
        }
    }
}

impl Terminal {
    /// A BAM writer over `path` (stdout for `-`). The destination is created
    /// immediately, so callers open it only once every stage is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be created.
    pub fn writer(path: &Path, header: sam::Header, workers: NonZeroUsize) -> std::io::Result<Self> {
        Ok(Self::Writer {
            destination: open_output(path)?,
            label: path.display().to_string(),
            header,
            workers,
        })
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Sink)
    }

    /// Consume `input` until it closes, then signal `done` with the number of
    /// records seen. The signal is only sent on success.
    ///
    /// # Errors
    ///
    /// Returns `StageError::WriteOutput` if encoding or flushing fails.
    pub fn drain(self, mut input: RecordReceiver, done: oneshot::Sender<u64>) -> Result<u64, StageError> {
        let mut count: u64 = 0;

        match self {
            Self::Sink => {
                while input.blocking_recv().is_some() {
                    count += 1;
                }
            }
            Self::Writer {
                destination,
                label,
                header,
                workers,
            } => {
                let write_error = |source| StageError::WriteOutput {
                    destination: label.clone(),
                    source,
                };

                let inner = bgzf::MultithreadedWriter::with_worker_count(workers, destination);
                let mut writer = bam::io::Writer::from(inner);
                writer.write_header(&header).map_err(write_error)?;

                while let Some(record) = input.blocking_recv() {
                    writer
                        .write_alignment_record(&header, &record)
                        .map_err(write_error)?;
                    count += 1;
                }

                let mut destination = writer.into_inner().finish().map_err(write_error)?;
                destination.flush().map_err(write_error)?;
            }
        }

        debug!(records = count, "Terminal consumer finished");

        // The receiver is only gone if the orchestrator already gave up
        let _ = done.send(count);
        Ok(count)
    }
}
