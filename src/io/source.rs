//! BAM input node.

use std::io::{self, BufReader, Read};
use std::num::NonZeroUsize;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use tracing::debug;

use super::open_input;
use crate::pipeline::channel::RecordSender;
use crate::stages::{forward, StageError};

/// BGZF stream decompressed by a pool of worker threads
pub type BamInput = bgzf::MultithreadedReader<BufReader<Box<dyn Read + Send>>>;

/// An opened BAM stream whose header has already been read
pub struct RecordSource<R> {
    reader: bam::io::Reader<R>,
    header: sam::Header,
    label: String,
}

/// Open `path` (or stdin for `-`) as BAM and read its header. BGZF blocks
/// are inflated by `workers` threads.
///
/// # Errors
///
/// Returns an error if the input cannot be opened or its header is not
/// valid BAM.
pub fn open(path: &Path, workers: NonZeroUsize) -> io::Result<RecordSource<BamInput>> {
    let inner = bgzf::MultithreadedReader::with_worker_count(workers, open_input(path)?);
    RecordSource::from_reader(bam::io::Reader::from(inner), path.display().to_string())
}

impl<R: Read> RecordSource<R> {
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    pub fn from_reader(mut reader: bam::io::Reader<R>, label: impl Into<String>) -> io::Result<Self> {
        let header = reader.read_header()?;
        Ok(Self {
            reader,
            header,
            label: label.into(),
        })
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }

    /// Decode every record and send it into `output` in input order. The
    /// channel closes when this returns.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ReadInput` on a decoding failure and
    /// `StageError::DownstreamClosed` if the first stage stopped reading.
    pub fn pump(mut self, output: RecordSender) -> Result<u64, StageError> {
        let mut count: u64 = 0;

        for result in self.reader.record_bufs(&self.header) {
            let record = result.map_err(|source| StageError::ReadInput {
                input: self.label.clone(),
                source,
            })?;
            forward(&output, record)?;
            count += 1;
        }

        debug!(records = count, "Input exhausted");
        Ok(count)
    }
}
