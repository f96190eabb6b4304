//! Record channels connecting adjacent pipeline nodes.

use noodles::sam::alignment::RecordBuf;
use tokio::sync::mpsc;

/// Capacity of every inter-stage channel, in records
pub const CHANNEL_CAPACITY: usize = 5000;

/// I/O buffer size used by the BAM reader and writer
pub const IO_BUFFER_SIZE: usize = 128 * 1024;

pub type RecordSender = mpsc::Sender<RecordBuf>;
pub type RecordReceiver = mpsc::Receiver<RecordBuf>;

/// A bounded channel with the pipeline-wide capacity
#[must_use]
pub fn record_channel() -> (RecordSender, RecordReceiver) {
    mpsc::channel(CHANNEL_CAPACITY)
}
