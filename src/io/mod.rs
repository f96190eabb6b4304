//! Boundary nodes of a pipeline: the BAM reader feeding the first stage and
//! the terminal consumer draining the last one.
//!
//! Paths equal to `-` mean the standard streams.

pub mod source;
pub mod terminal;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::pipeline::channel::IO_BUFFER_SIZE;

pub use source::RecordSource;
pub use terminal::Terminal;

/// Path meaning stdin for inputs and stdout for outputs
pub const STDIO: &str = "-";

pub fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO
}

/// Open `path` (or stdin) behind a buffered reader
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn open_input(path: &Path) -> io::Result<BufReader<Box<dyn Read + Send>>> {
    let inner: Box<dyn Read + Send> = if is_stdio(path) {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(path)?)
    };
    Ok(BufReader::with_capacity(IO_BUFFER_SIZE, inner))
}

/// Create `path` (or use stdout) behind a buffered writer
///
/// # Errors
///
/// Returns an error if the file cannot be created.
pub fn open_output(path: &Path) -> io::Result<BufWriter<Box<dyn Write + Send>>> {
    let inner: Box<dyn Write + Send> = if is_stdio(path) {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(path)?)
    };
    Ok(BufWriter::with_capacity(IO_BUFFER_SIZE, inner))
}
