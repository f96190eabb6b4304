use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use noodles::core::{Position, Region};
use noodles::fasta::io::IndexedReader;
use regex::bytes::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::sidecar::{build_index, read_sidecar, sidecar_path, write_sidecar};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read reference {path}")]
    ReadFasta { path: PathBuf, source: io::Error },

    #[error("Failed to write reference index {path}")]
    WriteIndex { path: PathBuf, source: io::Error },

    #[error("Failed to load reference index {path}")]
    ReadIndex { path: PathBuf, source: io::Error },

    #[error("Invalid reference index {path}: {message}")]
    InvalidIndex { path: PathBuf, message: String },

    #[error("Invalid FASTA: {0}")]
    InvalidFasta(String),

    #[error("Contig '{0}' has lines of inconsistent length")]
    InconsistentLineLength(String),

    #[error("Contig '{0}' appears more than once")]
    DuplicateContig(String),

    #[error("Contig '{0}' not found in reference index")]
    UnknownContig(String),

    #[error("Window [{start}, {end}) is out of bounds for contig '{contig}' of length {length}")]
    OutOfBounds {
        contig: String,
        start: i64,
        end: i64,
        length: u64,
    },

    #[error("Failed to fetch {contig}:[{start}, {end}) from {path}")]
    Fetch {
        path: PathBuf,
        contig: String,
        start: i64,
        end: i64,
        source: io::Error,
    },
}

/// An indexed FASTA file supporting sub-sequence retrieval
pub struct ReferenceIndex {
    fasta: PathBuf,
    lengths: HashMap<String, u64>,
    reader: IndexedReader<BufReader<File>>,
}

impl fmt::Debug for ReferenceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceIndex")
            .field("fasta", &self.fasta)
            .field("contigs", &self.lengths.len())
            .finish_non_exhaustive()
    }
}

impl ReferenceIndex {
    /// Open `fasta`, building its sidecar index if needed.
    ///
    /// A missing sidecar is built by scanning the FASTA with `id_pattern`
    /// normalizing header lines into contig names. An existing sidecar is
    /// loaded as is, unless it is older than the FASTA, in which case it is
    /// rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if the FASTA cannot be read or indexed, or the
    /// sidecar cannot be written or parsed.
    pub fn open(fasta: &Path, id_pattern: &Regex, silent: bool) -> Result<Self, IndexError> {
        let sidecar = sidecar_path(fasta);

        let index = if sidecar.exists() && !is_stale(&sidecar, fasta)? {
            debug!(sidecar = %sidecar.display(), "Loading reference index");
            read_sidecar(&sidecar)?
        } else {
            if sidecar.exists() {
                warn!(
                    sidecar = %sidecar.display(),
                    "Reference index is older than its FASTA, rebuilding"
                );
            } else if !silent {
                info!("Creating reference index for {}", fasta.display());
            }
            let index = build_index(fasta, id_pattern)?;
            write_sidecar(&sidecar, &index)?;
            index
        };

        let lengths = index
            .as_ref()
            .iter()
            .map(|record| (String::from_utf8_lossy(record.name()).to_string(), record.length()))
            .collect();

        let inner = File::open(fasta)
            .map(BufReader::new)
            .map_err(|source| IndexError::ReadFasta {
                path: fasta.to_path_buf(),
                source,
            })?;

        Ok(Self {
            fasta: fasta.to_path_buf(),
            lengths,
            reader: IndexedReader::new(inner, index),
        })
    }

    /// Number of bases in `contig`, if indexed
    pub fn length(&self, contig: &str) -> Option<u64> {
        self.lengths.get(contig).copied()
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Fetch the bases of `contig` in the 0-based half-open window
    /// `[start, end)`, exactly as stored in the FASTA.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::UnknownContig` for names missing from the index,
    /// `IndexError::OutOfBounds` if `start < 0`, `end < start` or
    /// `end > length`, and `IndexError::Fetch` on read failure.
    pub fn sub_sequence(&mut self, contig: &str, start: i64, end: i64) -> Result<Vec<u8>, IndexError> {
        let length = self
            .length(contig)
            .ok_or_else(|| IndexError::UnknownContig(contig.to_string()))?;

        let out_of_bounds = || IndexError::OutOfBounds {
            contig: contig.to_string(),
            start,
            end,
            length,
        };

        let first = u64::try_from(start).map_err(|_| out_of_bounds())?;
        let last = u64::try_from(end).map_err(|_| out_of_bounds())?;
        if last < first || last > length {
            return Err(out_of_bounds());
        }
        if first == last {
            return Ok(Vec::new());
        }

        // 0-based [first, last) is 1-based [first + 1, last]
        let position = |n: u64| usize::try_from(n).ok().and_then(Position::new);
        let (Some(from), Some(to)) = (position(first + 1), position(last)) else {
            return Err(out_of_bounds());
        };
        let region = Region::new(contig, from..=to);

        let record = self.reader.query(&region).map_err(|source| IndexError::Fetch {
            path: self.fasta.clone(),
            contig: contig.to_string(),
            start,
            end,
            source,
        })?;

        let bases: &[u8] = record.sequence().as_ref();
        Ok(bases.to_vec())
    }
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

fn is_stale(sidecar: &Path, fasta: &Path) -> Result<bool, IndexError> {
    let sidecar_time = modified(sidecar).map_err(|source| IndexError::ReadIndex {
        path: sidecar.to_path_buf(),
        source,
    })?;
    let fasta_time = modified(fasta).map_err(|source| IndexError::ReadFasta {
        path: fasta.to_path_buf(),
        source,
    })?;
    Ok(sidecar_time < fasta_time)
}
