//! Building, writing and loading the positional sidecar index.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use noodles::fasta::fai;
use regex::bytes::Regex;

use super::index::IndexError;

/// Identifier pattern applied to FASTA header lines: the first
/// whitespace-delimited word.
pub const DEFAULT_ID_PATTERN: &str = r"^(\S+)\s?";

/// Suffix appended to the FASTA path to name its sidecar
pub const SIDECAR_SUFFIX: &str = ".toolbox.fai";

#[must_use]
pub fn sidecar_path(fasta: &Path) -> PathBuf {
    let mut name = fasta.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Apply the identifier pattern to a header line (without the leading `>`).
/// Falls back to the trimmed header when the pattern has no first group match.
fn contig_name(header: &[u8], id_pattern: &Regex) -> String {
    let id = id_pattern
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| header.trim_ascii(), |m| m.as_bytes());
    String::from_utf8_lossy(id).to_string()
}

/// Strip a trailing `\n` or `\r\n`, nothing else
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Contig currently being scanned
struct Pending {
    name: String,
    length: u64,
    offset: u64,
    line_bases: u64,
    line_width: u64,
    /// Whether any sequence line was seen yet
    started: bool,
    /// Set once a line shorter than `line_bases` was seen
    short_line_seen: bool,
}

impl Pending {
    fn new(name: String, offset: u64) -> Self {
        Self {
            name,
            length: 0,
            offset,
            line_bases: 0,
            line_width: 0,
            started: false,
            short_line_seen: false,
        }
    }

    fn push_line(&mut self, bases: u64, width: u64) -> Result<(), IndexError> {
        if self.short_line_seen {
            return Err(IndexError::InconsistentLineLength(self.name.clone()));
        }

        if !self.started {
            self.line_bases = bases;
            self.line_width = width;
            self.started = true;
        } else if bases > self.line_bases || (bases == self.line_bases && width != self.line_width) {
            return Err(IndexError::InconsistentLineLength(self.name.clone()));
        }

        if bases < self.line_bases {
            self.short_line_seen = true;
        }

        self.length += bases;
        Ok(())
    }

    fn into_record(self) -> fai::Record {
        fai::Record::new(
            self.name,
            self.length,
            self.offset,
            self.line_bases,
            self.line_width,
        )
    }
}

/// Scan a FASTA file and compute the layout of every contig.
///
/// # Errors
///
/// Returns `IndexError::ReadFasta` on read failure, `IndexError::InvalidFasta`
/// if sequence data precedes the first header, `IndexError::InconsistentLineLength`
/// if a contig has ragged interior lines, and `IndexError::DuplicateContig` if
/// two headers normalize to the same name.
pub fn build_index(fasta: &Path, id_pattern: &Regex) -> Result<fai::Index, IndexError> {
    let read_error = |source| IndexError::ReadFasta {
        path: fasta.to_path_buf(),
        source,
    };

    let mut reader = File::open(fasta).map(BufReader::new).map_err(read_error)?;
    let mut records: Vec<fai::Record> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut pending: Option<Pending> = None;
    let mut position: u64 = 0;
    let mut line = Vec::new();

    let mut finish = |pending: Option<Pending>, records: &mut Vec<fai::Record>| -> Result<(), IndexError> {
        if let Some(p) = pending {
            if !seen.insert(p.name.clone()) {
                return Err(IndexError::DuplicateContig(p.name));
            }
            records.push(p.into_record());
        }
        Ok(())
    };

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).map_err(read_error)?;
        if n == 0 {
            break;
        }
        let width = n as u64;
        position += width;

        if let Some(header) = line.strip_prefix(b">") {
            finish(pending.take(), &mut records)?;
            let header = header.trim_ascii_end();
            pending = Some(Pending::new(contig_name(header, id_pattern), position));
            continue;
        }

        let bases = strip_terminator(&line).len() as u64;
        match pending.as_mut() {
            Some(p) if bases > 0 => p.push_line(bases, width)?,
            Some(p) => p.short_line_seen = true,
            None if bases == 0 => {}
            None => {
                return Err(IndexError::InvalidFasta(format!(
                    "{}: sequence data before the first header",
                    fasta.display()
                )))
            }
        }
    }

    finish(pending.take(), &mut records)?;
    Ok(fai::Index::from(records))
}

/// Write an index in FAI layout.
///
/// # Errors
///
/// Returns `IndexError::WriteIndex` if the file cannot be created or written.
pub fn write_sidecar(path: &Path, index: &fai::Index) -> Result<(), IndexError> {
    let write = || -> std::io::Result<()> {
        let mut writer = File::create(path).map(BufWriter::new).map(fai::io::Writer::new)?;
        writer.write_index(index)?;
        writer.get_mut().flush()
    };

    write().map_err(|source| IndexError::WriteIndex {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a sidecar written by [`write_sidecar`] (or any FAI file).
///
/// # Errors
///
/// Returns `IndexError::ReadIndex` if the file cannot be read or parsed and
/// `IndexError::InvalidIndex` if a non-empty contig has an impossible line
/// layout.
pub fn read_sidecar(path: &Path) -> Result<fai::Index, IndexError> {
    let index = File::open(path)
        .map(BufReader::new)
        .map(fai::io::Reader::new)
        .and_then(|mut reader| reader.read_index())
        .map_err(|source| IndexError::ReadIndex {
            path: path.to_path_buf(),
            source,
        })?;

    for record in index.as_ref() {
        if record.length() > 0
            && (record.line_bases() == 0 || record.line_width() < record.line_bases())
        {
            return Err(IndexError::InvalidIndex {
                path: path.to_path_buf(),
                message: format!(
                    "contig '{}' has {} bases per line and {} bytes per line",
                    String::from_utf8_lossy(record.name()),
                    record.line_bases(),
                    record.line_width()
                ),
            });
        }
    }

    Ok(index)
}
