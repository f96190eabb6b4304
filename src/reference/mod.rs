//! Random-access reference sequence lookups.
//!
//! A [`ReferenceIndex`] wraps a plain (uncompressed) FASTA file together with
//! a positional sidecar index stored next to it as `<fasta>.toolbox.fai`.
//! The sidecar uses the standard five-column FAI layout:
//!
//! | Column | Meaning |
//! |--------|---------|
//! | 1 | Contig name, normalized through the identifier pattern |
//! | 2 | Contig length in bases |
//! | 3 | Byte offset of the first base |
//! | 4 | Bases per line |
//! | 5 | Bytes per line, line terminator included |
//!
//! ## Example
//!
//! ```rust,no_run
//! use bam_toolbox::reference::{ReferenceIndex, DEFAULT_ID_PATTERN};
//! use regex::bytes::Regex;
//! use std::path::Path;
//!
//! let pattern = Regex::new(DEFAULT_ID_PATTERN).unwrap();
//! let mut index = ReferenceIndex::open(Path::new("ref.fa"), &pattern, false).unwrap();
//! let flank = index.sub_sequence("chr1", 100, 110).unwrap();
//! ```

pub mod index;
pub mod sidecar;

pub use index::{IndexError, ReferenceIndex};
pub use sidecar::{sidecar_path, DEFAULT_ID_PATTERN};
