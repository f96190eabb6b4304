//! # bam-toolbox
//!
//! A library for streaming BAM records through configurable chains of
//! filtering and summarizing stages.
//!
//! A chain is described by a YAML mapping. Its keys name stages from the
//! toolshed in the order records flow through them, and its values are each
//! stage's parameters:
//!
//! ```yaml
//! AlnContext:
//!   Ref: ref.fa
//!   LeftShift: 0
//!   RightShift: 12
//!   RegexEnd: "[Aa]{8,}"
//! AccStats:
//!   Tsv: accuracy.tsv
//! Sink: true
//! ```
//!
//! Every stage runs concurrently, connected to its neighbours by bounded
//! channels, so memory use stays flat regardless of input size.
//!
//! ## Stages
//!
//! - **AlnContext**: Drop records whose reference context at the start or end
//!   matches a pattern
//! - **AccStats**: Mean alignment accuracy, plain and weighted by aligned length
//! - **help**: List all stages
//!
//! ## Example
//!
//! ```rust,no_run
//! use bam_toolbox::pipeline::{self, Outcome, RunOptions};
//! use std::path::Path;
//!
//! let outcome = pipeline::run(
//!     "AccStats:\n  Tsv: accuracy.tsv\nSink: true\n",
//!     Path::new("aligned.bam"),
//!     Path::new("-"),
//!     &RunOptions::default(),
//! )
//! .unwrap();
//!
//! if let Outcome::Completed { records_written } = outcome {
//!     println!("{records_written} records written");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration documents and per-stage parameters
//! - [`core`]: Alignment record access helpers
//! - [`io`]: BAM reader, writer and sink nodes
//! - [`pipeline`]: Topology construction and concurrent execution
//! - [`reference`]: Indexed random access into FASTA references
//! - [`stages`]: Stage implementations
//! - [`toolshed`]: The registry of available stages
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod reference;
pub mod stages;
pub mod toolshed;

// Re-export commonly used types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{Outcome, PipelineError, RunOptions};
pub use reference::ReferenceIndex;
pub use toolshed::{toolshed, StageKind};
