//! Command-line interface for bam-toolbox.
//!
//! Available commands:
//!
//! - **run**: Stream a BAM file through a chain of stages described in YAML
//! - **stages**: List every stage the toolshed provides
//!
//! ## Usage
//!
//! ```text
//! # Drop reads primed on genomic poly-A, then report accuracy
//! bam-toolbox run "
//! AlnContext: {Ref: ref.fa, LeftShift: 0, RightShift: 12, RegexEnd: '[Aa]{8,}'}
//! AccStats: {Tsv: accuracy.tsv}
//! " -i aligned.bam -o filtered.bam
//!
//! # Configuration kept in a file
//! bam-toolbox run "Yaml: pipeline.yaml" -i aligned.bam -o filtered.bam
//!
//! # Statistics only, no output BAM
//! samtools view -b aligned.bam | bam-toolbox run "{AccStats: {}, Sink: true}"
//! ```

use std::path::Path;

use clap::{Parser, Subcommand};

use crate::io::STDIO;
use crate::pipeline::RunOptions;

pub mod run;

#[derive(Parser)]
#[command(name = "bam-toolbox")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Filter and summarize BAM records through configurable stage chains")]
#[command(
    long_about = "bam-toolbox streams alignment records from a BAM file through a chain of stages.\n\nThe chain is a YAML mapping whose keys name the stages in order and whose values are their parameters. The reserved key 'Sink: true' discards the surviving records instead of writing them."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a stage chain over a BAM stream
    Run(run::RunArgs),

    /// List all stages with their description
    Stages,
}

/// Same as `run help`: list the toolshed on stderr
pub fn stages() -> anyhow::Result<()> {
    crate::pipeline::run(
        crate::config::LISTING_REQUEST,
        Path::new(STDIO),
        Path::new(STDIO),
        &RunOptions::default(),
    )?;
    Ok(())
}
