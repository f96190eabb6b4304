use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use crate::pipeline::{self, Outcome, RunOptions, DEFAULT_THREADS};

#[derive(Args)]
pub struct RunArgs {
    /// Stage chain as YAML text, `Yaml: <path>` to read it from a file, or
    /// `help` to list the available stages
    #[arg(required = true)]
    pub config: String,

    /// Input BAM file. Use '-' for stdin
    #[arg(short, long, default_value = "-")]
    pub input: PathBuf,

    /// Output BAM file. Use '-' for stdout. Ignored with `Sink: true`
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Do not log per-stage summaries
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not log reference index notices
    #[arg(short, long)]
    pub silent: bool,

    /// Worker threads for the runtime and BGZF compression
    #[arg(short = 'j', long, default_value_t = DEFAULT_THREADS)]
    pub threads: usize,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            quiet: self.quiet,
            silent: self.silent,
            threads: self.threads,
        }
    }
}

pub fn run(args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let outcome = pipeline::run(&args.config, &args.input, &args.output, &args.options())
        .context("Pipeline failed")?;

    if verbose {
        if let Outcome::Completed { records_written } = outcome {
            info!(
                records_written,
                input = %args.input.display(),
                "Records reached the end of the chain"
            );
        }
    }

    Ok(())
}
