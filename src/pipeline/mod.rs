//! Pipeline orchestration.
//!
//! A run resolves its configuration, opens the input, builds every stage and
//! only then launches the nodes, each on its own blocking task:
//!
//! ```text
//! reader -> stage[0] -> ... -> stage[n-1] -> writer | sink
//! ```
//!
//! Adjacent nodes share one bounded channel. A node that fails returns its
//! error and drops its channel ends; upstream nodes then fail with
//! [`StageError::DownstreamClosed`] and downstream nodes see end-of-stream.
//! Every task is joined before [`run`] returns, and the root cause is the
//! error reported.

pub mod channel;
pub mod topology;

use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{ConfigError, PipelineConfig};
use crate::io::{source, Terminal};
use crate::stages::{StageContext, StageError};
use crate::toolshed::toolshed;
use channel::record_channel;
use topology::PipelinePlan;

/// Default number of runtime worker threads
pub const DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("{node} failed")]
    Stage { node: String, source: StageError },

    #[error("{0} panicked")]
    TaskPanicked(String),
}

impl PipelineError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn is_secondary(&self) -> bool {
        matches!(self, Self::Stage { source, .. } if source.is_secondary())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Suppress per-stage summaries
    pub quiet: bool,
    /// Suppress reference index notices
    pub silent: bool,
    pub threads: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            silent: false,
            threads: DEFAULT_THREADS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The configuration only asked for the stage listing
    Listed,
    /// Every record reached the terminal consumer
    Completed { records_written: u64 },
}

/// Run the pipeline described by `config_text` over `input`, writing to
/// `output` unless the configuration selects the sink.
///
/// # Errors
///
/// Returns `PipelineError::Config` before any record is read if the
/// configuration is invalid, `PipelineError::Io` if the input, output or
/// runtime cannot be set up, and the root-cause node failure otherwise.
pub fn run(config_text: &str, input: &Path, output: &Path, options: &RunOptions) -> Result<Outcome, PipelineError> {
    let config = PipelineConfig::resolve(config_text)?;
    let shed = toolshed();

    // `help` anywhere in the chain answers with the listing and nothing else
    if config.is_listing() {
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(shed.listing().as_bytes())
            .map_err(|e| PipelineError::io("Failed to write stage listing", e))?;
        return Ok(Outcome::Listed);
    }

    let sink = config.sink()?;
    let resolved = topology::resolve(&config, shed)?;
    let workers = NonZeroUsize::new(options.threads).unwrap_or(NonZeroUsize::MIN);

    let source = source::open(input, workers)
        .map_err(|e| PipelineError::io(format!("Failed to open input {}", input.display()), e))?;
    let header = Arc::new(source.header().clone());

    let ctx = StageContext {
        quiet: options.quiet,
        silent: options.silent,
        threads: workers.get(),
        rank: 0,
        header,
        toolshed: shed,
    };

    let plan = PipelinePlan::build(resolved, &ctx)
        .map_err(|(node, source)| PipelineError::Stage { node, source })?;

    // Creating the output truncates it, so this waits for a successful build
    let terminal = if sink {
        Terminal::Sink
    } else {
        Terminal::writer(output, ctx.header.as_ref().clone(), workers)
            .map_err(|e| PipelineError::io(format!("Failed to create output {}", output.display()), e))?
    };

    debug!(
        stages = plan.len(),
        sink,
        input = %input.display(),
        output = %display_output(output, sink).display(),
        "Pipeline built"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(ctx.threads)
        .enable_all()
        .build()
        .map_err(|e| PipelineError::io("Failed to start runtime", e))?;

    let outcome = runtime.block_on(launch(source, plan, terminal, ctx))?;

    if let (Outcome::Completed { records_written }, false) = (outcome, options.quiet) {
        info!(records_written, sink, "Pipeline finished");
    }

    Ok(outcome)
}

fn display_output(output: &Path, sink: bool) -> PathBuf {
    if sink {
        PathBuf::from("(sink)")
    } else {
        output.to_path_buf()
    }
}

type NodeHandle = (String, JoinHandle<Result<(), StageError>>);

async fn launch(
    source: source::RecordSource<source::BamInput>,
    plan: PipelinePlan,
    terminal: Terminal,
    ctx: StageContext,
) -> Result<Outcome, PipelineError> {
    let mut handles: Vec<NodeHandle> = Vec::with_capacity(plan.len() + 2);

    let (tx, mut upstream) = record_channel();
    handles.push((
        "reader".to_string(),
        tokio::task::spawn_blocking(move || source.pump(tx).map(|_| ())),
    ));

    for node in plan.into_nodes() {
        let (tx, rx) = record_channel();
        let input = std::mem::replace(&mut upstream, rx);
        let label = node.to_string();
        let ctx = ctx.with_rank(node.rank);

        handles.push((
            label,
            tokio::task::spawn_blocking(move || node.stage.run(input, tx, &ctx)),
        ));
    }

    let (done_tx, done_rx) = oneshot::channel();
    let terminal_label = if terminal.is_sink() { "sink" } else { "writer" };
    handles.push((
        terminal_label.to_string(),
        tokio::task::spawn_blocking(move || terminal.drain(upstream, done_tx).map(|_| ())),
    ));

    // Resolves on success, or with an error once the terminal task is gone
    let completed = done_rx.await.ok();

    let mut root_cause: Option<PipelineError> = None;
    let mut secondary: Option<PipelineError> = None;

    for (node, handle) in handles {
        let error = match handle.await {
            Ok(Ok(())) => continue,
            Ok(Err(source)) => PipelineError::Stage { node, source },
            Err(_) => PipelineError::TaskPanicked(node),
        };

        let slot = if error.is_secondary() {
            &mut secondary
        } else {
            &mut root_cause
        };
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    if let Some(error) = root_cause.or(secondary) {
        return Err(error);
    }

    completed
        .map(|records_written| Outcome::Completed { records_written })
        .ok_or_else(|| PipelineError::TaskPanicked(terminal_label.to_string()))
}
