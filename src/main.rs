use clap::Parser;
use tracing_subscriber::EnvFilter;

use bam_toolbox::cli;

fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag. Records may be written to
    // stdout, so logs always go to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("bam_toolbox=debug,info")
    } else {
        EnvFilter::new("bam_toolbox=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        cli::Commands::Run(args) => cli::run::run(args, cli.verbose),
        cli::Commands::Stages => cli::stages(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
