//! Binary entry point for deepsearch-rs.

// The binary is the one place that writes to the terminal.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use tracing_subscriber::EnvFilter;

use deepsearch_rs::cli::{Cli, execute};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "deepsearch_rs=debug"
    } else {
        "deepsearch_rs=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
