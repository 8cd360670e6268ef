//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// deepsearch-rs: agentic multi-hop retrieval and question answering.
///
/// Decomposes a question into sub-queries, retrieves evidence from
/// vector and crawl backends over multiple reasoning steps, and
/// synthesizes a cited answer.
#[derive(Parser, Debug)]
#[command(name = "deepsearch-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question through the iterative retrieval loop.
    #[command(after_help = r#"Examples:
  deepsearch-rs query "What is the capital of the country that hosted the 2024 Summer Olympics?"
  deepsearch-rs query "..." --max-iterations 6 --fan-out 3
  deepsearch-rs query "..." --backends vector --collection papers
  deepsearch-rs query "..." --strict --trace
  deepsearch-rs --format json query "..." | jq '.answer.citations'

Endpoints come from --vector-endpoint / --crawl-endpoint or the
DEEPSEARCH_VECTOR_ENDPOINT / DEEPSEARCH_CRAWL_ENDPOINT variables.
"#)]
    Query {
        /// The question to answer.
        question: String,

        /// Maximum reasoning steps.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Wall-clock budget for the whole session, in seconds.
        #[arg(long)]
        time_budget: Option<u64>,

        /// Maximum sub-queries per planning round.
        #[arg(long)]
        fan_out: Option<usize>,

        /// Results requested per sub-query/backend pair.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Comma-separated backend kinds to dispatch to (vector, crawl).
        ///
        /// Defaults to every backend with a configured endpoint.
        #[arg(long)]
        backends: Option<String>,

        /// Vector search service endpoint.
        #[arg(long, env = "DEEPSEARCH_VECTOR_ENDPOINT")]
        vector_endpoint: Option<String>,

        /// Collection to scope vector search to.
        #[arg(short, long)]
        collection: Option<String>,

        /// Crawl search service endpoint.
        #[arg(long, env = "DEEPSEARCH_CRAWL_ENDPOINT")]
        crawl_endpoint: Option<String>,

        /// API key for the crawl service.
        #[arg(long, env = "DEEPSEARCH_CRAWL_API_KEY", hide_env_values = true)]
        crawl_api_key: Option<String>,

        /// Directory with prompt template overrides.
        #[arg(long, env = "DEEPSEARCH_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,

        /// Fail instead of answering low-confidence when no evidence
        /// was retrieved.
        #[arg(long)]
        strict: bool,

        /// How to treat claims with no surviving citation (flag, omit).
        #[arg(long)]
        uncited: Option<String>,

        /// Include the per-step session trace in the output.
        #[arg(long)]
        trace: bool,
    },

    /// Configuration inspection.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Write default prompt templates for customization.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  deepsearch-rs init-prompts                       # ~/.config/deepsearch-rs/prompts
  deepsearch-rs init-prompts --dir ./my-prompts    # custom directory
"#)]
    InitPrompts {
        /// Target directory (defaults to the user config directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration (API key redacted).
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_parses_flags() {
        let cli = Cli::try_parse_from([
            "deepsearch-rs",
            "query",
            "what is this?",
            "--max-iterations",
            "6",
            "--fan-out",
            "2",
            "--strict",
            "--trace",
        ])
        .unwrap_or_else(|e| unreachable!("{e}"));
        match cli.command {
            Commands::Query {
                question,
                max_iterations,
                fan_out,
                strict,
                trace,
                ..
            } => {
                assert_eq!(question, "what is this?");
                assert_eq!(max_iterations, Some(6));
                assert_eq!(fan_out, Some(2));
                assert!(strict);
                assert!(trace);
            }
            Commands::Config(_) | Commands::InitPrompts { .. } => unreachable!(),
        }
    }

    #[test]
    fn test_global_format_flag() {
        let cli = Cli::try_parse_from(["deepsearch-rs", "--format", "json", "config", "show"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(cli.format, "json");
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show)));
    }
}
