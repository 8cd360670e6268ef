//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Commands return
//! their rendered output as a string; the binary entry point is the
//! only place that writes to stdout.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::client::create_provider;
use crate::agent::config::{SessionConfig, UncitedPolicy};
use crate::agent::orchestrator::SessionOrchestrator;
use crate::agent::prompt::PromptSet;
use crate::backend::{BackendKind, CrawlBackend, RetrievalBackend, VectorBackend};
use crate::cli::output::{OutputFormat, format_answer, format_config};
use crate::cli::parser::{Cli, Commands, ConfigCommands};
use crate::error::SearchError;
use crate::session::Question;

/// Backend wiring for the query command, taken from CLI flags and
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct BackendParams<'a> {
    /// Comma-separated backend kinds to dispatch to.
    pub backends: Option<&'a str>,
    /// Vector search service endpoint.
    pub vector_endpoint: Option<&'a str>,
    /// Collection to scope vector search to.
    pub collection: Option<&'a str>,
    /// Crawl search service endpoint.
    pub crawl_endpoint: Option<&'a str>,
    /// API key for the crawl service.
    pub crawl_api_key: Option<&'a str>,
}

/// Executes the parsed CLI command and returns its rendered output.
///
/// # Errors
///
/// Returns [`SearchError`] for configuration problems, unrecoverable
/// provider failures, or strict-mode empty evidence.
pub async fn execute(cli: &Cli) -> Result<String, SearchError> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Query {
            question,
            max_iterations,
            time_budget,
            fan_out,
            top_k,
            backends,
            vector_endpoint,
            collection,
            crawl_endpoint,
            crawl_api_key,
            prompt_dir,
            strict,
            uncited,
            trace,
        } => {
            let config = build_config(QueryOverrides {
                max_iterations: *max_iterations,
                time_budget: *time_budget,
                fan_out: *fan_out,
                top_k: *top_k,
                prompt_dir: prompt_dir.as_deref(),
                strict: *strict,
                uncited: uncited.as_deref(),
            })?;
            let backend_params = BackendParams {
                backends: backends.as_deref(),
                vector_endpoint: vector_endpoint.as_deref(),
                collection: collection.as_deref(),
                crawl_endpoint: crawl_endpoint.as_deref(),
                crawl_api_key: crawl_api_key.as_deref(),
            };
            cmd_query(question, config, &backend_params, *trace, format).await
        }
        Commands::Config(ConfigCommands::Show) => cmd_config_show(format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref()),
    }
}

/// Per-invocation overrides on top of environment configuration.
struct QueryOverrides<'a> {
    max_iterations: Option<usize>,
    time_budget: Option<u64>,
    fan_out: Option<usize>,
    top_k: Option<usize>,
    prompt_dir: Option<&'a std::path::Path>,
    strict: bool,
    uncited: Option<&'a str>,
}

fn build_config(overrides: QueryOverrides<'_>) -> Result<SessionConfig, SearchError> {
    let mut builder = SessionConfig::builder().from_env();

    if let Some(n) = overrides.max_iterations {
        builder = builder.max_iterations(n);
    }
    if let Some(secs) = overrides.time_budget {
        builder = builder.time_budget(Duration::from_secs(secs));
    }
    if let Some(n) = overrides.fan_out {
        builder = builder.fan_out(n);
    }
    if let Some(n) = overrides.top_k {
        builder = builder.top_k(n);
    }
    if let Some(dir) = overrides.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if overrides.strict {
        builder = builder.strict_empty_evidence(true);
    }
    if let Some(name) = overrides.uncited {
        let policy = UncitedPolicy::parse(name).ok_or_else(|| SearchError::Config {
            message: format!("unknown uncited policy: {name} (expected flag or omit)"),
        })?;
        builder = builder.uncited_policy(policy);
    }

    builder.build()
}

/// Builds the backend set from endpoints, honoring the kind filter.
fn build_backends(
    params: &BackendParams<'_>,
) -> Result<Vec<Arc<dyn RetrievalBackend>>, SearchError> {
    let allowed: Option<Vec<BackendKind>> = match params.backends {
        Some(list) => {
            let mut kinds = Vec::new();
            for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let kind = BackendKind::parse(name).ok_or_else(|| SearchError::Config {
                    message: format!("unknown backend kind: {name} (expected vector or crawl)"),
                })?;
                kinds.push(kind);
            }
            Some(kinds)
        }
        None => None,
    };
    let allows = |kind: BackendKind| allowed.as_ref().is_none_or(|kinds| kinds.contains(&kind));

    let mut backends: Vec<Arc<dyn RetrievalBackend>> = Vec::new();
    if let Some(endpoint) = params.vector_endpoint
        && allows(BackendKind::Vector)
    {
        backends.push(Arc::new(VectorBackend::new(
            endpoint,
            params.collection.map(str::to_string),
        )));
    }
    if let Some(endpoint) = params.crawl_endpoint
        && allows(BackendKind::Crawl)
    {
        backends.push(Arc::new(CrawlBackend::new(
            endpoint,
            params.crawl_api_key.map(str::to_string),
        )));
    }

    if backends.is_empty() {
        return Err(SearchError::Config {
            message: "no retrieval backend configured; set --vector-endpoint or \
                      --crawl-endpoint (or the DEEPSEARCH_*_ENDPOINT variables)"
                .to_string(),
        });
    }
    Ok(backends)
}

async fn cmd_query(
    question: &str,
    config: SessionConfig,
    params: &BackendParams<'_>,
    include_trace: bool,
    format: OutputFormat,
) -> Result<String, SearchError> {
    if question.trim().is_empty() {
        return Err(SearchError::Config {
            message: "question text is empty".to_string(),
        });
    }

    let backends = build_backends(params)?;
    let provider = create_provider(&config)?;
    let orchestrator = SessionOrchestrator::new(config, provider, backends);

    let (answer, trace) = orchestrator.run(Question::new(question)).await?;
    Ok(format_answer(&answer, &trace, include_trace, format))
}

fn cmd_config_show(format: OutputFormat) -> Result<String, SearchError> {
    // A missing API key should not prevent inspecting the rest of the
    // resolved configuration.
    let config = match SessionConfig::builder().from_env().build() {
        Ok(config) => config,
        Err(SearchError::ApiKeyMissing) => {
            SessionConfig::builder().from_env().api_key("").build()?
        }
        Err(e) => return Err(e),
    };
    Ok(format_config(&config, format))
}

fn cmd_init_prompts(dir: Option<&std::path::Path>) -> Result<String, SearchError> {
    let target = dir
        .map(std::path::Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| SearchError::Config {
            message: "could not determine a prompt directory; pass --dir".to_string(),
        })?;

    let written = PromptSet::write_defaults(&target).map_err(|e| SearchError::Config {
        message: format!("failed to write prompt templates: {e}"),
    })?;

    if written.is_empty() {
        return Ok(format!(
            "All prompt templates already exist in {}\n",
            target.display()
        ));
    }
    let mut out = format!("Wrote {} prompt template(s) to {}:\n", written.len(), target.display());
    for path in written {
        out.push_str("  ");
        out.push_str(&path.display().to_string());
        out.push('\n');
    }
    Ok(out)
}
