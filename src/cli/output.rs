//! Output formatting for CLI results.
//!
//! Text for humans, JSON for pipelines. Every command renders through
//! here so `--format json` output is machine-stable.

use std::fmt::Write;

use serde_json::json;

use crate::agent::config::SessionConfig;
use crate::session::{Answer, SessionTrace};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Single JSON document.
    Json,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Formats a final answer, optionally with the full session trace.
#[must_use]
pub fn format_answer(
    answer: &Answer,
    trace: &SessionTrace,
    include_trace: bool,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => format_answer_text(answer, trace, include_trace),
        OutputFormat::Json => {
            let mut doc = json!({ "answer": answer });
            if include_trace {
                doc["trace"] = serde_json::to_value(trace).unwrap_or_default();
            }
            serde_json::to_string_pretty(&doc).unwrap_or_default()
        }
    }
}

fn format_answer_text(answer: &Answer, trace: &SessionTrace, include_trace: bool) -> String {
    let mut out = String::new();

    if answer.low_confidence {
        out.push_str("[low confidence]\n");
    }
    out.push_str(&answer.text);
    out.push('\n');

    if !answer.citations.is_empty() {
        out.push_str("\nSources:\n");
        for (i, citation) in answer.citations.iter().enumerate() {
            let _ = write!(out, "  [{}] {}", i + 1, citation.source_ids.join(", "));
            if let Some(ref claim) = citation.claim {
                let _ = write!(out, " — {claim}");
            }
            out.push('\n');
        }
    }

    if !answer.unsupported_claims.is_empty() {
        out.push_str("\nUnsupported claims:\n");
        for claim in &answer.unsupported_claims {
            let _ = writeln!(out, "  ! {claim}");
        }
    }

    let _ = write!(
        out,
        "\n{} iteration(s), {} evidence fragment(s), stopped: {}, {} tokens, {:.1}s\n",
        answer.iterations,
        answer.evidence_count,
        answer.termination,
        answer.usage.total_tokens,
        answer.elapsed.as_secs_f64()
    );

    if include_trace {
        out.push_str("\nTrace:\n");
        for step in &trace.steps {
            let _ = writeln!(
                out,
                "  step {}: {} sub-queries, +{} evidence, {} merged, {} failure(s)",
                step.index,
                step.sub_queries.len(),
                step.fragments_admitted,
                step.fragments_merged,
                step.backend_failures.len()
            );
            for sub_query in &step.sub_queries {
                let _ = writeln!(out, "    - {}", sub_query.text);
            }
            for failure in &step.backend_failures {
                let _ = writeln!(out, "    ! {failure}");
            }
        }
    }

    out
}

/// Formats the resolved configuration. The API key is never echoed.
#[must_use]
pub fn format_config(config: &SessionConfig, format: OutputFormat) -> String {
    let api_key = if config.api_key.is_empty() {
        "(unset)"
    } else {
        "(set)"
    };
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "provider:           {}", config.provider);
            let _ = writeln!(out, "api_key:            {api_key}");
            let _ = writeln!(
                out,
                "base_url:           {}",
                config.base_url.as_deref().unwrap_or("(default)")
            );
            let _ = writeln!(out, "planner_model:      {}", config.planner_model);
            let _ = writeln!(out, "evaluator_model:    {}", config.evaluator_model);
            let _ = writeln!(out, "synthesizer_model:  {}", config.synthesizer_model);
            let _ = writeln!(out, "fan_out:            {}", config.fan_out);
            let _ = writeln!(out, "max_iterations:     {}", config.max_iterations);
            let _ = writeln!(
                out,
                "time_budget:        {}s",
                config.time_budget.as_secs()
            );
            let _ = writeln!(
                out,
                "call_timeout:       {}s",
                config.call_timeout.as_secs()
            );
            let _ = writeln!(out, "max_concurrency:    {}", config.max_concurrency);
            let _ = writeln!(out, "top_k:              {}", config.top_k);
            out
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "provider": config.provider,
            "api_key": api_key,
            "base_url": config.base_url,
            "planner_model": config.planner_model,
            "evaluator_model": config.evaluator_model,
            "synthesizer_model": config.synthesizer_model,
            "fan_out": config.fan_out,
            "max_iterations": config.max_iterations,
            "time_budget_secs": config.time_budget.as_secs(),
            "call_timeout_secs": config.call_timeout.as_secs(),
            "max_concurrency": config.max_concurrency,
            "top_k": config.top_k,
        }))
        .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::TokenUsage;
    use crate::session::{Citation, TerminationReason};
    use std::time::Duration;
    use uuid::Uuid;

    fn sample_answer() -> Answer {
        Answer {
            text: "Paris.".to_string(),
            citations: vec![Citation {
                source_ids: vec!["capital-doc".to_string()],
                claim: Some("Paris is the capital.".to_string()),
            }],
            low_confidence: false,
            unsupported_claims: Vec::new(),
            termination: TerminationReason::Sufficient,
            iterations: 2,
            evidence_count: 3,
            cited_fragments: Vec::new(),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            },
            elapsed: Duration::from_secs(3),
        }
    }

    fn sample_trace() -> SessionTrace {
        SessionTrace {
            session_id: Uuid::new_v4(),
            question: "q".to_string(),
            steps: Vec::new(),
            evidence_count: 3,
            termination: Some(TerminationReason::Sufficient),
        }
    }

    #[test_case::test_case("json", OutputFormat::Json; "json")]
    #[test_case::test_case("JSON", OutputFormat::Json; "json uppercase")]
    #[test_case::test_case("text", OutputFormat::Text; "text")]
    #[test_case::test_case("bogus", OutputFormat::Text; "unknown falls back to text")]
    fn test_format_parse(name: &str, expected: OutputFormat) {
        assert_eq!(OutputFormat::parse(name), expected);
    }

    #[test]
    fn test_text_answer_lists_sources() {
        let out = format_answer(&sample_answer(), &sample_trace(), false, OutputFormat::Text);
        assert!(out.contains("Paris."));
        assert!(out.contains("[1] capital-doc"));
        assert!(out.contains("stopped: sufficient"));
        assert!(!out.contains("[low confidence]"));
    }

    #[test]
    fn test_json_answer_is_valid() {
        let out = format_answer(&sample_answer(), &sample_trace(), true, OutputFormat::Json);
        let parsed: serde_json::Value =
            serde_json::from_str(&out).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(parsed["answer"]["text"], "Paris.");
        assert!(parsed["trace"].is_object());
    }

    #[test]
    fn test_config_never_echoes_api_key() {
        let config = SessionConfig::builder()
            .api_key("sk-secret-value")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let text = format_config(&config, OutputFormat::Text);
        assert!(!text.contains("sk-secret-value"));
        assert!(text.contains("(set)"));
        let json = format_config(&config, OutputFormat::Json);
        assert!(!json.contains("sk-secret-value"));
    }
}
