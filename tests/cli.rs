//! End-to-end CLI tests that exercise the compiled binary.
//!
//! These cover argument handling and configuration failures only; no
//! test here reaches a provider or a retrieval backend.

use assert_cmd::Command;
use predicates::prelude::*;

fn deepsearch() -> Command {
    let mut cmd = Command::cargo_bin("deepsearch-rs").unwrap_or_else(|e| unreachable!("{e}"));
    // Isolate from the developer's environment.
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("DEEPSEARCH_API_KEY")
        .env_remove("DEEPSEARCH_VECTOR_ENDPOINT")
        .env_remove("DEEPSEARCH_CRAWL_ENDPOINT");
    cmd
}

#[test]
fn help_lists_commands() {
    deepsearch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn query_without_api_key_fails() {
    deepsearch()
        .args(["query", "what is this?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn query_without_backend_fails() {
    deepsearch()
        .env("OPENAI_API_KEY", "test-key")
        .args(["query", "what is this?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no retrieval backend configured"));
}

#[test]
fn query_rejects_unknown_backend_kind() {
    deepsearch()
        .env("OPENAI_API_KEY", "test-key")
        .args([
            "query",
            "what is this?",
            "--vector-endpoint",
            "http://localhost:8000/search",
            "--backends",
            "graph",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend kind"));
}

#[test]
fn config_show_works_without_api_key() {
    deepsearch()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("provider:"))
        .stdout(predicate::str::contains("(unset)"));
}

#[test]
fn config_show_json_redacts_api_key() {
    deepsearch()
        .env("OPENAI_API_KEY", "sk-super-secret")
        .args(["--format", "json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"api_key\": \"(set)\""))
        .stdout(predicate::str::contains("sk-super-secret").not());
}

#[test]
fn init_prompts_writes_templates() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("{e}"));
    deepsearch()
        .args(["init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("prompt template"));
    assert!(dir.path().join("planner.md").exists());
}
