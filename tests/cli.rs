//! Binary-level tests. None of these reach the network: each command fails
//! or finishes before the first API call.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn ragchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragchat"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_content = format!(
        r#"[index]
dir = "{root}/vector_db"

[[sources]]
name = "Subjects"
path = "{root}/missing.csv"
"#,
        root = root.display()
    );
    let config_path = root.join("ragchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn command(config_path: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(ragchat_binary());
    cmd.current_dir(config_path.parent().unwrap())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("OPENAI_API_KEY", "sk-test")
        .env("GROQ_API_KEY", "gsk-test")
        .env("RUST_LOG", "warn");
    cmd
}

fn run_ragchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = command(config_path, args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragchat: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_search_without_index_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ragchat(&config_path, &["search", "credits"]);
    assert!(!success);
    assert!(stderr.contains("build-index"), "stderr={}", stderr);
}

#[test]
fn test_build_index_with_missing_source_fails() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ragchat(&config_path, &["build-index"]);
    assert!(!success);
    assert!(stderr.contains("Subjects"), "stderr={}", stderr);
    assert!(!tmp.path().join("vector_db").join("index.sqlite").exists());
}

#[test]
fn test_missing_api_key_aborts() {
    let (_tmp, config_path) = setup_test_env();

    let output = command(&config_path, &["build-index"])
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 10\nchunk_overlap = 50\n").unwrap();

    let (_, stderr, success) = run_ragchat(&config_path, &["search", "x"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr={}", stderr);
}

#[test]
fn test_chat_exits_on_keyword() {
    let (_tmp, config_path) = setup_test_env();

    let mut child = command(&config_path, &["chat"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"\nSALIR\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("You: "));
    assert!(stdout.trim_end().ends_with("Bot: Goodbye"), "stdout={}", stdout);
}
