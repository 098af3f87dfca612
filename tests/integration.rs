use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askdoc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("askdoc");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("documents");
    fs::create_dir_all(&docs_dir).unwrap();

    // Point everything at an unreachable Ollama with no retries so any
    // path that would hit the network fails fast instead of hanging.
    let config_content = format!(
        r#"[paths]
documents = "{root}/documents"
index = "{root}/index"
conversations = "{root}/conversations"

[ollama]
url = "http://127.0.0.1:1"
max_retries = 0
timeout_secs = 2
"#,
        root = root.display()
    );

    let config_path = root.join("askdoc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_askdoc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = askdoc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdoc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_stats_on_fresh_index() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_askdoc(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed chunks: 0"));
}

#[test]
fn test_ask_on_empty_index_answers_without_a_backend() {
    let (_tmp, config_path) = setup_test_env();

    // An empty index short-circuits before embedding or generation, so
    // this succeeds even though no Ollama is reachable.
    let (stdout, stderr, success) = run_askdoc(&config_path, &["ask", "What is in my notes?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("I don't have any documents in my knowledge base yet."));
}

#[test]
fn test_process_empty_directory() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_askdoc(&config_path, &["process"]);
    assert!(
        success,
        "process failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("Processed 0 files (0 failed), 0 chunks indexed"));
}

#[test]
fn test_process_skips_unsupported_files() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("documents/readme.md"),
        "markdown is not a supported input",
    )
    .unwrap();

    let (stdout, _, success) = run_askdoc(&config_path, &["process"]);
    assert!(success);
    assert!(stdout.contains("Skipping (unsupported type)"));
    assert!(stdout.contains("Processed 0 files (0 failed), 0 chunks indexed"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad_config = tmp.path().join("bad.toml");
    fs::write(
        &bad_config,
        r#"[chunking]
chunk_size = 100
overlap = 100
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_askdoc(&bad_config, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("overlap"));
}

#[test]
fn test_corrupt_index_fails_at_startup() {
    let (tmp, config_path) = setup_test_env();
    let index_dir = tmp.path().join("index");
    fs::create_dir_all(&index_dir).unwrap();
    fs::write(index_dir.join("index.sqlite3"), b"this is not a database").unwrap();

    let (_, stderr, success) = run_askdoc(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("corrupt"), "stderr: {}", stderr);
}

#[test]
fn test_index_survives_across_invocations() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_askdoc(&config_path, &["stats"]);
    assert!(success1);
    let (stdout, _, success2) = run_askdoc(&config_path, &["stats"]);
    assert!(success2);
    assert!(stdout.contains("Indexed chunks: 0"));
}
