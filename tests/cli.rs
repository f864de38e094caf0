use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tmw_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tmw");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs = root.join("docs");
    fs::create_dir_all(docs.join("guides")).unwrap();
    fs::create_dir_all(docs.join("src")).unwrap();
    fs::write(
        docs.join("guides/login.md"),
        "# Login\n\nThe login module validates email format.\n\nPasswords are hashed with bcrypt.",
    )
    .unwrap();
    fs::write(
        docs.join("src/auth.ts"),
        "export function validateEmail(email: string): boolean {\n  return email.includes('@');\n}\n",
    )
    .unwrap();
    fs::write(docs.join("notes.txt"), "Deployment runs on Friday.").unwrap();

    let config_content = format!(
        r#"[paths]
docs_root = "{root}/docs"
vector_store = "{root}/store"

[embedding]
provider = "hashing"
dims = 128

[llm.local]
endpoint = "http://127.0.0.1:9"
timeout_secs = 2

[llm.cloud]
api_key = ""

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("tmw.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tmw(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tmw_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("TMW_DOCS_ROOT")
        .env_remove("TMW_VECTOR_STORE")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tmw binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn chunk_count(stats_stdout: &str) -> u64 {
    stats_stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("Chunks:"))
        .map(|n| n.trim().parse().unwrap())
        .unwrap_or_else(|| panic!("no chunk line in: {}", stats_stdout))
}

#[test]
fn test_init_creates_index() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tmw(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("store/index.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tmw(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tmw(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tmw(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Ingested 3 documents as 3 chunks"), "{}", stdout);

    let (stats, _, success) = run_tmw(&config_path, &["stats"]);
    assert!(success);
    assert_eq!(chunk_count(&stats), 3);
    assert!(stats.contains("Sources:     3"));
}

#[test]
fn test_ingest_twice_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_tmw(&config_path, &["ingest"]);
    let (first, _, _) = run_tmw(&config_path, &["stats"]);
    run_tmw(&config_path, &["ingest"]);
    let (second, _, _) = run_tmw(&config_path, &["stats"]);

    assert_eq!(chunk_count(&first), chunk_count(&second));
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_tmw(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("Would ingest 3 documents"), "{}", stdout);

    let (stats, _, _) = run_tmw(&config_path, &["stats"]);
    assert_eq!(chunk_count(&stats), 0);
    assert!(stats.contains("Last ingest: never"));
}

#[test]
fn test_ingest_missing_path_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nowhere");

    let (_, stderr, success) = run_tmw(
        &config_path,
        &["ingest", "--path", missing.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("path not found"), "{}", stderr);
}

#[test]
fn test_query_cloud_without_key_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_tmw(&config_path, &["ingest"]);

    let (_, stderr, success) = run_tmw(
        &config_path,
        &["query", "How is email validated?", "--provider", "claude"],
    );
    assert!(!success);
    assert!(stderr.contains("credential missing"), "{}", stderr);
}

#[test]
fn test_query_unreachable_local_model_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_tmw(&config_path, &["query", "How is email validated?"]);
    assert!(!success);
    assert!(stderr.contains("provider unavailable"), "{}", stderr);
}

#[test]
fn test_query_rejects_unknown_provider() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_tmw(&config_path, &["query", "hi", "--provider", "gpt"]);
    assert!(!success);
    assert!(stderr.contains("unknown provider"), "{}", stderr);
}

#[test]
fn test_query_rejects_empty_question() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_tmw(&config_path, &["query", "  "]);
    assert!(!success);
    assert!(stderr.contains("invalid argument"), "{}", stderr);
}

#[test]
fn test_config_hides_api_key() {
    let (tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("api_key = \"\"", "api_key = \"sk-very-secret\"");
    fs::write(&config_path, content).unwrap();

    let (stdout, stderr, success) = run_tmw(&config_path, &["config"]);
    assert!(success, "config failed: {}", stderr);
    assert!(!stdout.contains("sk-very-secret"));
    assert!(stdout.contains("[llm.cloud]"));
    assert!(stdout.contains(&format!("{}/docs", tmp.path().display())));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        format!("{}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n", content),
    )
    .unwrap();

    let (_, stderr, success) = run_tmw(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "{}", stderr);
}
