use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let knowledge_dir = root.join("knowledge");
    fs::create_dir_all(knowledge_dir.join("cloud")).unwrap();
    fs::write(
        knowledge_dir.join("cloud/aws.md"),
        "# AWS Storage\n\nAmazon S3 stores objects inside buckets.\n\nBuckets are regional and versioning can be enabled.",
    )
    .unwrap();
    fs::write(
        knowledge_dir.join("gemma.md"),
        "# Gemma\n\nGemma is an AI language model from Google.\n\nIt runs locally through Ollama.",
    )
    .unwrap();
    fs::write(
        knowledge_dir.join("vectors.txt"),
        "Vector databases store embeddings efficiently.\n\nCosine similarity ranks the nearest chunks.",
    )
    .unwrap();
    fs::write(knowledge_dir.join("empty.md"), "\n\n").unwrap();
    fs::write(knowledge_dir.join("notes.json"), "{\"ignored\": true}").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/rag.sqlite"

[knowledge]
root = "{root}/knowledge"

[chunking]
max_tokens = 64
overlap_tokens = 8

[embedding]
provider = "hash"
dims = 128

[llm]
provider = "extractive"

[retrieval]
top_k = 3

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RAG_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/rag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rag(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 3"), "got: {}", stdout);
    assert!(stdout.contains("skipped: 1"), "got: {}", stdout);
    assert!(stdout.contains("embedding dim: 128"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_twice_does_not_duplicate() {
    let (_tmp, config_path) = setup_test_env();

    run_rag(&config_path, &["ingest"]);
    run_rag(&config_path, &["ingest"]);

    let (stdout, _, success) = run_rag(&config_path, &["stats", "--json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_documents"], 3);
}

#[test]
fn test_stats_after_ingest() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_rag(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("hash-128"));
    assert!(stdout.contains("cloud/aws.md"));

    let (stdout, _, _) = run_rag(&config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["embedding_dim"], 128);
    assert_eq!(stats["embedding_model"], "hash-128");
    assert_eq!(stats["documents"].as_array().unwrap().len(), 3);
}

#[test]
fn test_ask_answers_with_sources() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["ask", "Where does Amazon S3 store objects?", "--json"],
    );
    assert!(success, "ask failed: {}", stderr);
    let answer: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(answer["answer"].as_str().unwrap().contains("buckets"));
    assert_eq!(answer["sources"][0]["filename"], "cloud/aws.md");
    assert_eq!(answer["metadata"]["model"], "extractive");
}

#[test]
fn test_ask_with_file_filter() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, _, success) = run_rag(
        &config_path,
        &["ask", "Gemma language model", "--file", "gemma.md", "--json"],
    );
    assert!(success);
    let answer: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let sources = answer["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s["filename"] == "gemma.md"));
    assert_eq!(answer["metadata"]["file_filter"][0], "gemma.md");
}

#[test]
fn test_ask_before_ingest_uses_fallback_answer() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_rag(&config_path, &["ask", "anything"]);
    assert!(success);
    assert!(stdout.contains("could not find relevant information"));
}

#[test]
fn test_ask_empty_question_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["ask", "   "]);
    assert!(!success);
    assert!(stderr.contains("question must not be empty"));
}

#[test]
fn test_model_prints_chat_model() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_rag(&config_path, &["model"]);
    assert!(success);
    assert_eq!(stdout.trim(), "extractive");
}

#[test]
fn test_diagnose_after_ingest() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_rag(&config_path, &["diagnose"]);
    assert!(success, "diagnose failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains(&"=".repeat(60)));
    assert!(stdout.contains("Embedding shape: (3, 128)"));
    assert!(stdout.contains("✓ Embedding dimension matches!"));
    assert!(stdout.contains("✓ Embedding system test completed!"));
}

#[test]
fn test_diagnose_fails_when_embeddings_disabled() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("provider = \"hash\"\ndims = 128", "provider = \"disabled\"");
    fs::write(&config_path, content).unwrap();

    let (stdout, _, success) = run_rag(&config_path, &["diagnose"]);
    assert!(!success);
    assert!(stdout.contains("✗ Error loading embedding model"));
    assert!(stdout.contains("embedding provider is disabled"));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("top_k = 3", "top_k = 0");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.top_k"));
}

#[test]
fn test_missing_config_file() {
    let (_, stderr, success) = run_rag(Path::new("/nonexistent/rag.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
