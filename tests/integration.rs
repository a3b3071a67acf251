use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn marvel_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("marvel");
    path
}

/// Writes a config and a small packed payload into a fresh temp dir.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let cache_dir = root.join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    // pool layout: strings and ids first, then two packed issues
    let payload = serde_json::json!({
        "nodes": [{}, {}, {"data": [
            "Avengers (2012)#1",                            // 0
            "http://marvel.com/comics/issue/1",             // 1
            "Hulk (2008) #1",                               // 2
            "https://www.marvel.com/comics/issue/3",        // 3
            1,                                              // 4
            3,                                              // 5
            "Jonathan Hickman",                             // 6
            200,                                            // 7
            "2012-12-05T00:00:00-0500",                     // 8
            {"onSale": 8},                                  // 9
            [11],                                           // 10
            {"id": 7, "name": 6, "role": 12},               // 11
            "writer",                                       // 12
            {"id": 4, "title": 0, "detailUrl": 1, "dates": 9, "creators": 10},
            {"id": 5, "title": 2, "detailUrl": 3}
        ]}]
    });
    fs::write(cache_dir.join("2012.json"), payload.to_string()).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/marvel.db"

[build]
batch_size = 1

[server]
bind = "127.0.0.1:8787"

[logging]
filter = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("marvel.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_marvel(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = marvel_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run marvel binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// parse + build; returns the temp dir and config path.
fn built_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let payload = root.join("cache/2012.json");
    let records = root.join("data/issues.jsonl");

    let (stdout, stderr, success) = run_marvel(
        &config_path,
        &[
            "parse",
            "--input",
            payload.to_str().unwrap(),
            "--out",
            records.to_str().unwrap(),
            "--year",
            "2012",
        ],
    );
    assert!(success, "parse failed: stdout={}, stderr={}", stdout, stderr);

    let (stdout, stderr, success) = run_marvel(
        &config_path,
        &["build", "--input", records.to_str().unwrap()],
    );
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);

    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_marvel(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/marvel.db").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_marvel(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (stdout, _, success2) = run_marvel(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
    assert!(stdout.contains("schema version: 1"));
}

#[test]
fn test_parse_writes_normalized_records() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let records = root.join("out/issues.jsonl");

    let (stdout, stderr, success) = run_marvel(
        &config_path,
        &[
            "parse",
            "--input",
            root.join("cache/2012.json").to_str().unwrap(),
            "--out",
            records.to_str().unwrap(),
            "--year",
            "2012",
        ],
    );
    assert!(success, "parse failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("records written: 2"));
    assert!(stdout.contains("ok"));

    let content = fs::read_to_string(&records).unwrap();
    let first: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
    assert_eq!(first["id"], 1);
    assert_eq!(first["title"], "Avengers (2012) #1");
    assert_eq!(first["detail_url"], "https://www.marvel.com/comics/issue/1");
    assert_eq!(first["on_sale_date"], "2012-12-05");
    assert_eq!(first["year_page"], 2012);
    assert_eq!(first["creators"][0]["role"], "writer");
}

#[test]
fn test_build_reports_counts() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let records = root.join("data/issues.jsonl");
    run_marvel(
        &config_path,
        &[
            "parse",
            "--input",
            root.join("cache/2012.json").to_str().unwrap(),
            "--out",
            records.to_str().unwrap(),
        ],
    );

    let (stdout, stderr, success) = run_marvel(
        &config_path,
        &["build", "--input", records.to_str().unwrap()],
    );
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("records loaded: 2"));
    assert!(stdout.contains("batches: 2"));
    assert!(stdout.contains("creators written: 1"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_build_twice_no_duplicates() {
    let (tmp, config_path) = built_env();
    let records = tmp.path().join("data/issues.jsonl");

    let (stdout, _, success) = run_marvel(
        &config_path,
        &["build", "--input", records.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("records loaded: 2"));

    let (stdout, _, success) = run_marvel(&config_path, &["info"]);
    assert!(success);
    assert!(stdout
        .lines()
        .map(str::trim)
        .any(|l| l.starts_with("issues:") && l.ends_with(" 2")));
}

#[test]
fn test_failed_build_keeps_previous_database() {
    let (tmp, config_path) = built_env();
    let db_path = tmp.path().join("data/marvel.db");
    let before = fs::read(&db_path).unwrap();

    let bad = tmp.path().join("bad.jsonl");
    fs::write(&bad, "{\"id\": 9, \"detail_url\": \"u\"}\n").unwrap();
    let (_, stderr, success) = run_marvel(
        &config_path,
        &["build", "--input", bad.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("malformed record"));
    assert_eq!(fs::read(&db_path).unwrap(), before);
}

#[test]
fn test_search_finds_issue() {
    let (_tmp, config_path) = built_env();

    let (stdout, stderr, success) = run_marvel(&config_path, &["search", "hulk"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Hulk (2008) #1"));
    assert!(stdout.contains("id: 3"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = built_env();

    let (stdout, _, success) = run_marvel(&config_path, &["search", "wolverine"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_get_issue() {
    let (_tmp, config_path) = built_env();

    let (stdout, stderr, success) = run_marvel(&config_path, &["get", "1"]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Avengers (2012) #1"));
    assert!(stdout.contains("Jonathan Hickman"));
}

#[test]
fn test_get_nonexistent() {
    let (_tmp, config_path) = built_env();

    let (_, stderr, success) = run_marvel(&config_path, &["get", "424242"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_info_reports_schema() {
    let (_tmp, config_path) = built_env();

    let (stdout, stderr, success) = run_marvel(&config_path, &["info"]);
    assert!(success, "info failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Schema:      v1"));
    assert!(stdout.contains("search index:"));
    assert!(stdout.contains("2012"));
}
