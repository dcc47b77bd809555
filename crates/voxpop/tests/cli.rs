use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use serial_test::serial;
use std::fs;
use std::process::Command;

const SAMPLE_CSV: &str = "\
Date,Username,Summary/Quote,Link
2024-03-01,ada,Wider sidewalk space downtown, with benches,https://x.com/ada/1
2024-03-02,bob,Every sidewalk downtown floods when it rains,https://x.com/bob/2
2024-03-03,cyd,Open gyms late during winter evenings,https://x.com/cyd/3
";

/// Helper to create a Command for the `voxpop` binary with a clean provider
/// environment, so runs never touch the network.
fn voxpop_cmd(temp: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("voxpop").expect("binary exists");
    cmd.current_dir(temp.path());
    cmd.env_remove("ANTHROPIC_API_KEY");
    cmd.env_remove("OPENAI_API_KEY");
    cmd.env_remove("VOXPOP_RELATION_PROVIDER");
    cmd
}

#[test]
#[serial]
fn test_relate_keyword_links_sidewalk_pair_only() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("suggestions.csv");
    input.write_str(SAMPLE_CSV).unwrap();

    voxpop_cmd(&temp)
        .args(["relate", "suggestions.csv", "--provider", "keyword"])
        .assert()
        .success()
        .stdout(contains("Loaded 3 items").and(contains("keyword")));

    let csv = fs::read_to_string(temp.child("connections.csv").path()).unwrap();
    let edge_lines: Vec<&str> = csv.lines().skip(1).collect();

    // Items 1 and 2 share "sidewalk"; item 3 shares nothing with anyone
    assert_eq!(edge_lines.len(), 1);
    assert!(edge_lines[0].starts_with("1,2,"));
    assert!(edge_lines[0].contains("sidewalk"));

    let json = fs::read_to_string(temp.child("connections.json").path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(doc["nodes"].as_array().unwrap().len(), 3);
    for edge in doc["edges"].as_array().unwrap() {
        assert_ne!(edge["source_id"], 3);
        assert_ne!(edge["target_id"], 3);
    }

    temp.close().unwrap();
}

#[test]
#[serial]
fn test_relate_is_deterministic_without_provider() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("suggestions.csv");
    input.write_str(SAMPLE_CSV).unwrap();

    voxpop_cmd(&temp)
        .args(["relate", "suggestions.csv", "--provider", "keyword"])
        .assert()
        .success();
    let first = fs::read_to_string(temp.child("connections.csv").path()).unwrap();

    voxpop_cmd(&temp)
        .args(["relate", "suggestions.csv", "--provider", "keyword"])
        .assert()
        .success();
    let second = fs::read_to_string(temp.child("connections.csv").path()).unwrap();

    assert_eq!(first, second);

    temp.close().unwrap();
}

#[test]
#[serial]
fn test_missing_credentials_fall_back_to_keyword() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("suggestions.csv");
    input.write_str(SAMPLE_CSV).unwrap();

    // Anthropic requested, no key in the environment: run must still complete
    // and the log must say the fallback was taken.
    voxpop_cmd(&temp)
        .args(["relate", "suggestions.csv", "--provider", "anthropic"])
        .assert()
        .success()
        .stdout(contains("Finding relations using keyword"))
        .stderr(contains("falling back to keyword"));

    temp.child("connections.json").assert(predicate::path::exists());

    temp.close().unwrap();
}

#[test]
#[serial]
fn test_full_run_produces_all_artifacts() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("suggestions.csv");
    input.write_str(SAMPLE_CSV).unwrap();

    voxpop_cmd(&temp)
        .args(["run", "suggestions.csv", "--provider", "keyword"])
        .assert()
        .success();

    temp.child("connections.csv").assert(predicate::path::exists());
    temp.child("connections.json").assert(predicate::path::exists());
    temp.child("connections_with_topics.json").assert(predicate::path::exists());
    temp.child("connections_enhanced.json").assert(predicate::path::exists());

    let json = fs::read_to_string(temp.child("connections_with_topics.json").path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();

    // Every node belongs to exactly one topic
    for node in doc["nodes"].as_array().unwrap() {
        assert!(node["topic_id"].is_number());
        assert!(node["topic_label"].is_string());
    }

    let topics = doc["topics"].as_array().unwrap();
    let counted: u64 = topics.iter().map(|t| t["count"].as_u64().unwrap()).sum();
    assert_eq!(counted, doc["nodes"].as_array().unwrap().len() as u64);

    temp.close().unwrap();
}

#[test]
#[serial]
fn test_topics_splits_disconnected_groups() {
    let temp = assert_fs::TempDir::new().unwrap();

    // Two disconnected groups: a pair and a fully-interconnected triple
    let connections = serde_json::json!({
        "nodes": [
            {"id": 1, "username": "a", "summary": "more housing near transit"},
            {"id": 2, "username": "b", "summary": "upzone for housing"},
            {"id": 3, "username": "c", "summary": "protected bike lanes"},
            {"id": 4, "username": "d", "summary": "bike lanes on bridges"},
            {"id": 5, "username": "e", "summary": "bike parking everywhere"}
        ],
        "edges": [
            {"source_id": 1, "target_id": 2, "reason": "housing"},
            {"source_id": 3, "target_id": 4, "reason": "bikes"},
            {"source_id": 4, "target_id": 5, "reason": "bikes"},
            {"source_id": 3, "target_id": 5, "reason": "bikes"}
        ]
    });
    let input = temp.child("connections.json");
    input.write_str(&connections.to_string()).unwrap();

    voxpop_cmd(&temp)
        .args(["topics", "connections.json", "--provider", "keyword"])
        .assert()
        .success()
        .stdout(contains("Found 2 communities"));

    let json = fs::read_to_string(temp.child("connections_with_topics.json").path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(doc["topics"].as_array().unwrap().len(), 2);

    temp.close().unwrap();
}

#[test]
#[serial]
fn test_missing_input_file_is_fatal() {
    let temp = assert_fs::TempDir::new().unwrap();

    voxpop_cmd(&temp)
        .args(["relate", "no_such_file.csv", "--provider", "keyword"])
        .assert()
        .failure();

    // Nothing was written
    assert!(!temp.child("connections.csv").path().exists());

    temp.close().unwrap();
}
