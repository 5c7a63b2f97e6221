use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn streamnet() -> Result<Command, Box<dyn std::error::Error>> {
    #[allow(deprecated)]
    let cmd = Command::cargo_bin("streamnet")?;
    Ok(cmd)
}

fn json_lines(stdout: &[u8]) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let text = String::from_utf8(stdout.to_vec())?;
    let mut lines = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        lines.push(serde_json::from_str(line)?);
    }
    Ok(lines)
}

#[test]
fn pipeline_prints_transformed_records() -> Result<(), Box<dyn std::error::Error>> {
    streamnet()?
        .args(["run", "--demo", "pipeline", "--records", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("x=1 <id>=0"))
        .stdout(predicate::str::contains("x=5 <id>=2"))
        .stdout(predicate::str::contains("Received 3 records"));
    Ok(())
}

#[test]
fn star_json_keeps_input_order() -> Result<(), Box<dyn std::error::Error>> {
    let assert = streamnet()?
        .args(["run", "--demo", "star", "--records", "6", "--json"])
        .assert()
        .success();

    let records = json_lines(&assert.get_output().stdout)?;
    assert_eq!(records.len(), 6);
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record["tags"]["id"], index as i64);
        assert_eq!(record["tags"]["count"], 0);
        assert_eq!(record["fields"]["x"], index as i64);
    }
    Ok(())
}

#[test]
fn split_squares_every_record() -> Result<(), Box<dyn std::error::Error>> {
    let assert = streamnet()?
        .args(["run", "--demo", "split", "--records", "5", "--json"])
        .assert()
        .success();

    let records = json_lines(&assert.get_output().stdout)?;
    let squares: Vec<i64> = records
        .iter()
        .filter_map(|r| r["fields"]["x"].as_i64())
        .collect();
    assert_eq!(squares, vec![0, 1, 4, 9, 16]);
    Ok(())
}

#[test]
fn sync_pairs_left_and_right() -> Result<(), Box<dyn std::error::Error>> {
    let assert = streamnet()?
        .args(["run", "--demo", "sync", "--records", "7", "--json"])
        .assert()
        .success();

    // the seventh record never finds a partner
    let records = json_lines(&assert.get_output().stdout)?;
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record["fields"]["left"], record["fields"]["right"]);
    }
    Ok(())
}

#[test]
fn config_file_is_applied() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("streamnet.yml");
    fs::write(
        &path,
        r#"
stream:
  capacity: 2
gc:
  enabled: false
"#,
    )?;

    streamnet()?
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity: 2"))
        .stdout(predicate::str::contains("enabled: false"));

    streamnet()?
        .arg("--config")
        .arg(&path)
        .args(["run", "--demo", "sync", "--records", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Received 2 records"));
    Ok(())
}

#[test]
fn missing_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    streamnet()?
        .arg("--config")
        .arg(dir.path().join("absent.yml"))
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}

#[test]
fn feedback_loops_until_large_enough() -> Result<(), Box<dyn std::error::Error>> {
    let assert = streamnet()?
        .args(["run", "--demo", "feedback", "--records", "3", "--json"])
        .assert()
        .success();

    let records = json_lines(&assert.get_output().stdout)?;
    let xs: Vec<i64> = records
        .iter()
        .filter_map(|r| r["fields"]["x"].as_i64())
        .collect();
    assert_eq!(xs, vec![128, 128, 192]);
    Ok(())
}
