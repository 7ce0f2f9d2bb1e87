//! Integration tests for `repcast run` and `repcast report`.

#![allow(deprecated)] // cargo_bin deprecation; replacement not yet stable

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn repcast() -> Command {
    Command::cargo_bin("repcast").expect("binary 'repcast' should be built")
}

/// Config that streams into `cat` instead of ffmpeg and never speaks.
fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        r#"
[encoder]
program = "sh"
args = ["-c", "cat > /dev/null"]
width = 8
height = 8
fps = 0

[feedback]
enabled = false
"#,
    )
    .unwrap();
    path
}

fn write_poses(dir: &Path, elbows: &[f64]) -> std::path::PathBuf {
    let path = dir.join("poses.jsonl");
    let lines: String = elbows
        .iter()
        .map(|e| format!("{{\"angles\": {{\"right_elbow\": {e}, \"right_shoulder\": 60.0}}}}\n"))
        .collect();
    fs::write(&path, lines).unwrap();
    path
}

// ─── report ──────────────────────────────────────────────────────────────────

#[test]
fn report_prints_persisted_file() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("results.txt");
    fs::write(&report, "Count: 4\nSuccess Rate: 80.00%\n").unwrap();

    repcast()
        .args(["--config", "/dev/null", "report", "--path"])
        .arg(&report)
        .assert()
        .success()
        .stdout("Count: 4\nSuccess Rate: 80.00%\n");
}

#[test]
fn report_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("results.txt");
    fs::write(&report, "Count: 4\nSuccess Rate: 80.00%\n").unwrap();

    repcast()
        .args(["--config", "/dev/null", "report", "--json", "--path"])
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 4"));
}

#[test]
fn missing_report_is_an_error() {
    repcast()
        .args(["--config", "/dev/null", "report", "--path", "/nonexistent/results.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read report"));
}

// ─── run ─────────────────────────────────────────────────────────────────────

#[test]
fn unknown_exercise_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    repcast()
        .arg("--config")
        .arg(&config)
        .args(["run", "--exercise", "deadlift"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown exercise"));
}

#[cfg(unix)]
#[test]
fn run_counts_replayed_curl() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let poses = write_poses(
        dir.path(),
        &[150.0, 130.0, 80.0, 40.0, 80.0, 150.0, 130.0, 90.0, 150.0],
    );
    let report = dir.path().join("results.txt");

    repcast()
        .arg("--config")
        .arg(&config)
        .args(["run", "--exercise", "curl", "--seed", "1", "--poses"])
        .arg(&poses)
        .arg("--report")
        .arg(&report)
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reps\": 1"))
        .stdout(predicate::str::contains("\"attempts\": 2"))
        .stdout(predicate::str::contains("\"end_reason\": \"exhausted\""))
        .stdout(predicate::str::contains("\"frames_written\": 9"));

    assert_eq!(
        fs::read_to_string(&report).unwrap(),
        "Count: 1\nSuccess Rate: 50.00%\n"
    );
}

#[cfg(unix)]
#[test]
fn run_reads_raw_frames_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let frames = dir.path().join("frames.rgb");
    fs::write(&frames, vec![0u8; 8 * 8 * 3 * 3]).unwrap();
    let report = dir.path().join("results.txt");

    repcast()
        .arg("--config")
        .arg(&config)
        .args(["run", "--no-speech", "--frames"])
        .arg(&frames)
        .arg("--report")
        .arg(&report)
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"frames\": 3"));

    assert_eq!(
        fs::read_to_string(&report).unwrap(),
        "Count: 0\nSuccess Rate: 0.00%\n"
    );
}

#[cfg(unix)]
#[test]
fn run_without_destination_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[feedback]\nenabled = false\n").unwrap();

    repcast()
        .arg("--config")
        .arg(&config)
        .args(["run", "--max-frames", "1"])
        .env_remove("REPCAST_STREAM_KEY")
        .env_remove("YOUTUBE_STREAM_KEY")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No stream destination"));
}
