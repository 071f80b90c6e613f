//! Integration tests: `harness` CLI end to end.
//!
//! Validates:
//! 1. `convert` writes the replay trace plus JSON and markdown reports.
//! 2. Strict mode writes the same output, then exits non-zero.
//! 3. A missing input fails without creating the output file.
//! 4. `convert-dir` writes one trace per input and a hashed artifact index.
//! 5. `check` accepts converted traces and rejects inconsistent headers.
//! 6. `--log -` streams the JSONL log to stderr.
//!
//! Run: cargo test -p tracelab-harness --test convert_cli_test

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use tracelab_harness::structured_log::sha256_hex;

const SAMPLE: &str = "\
= Start
@ ./app:[0x4005d4] + 0x601010 0x10
@ ./app:[0x4005f0] > 0x602020 0x601010 0x20
@ ./app:[0x4005e2] - 0x602020
@ ./app:[0x4005e2] - 0x602020
= End
";

const SAMPLE_REP: &str = "0\n1\n3\n32\na 0 16\nr 0 32\nf 0\n";

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn harness(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_harness"))
        .args(args)
        .env_remove("TRACELAB_MODE")
        .output()
        .expect("spawn harness")
}

fn path_arg(p: &Path) -> &str {
    p.to_str().expect("utf-8 temp path")
}

#[test]
fn convert_writes_trace_and_reports() {
    let dir = unique_tmp_dir("tracelab-cli-convert");
    let input = dir.join("sample.mtrace");
    let output = dir.join("sample.rep");
    let report = dir.join("report.json");
    std::fs::write(&input, SAMPLE).expect("write input");

    let out = harness(&[
        "convert",
        "--input",
        path_arg(&input),
        "--output",
        path_arg(&output),
        "--report",
        path_arg(&report),
    ]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    assert_eq!(std::fs::read_to_string(&output).expect("read output"), SAMPLE_REP);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("read report"))
            .expect("report is JSON");
    assert_eq!(json["mode"], "lenient");
    assert_eq!(json["stats"]["peak_allocated_bytes"], 32);
    assert_eq!(json["skipped"]["dangling_free"], 1);
    assert_eq!(json["output_sha256"], sha256_hex(SAMPLE_REP.as_bytes()));

    let md = std::fs::read_to_string(dir.join("report.md")).expect("read markdown");
    assert!(md.contains("# Trace Conversion Report"));
}

#[test]
fn strict_mode_writes_output_then_fails() {
    let dir = unique_tmp_dir("tracelab-cli-strict");
    let input = dir.join("sample.mtrace");
    let output = dir.join("sample.rep");
    let log = dir.join("run.jsonl");
    std::fs::write(&input, SAMPLE).expect("write input");

    let out = harness(&[
        "convert",
        "--input",
        path_arg(&input),
        "--output",
        path_arg(&output),
        "--mode",
        "strict",
        "--log",
        path_arg(&log),
        "--run-id",
        "cli-strict",
    ]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("double_free"), "stderr: {stderr}");
    assert_eq!(std::fs::read_to_string(&output).expect("read output"), SAMPLE_REP);

    let log_text = std::fs::read_to_string(&log).expect("read log");
    assert!(log_text.contains("\"trace_id\":\"tracelab::cli-strict::001\""));
    assert!(log_text.contains("\"event\":\"double_free\""));
}

#[test]
fn dash_log_streams_jsonl_to_stderr() {
    let dir = unique_tmp_dir("tracelab-cli-stderr-log");
    let input = dir.join("sample.mtrace");
    std::fs::write(&input, SAMPLE).expect("write input");

    let out = harness(&[
        "convert",
        "--input",
        path_arg(&input),
        "--output",
        path_arg(&dir.join("sample.rep")),
        "--log",
        "-",
        "--run-id",
        "cli-stderr",
    ]);
    assert!(out.status.success());

    let stderr = String::from_utf8_lossy(&out.stderr);
    let entries: Vec<serde_json::Value> = stderr
        .lines()
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).expect("log line is JSON"))
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["trace_id"], "tracelab::cli-stderr::001");
    assert_eq!(entries[1]["event"], "convert_done");
}

#[test]
fn mode_env_var_selects_strict() {
    let dir = unique_tmp_dir("tracelab-cli-env");
    let input = dir.join("sample.mtrace");
    std::fs::write(&input, SAMPLE).expect("write input");

    let out = Command::new(env!("CARGO_BIN_EXE_harness"))
        .args([
            "convert",
            "--input",
            path_arg(&input),
            "--output",
            path_arg(&dir.join("sample.rep")),
        ])
        .env("TRACELAB_MODE", "strict")
        .output()
        .expect("spawn harness");
    assert!(!out.status.success());

    let flag_wins = Command::new(env!("CARGO_BIN_EXE_harness"))
        .args([
            "convert",
            "--input",
            path_arg(&input),
            "--output",
            path_arg(&dir.join("sample.rep")),
            "--mode",
            "lenient",
        ])
        .env("TRACELAB_MODE", "strict")
        .output()
        .expect("spawn harness");
    assert!(flag_wins.status.success());
}

#[test]
fn missing_input_creates_no_output() {
    let dir = unique_tmp_dir("tracelab-cli-missing");
    let output = dir.join("never.rep");
    let out = harness(&[
        "convert",
        "--input",
        path_arg(&dir.join("absent.mtrace")),
        "--output",
        path_arg(&output),
    ]);
    assert!(!out.status.success());
    assert!(!output.exists());
    assert!(String::from_utf8_lossy(&out.stderr).contains("cannot open input"));
}

#[test]
fn convert_dir_writes_index() {
    let dir = unique_tmp_dir("tracelab-cli-dir");
    let in_dir = dir.join("logs");
    let out_dir = dir.join("traces");
    std::fs::create_dir_all(&in_dir).expect("mkdir");
    std::fs::write(in_dir.join("one.mtrace"), SAMPLE).expect("write");
    std::fs::write(in_dir.join("two.mtrace"), "@0 + A 8\n").expect("write");

    let out = harness(&[
        "convert-dir",
        "--input-dir",
        path_arg(&in_dir),
        "--output-dir",
        path_arg(&out_dir),
    ]);
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let index: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join("artifact_index.json")).expect("read index"),
    )
    .expect("index is JSON");
    let artifacts = index["artifacts"].as_array().expect("artifacts");
    assert_eq!(artifacts.len(), 2);
    for artifact in artifacts {
        let path = artifact["path"].as_str().expect("path");
        let body = std::fs::read(path).expect("artifact exists");
        assert_eq!(artifact["sha256"], sha256_hex(&body));
        assert_eq!(artifact["kind"], "replay_trace");
    }
    assert_eq!(
        std::fs::read_to_string(out_dir.join("two.rep")).expect("read"),
        "0\n1\n1\n8\na 0 8\n"
    );
}

#[test]
fn check_accepts_good_and_rejects_bad_traces() {
    let dir = unique_tmp_dir("tracelab-cli-check");
    let good = dir.join("good.rep");
    let bad = dir.join("bad.rep");
    let report = dir.join("check.json");
    std::fs::write(&good, SAMPLE_REP).expect("write");
    std::fs::write(&bad, "0\n2\n3\n32\na 0 16\nr 0 32\nf 0\n").expect("write");

    let ok = harness(&["check", "--trace", path_arg(&good)]);
    assert!(ok.status.success());
    assert!(String::from_utf8_lossy(&ok.stdout).contains("- Result: PASS"));

    let fail = harness(&[
        "check",
        "--trace",
        path_arg(&bad),
        "--output",
        path_arg(&report),
    ]);
    assert!(!fail.status.success());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("read report"))
            .expect("report is JSON");
    assert_eq!(json["ok"], false);
    assert_eq!(json["violations"][0]["code"], "header.num_ids_mismatch");
}
