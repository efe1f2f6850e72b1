#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn lvfs_bench(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lvfs-bench").unwrap();
    cmd.current_dir(dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_no_arguments_prints_usage() {
    let temp = TempDir::new().unwrap();

    lvfs_bench(&temp)
        .assert()
        .code(2)
        .stdout(predicate::str::contains(
            "Usage: lvfs-bench <maxLayers> <numFiles> <numSamples>",
        ));

    assert!(!temp.path().join("results.csv").exists());
}

#[test]
fn test_wrong_argument_count_has_no_side_effects() {
    let temp = TempDir::new().unwrap();

    lvfs_bench(&temp)
        .args(["3", "2", "1"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Usage:"));

    assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
}

#[test]
fn test_non_positive_argument_is_usage_error() {
    let temp = TempDir::new().unwrap();

    lvfs_bench(&temp)
        .args(["0", "2", "1", "mounter"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Usage:"));

    assert!(!temp.path().join("folder0").exists());
}

#[test]
fn test_help_is_not_a_usage_error() {
    let temp = TempDir::new().unwrap();

    lvfs_bench(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MAX_LAYERS"));
}

#[test]
fn test_missing_mounter_fails_after_header() {
    let temp = TempDir::new().unwrap();

    lvfs_bench(&temp)
        .args(["2", "1", "1", "/nonexistent/lvfs-mounter", "--settle-ms", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to spawn"));

    // Fixture and header exist; no data rows.
    assert!(temp.path().join("folder0/file0").exists());
    assert_eq!(
        std::fs::read_to_string(temp.path().join("results.csv")).unwrap(),
        "Access times for 1 files:\nLayer count, sample 1\n"
    );
}

#[cfg(unix)]
#[test]
fn test_full_run_with_script_mounter() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let drive = temp.path().join("drive");

    // Stand-in mounter: logs its layer arguments and copies the layers' files
    // into the drive directory, then exits like a mounter whose unmount
    // already went through.
    let script = temp.path().join("mounter.sh");
    std::fs::write(
        &script,
        r#"#!/bin/sh
drive="$1"
shift
echo "$@" >> mounts.log
mkdir -p "$drive"
for arg in "$@"; do
    case "$arg" in
        -o=*) ;;
        *) cp "$arg"/* "$drive"/ 2>/dev/null ;;
    esac
done
exit 0
"#,
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    lvfs_bench(&temp)
        .args(["3", "2", "1"])
        .arg(&script)
        .arg("--drive")
        .arg(&drive)
        .args(["--settle-ms", "100", "--unmount-program", "true", "--no-color"])
        .arg("--json")
        .arg(temp.path().join("run.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 3 rows to results.csv"));

    let results = std::fs::read_to_string(temp.path().join("results.csv")).unwrap();
    let lines: Vec<&str> = results.lines().collect();
    assert_eq!(lines[0], "Access times for 2 files:");
    assert_eq!(lines[1], "Layer count, sample 1");
    assert_eq!(lines.len(), 5);
    for (i, line) in lines[2..].iter().enumerate() {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], (i + 1).to_string());
        assert!(fields[1].parse::<f64>().unwrap() >= 0.0);
    }

    let mounts = std::fs::read_to_string(temp.path().join("mounts.log")).unwrap();
    assert_eq!(
        mounts.lines().collect::<Vec<_>>(),
        [
            "folder0 -o=oneway",
            "folder0 folder1 -o=oneway",
            "folder0 folder1 folder2 -o=oneway",
        ]
    );

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(temp.path().join("run.json")).unwrap())
            .unwrap();
    assert_eq!(report["rows"].as_array().unwrap().len(), 3);
}
