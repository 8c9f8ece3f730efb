//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("accesswatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Continuous accessibility-compliance monitoring",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("accesswatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("accesswatch"));
}

#[test]
fn test_run_batch_subcommand_exists() {
    Command::cargo_bin("accesswatch")
        .unwrap()
        .args(["run-batch", "--help"])
        .assert()
        .success();
}

#[test]
fn test_schedule_subcommands_exist() {
    Command::cargo_bin("accesswatch")
        .unwrap()
        .args(["schedule", "list", "--help"])
        .assert()
        .success();

    Command::cargo_bin("accesswatch")
        .unwrap()
        .args(["schedule", "add", "--help"])
        .assert()
        .success();

    Command::cargo_bin("accesswatch")
        .unwrap()
        .args(["schedule", "dry-run", "--help"])
        .assert()
        .success();
}

#[test]
fn test_alerts_subcommand_exists() {
    Command::cargo_bin("accesswatch")
        .unwrap()
        .args(["alerts", "list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_schedule_add_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("accesswatch.toml");
    let db_path = dir.path().join("watch.db");
    std::fs::write(
        &config_path,
        format!("db_path = \"{}\"\n", db_path.display()),
    )
    .unwrap();

    Command::cargo_bin("accesswatch")
        .unwrap()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "schedule",
            "add",
            "--url",
            "https://example.com",
            "--day",
            "3",
            "--time",
            "09:00",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("added"));

    Command::cargo_bin("accesswatch")
        .unwrap()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "schedule",
            "list",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("https://example.com"));
}

#[test]
fn test_schedule_add_rejects_bad_day() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("accesswatch.toml");
    let db_path = dir.path().join("watch.db");
    std::fs::write(
        &config_path,
        format!("db_path = \"{}\"\n", db_path.display()),
    )
    .unwrap();

    Command::cargo_bin("accesswatch")
        .unwrap()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "schedule",
            "add",
            "--url",
            "https://example.com",
            "--day",
            "9",
            "--time",
            "09:00",
        ])
        .assert()
        .failure();
}
