use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn supervisorctl() -> Command {
    Command::cargo_bin("supervisorctl").unwrap()
}

#[test]
fn help_lists_subcommands() {
    supervisorctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn no_args_shows_help_and_fails() {
    supervisorctl().assert().failure();
}

#[test]
fn config_validate_accepts_well_formed_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "supervisor_address = \"127.0.0.1:9000\"\n[supervisor]\nhealth_check_interval = 10\n",
    )
    .unwrap();

    supervisorctl()
        .args(["config", "validate", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn config_validate_rejects_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    supervisorctl()
        .args(["config", "validate", "--config"])
        .arg(&missing)
        .assert()
        .failure();
}

#[test]
fn config_validate_rejects_invalid_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "[supervisor]\nhealth_check_interval = 0\n").unwrap();

    supervisorctl()
        .args(["config", "validate", "--config"])
        .arg(&config_path)
        .assert()
        .failure();
}

#[test]
fn config_show_loads_from_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "supervisor_address = \"10.0.0.5:9000\"\n[supervisor]\nhealth_check_interval = 45\n",
    )
    .unwrap();

    supervisorctl()
        .args(["config", "show", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.5:9000"))
        .stdout(predicate::str::contains("45"));
}

#[test]
fn demo_launches_and_tears_down_a_rehearsal_model() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "supervisor_address = \"127.0.0.1:9000\"\n[supervisor]\ndisable_health_monitor = true\n",
    )
    .unwrap();

    supervisorctl()
        .args(["demo", "--config"])
        .arg(&config_path)
        .args(["--workers", "2", "--replica", "2", "--model-name", "rehearsal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("launched 'rehearsal'"))
        .stdout(predicate::str::contains("terminated 'rehearsal'"));
}

#[test]
fn demo_rejects_zero_workers() {
    supervisorctl()
        .args(["demo", "--workers", "0"])
        .assert()
        .failure();
}

#[test]
fn completions_bash() {
    supervisorctl()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("supervisorctl"));
}
