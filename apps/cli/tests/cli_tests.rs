//! xarm-cli 端到端测试（模拟链路，临时配置文件）

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("xarm-cli").unwrap();
    cmd.arg("--config").arg(dir.path().join("config.toml"));
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("xarm-cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("oscillate"))
        .stdout(predicate::str::contains("teach"))
        .stdout(predicate::str::contains("replay"));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();

    cli(&dir)
        .args(["config", "set", "--ip", "192.168.1.221", "--trajectory", "wave"])
        .assert()
        .success();

    cli(&dir)
        .args(["config", "get", "ip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("192.168.1.221"));

    cli(&dir)
        .args(["config", "get", "trajectory"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wave"));
}

#[test]
fn test_config_rejects_invalid_sensitivity() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["config", "set", "--collision", "8"])
        .assert()
        .failure();
}

#[test]
fn test_oscillate_without_ip_fails() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["oscillate", "--duration", "0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--ip"));
}

#[test]
fn test_mock_oscillate_runs_and_stops() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["--mock", "oscillate", "--duration", "0.5", "--amplitude", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Point-to-point motion started"))
        .stdout(predicate::str::contains("Stopped"))
        .stdout(predicate::str::contains("Disconnected"));
}

#[test]
fn test_mock_replay_runs_and_stops() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["--mock", "replay", "--speed", "2", "--duration", "0.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("double_speed=2"))
        .stdout(predicate::str::contains("play:start"))
        .stdout(predicate::str::contains("play:stop"));
}

#[test]
fn test_replay_speed_out_of_range() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["--mock", "replay", "--speed", "7"])
        .assert()
        .failure();
}

#[test]
fn test_mock_teach_saves_after_drag() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["config", "set", "--idle-timeout", "0.3"])
        .assert()
        .success();

    cli(&dir)
        .args(["--mock", "teach", "--timeout", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("recording"))
        .stdout(predicate::str::contains("memory_loop"));
}

#[test]
fn test_client_lifecycle_events_logged_by_default() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .env_remove("RUST_LOG")
        .args(["--mock", "oscillate", "--duration", "0.3", "--amplitude", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("oscillation task started"));
}
