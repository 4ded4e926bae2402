//! 控制器生命周期集成测试（模拟链路）
//!
//! 覆盖连接/断开、往复运动互斥、停止后回中心、运动失败处理。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use xarm_sdk::client::{ControllerOptions, DetectConfig};
use xarm_sdk::link::{ErrorWarnCodes, MockCall, MockConnector, MockLink, MockOp};
use xarm_sdk::protocol::ControllerMode;
use xarm_sdk::{ArmController, Axis, Mode, TaskKind};

struct Rig {
    controller: ArmController,
    connector: Arc<MockConnector>,
    link: Arc<MockLink>,
}

fn rig() -> Rig {
    let link = Arc::new(MockLink::new());
    link.set_move_duration(Duration::from_millis(5));
    let connector = Arc::new(MockConnector::new(link.clone()));
    let options = ControllerOptions {
        motion_join_timeout_ms: 500,
        playback_backoff_ms: 10,
        playback_poll_ms: 5,
        ..Default::default()
    };
    let controller = ArmController::new(connector.clone(), DetectConfig::default(), options);
    Rig {
        controller,
        connector,
        link,
    }
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    pred()
}

fn move_count(link: &MockLink) -> usize {
    link.count_calls(|c| matches!(c, MockCall::MovePose { .. }))
}

/// 最后一次直线运动的目标位姿
fn last_move_target(link: &MockLink) -> Option<[f64; 6]> {
    link.calls().into_iter().rev().find_map(|c| match c {
        MockCall::MovePose { pose, .. } => Some(pose.to_array()),
        _ => None,
    })
}

const CENTER: [f64; 6] = [300.0, 0.0, 200.0, std::f64::consts::PI, 0.0, 0.0];

// ==================== 连接 ====================

#[test]
fn test_connect_refused_stays_disconnected() {
    let rig = rig();
    rig.connector.refuse_connections(true);

    let status = rig.controller.connect("10.0.0.9");
    assert!(status.starts_with("Connect failed"), "{}", status);
    let snap = rig.controller.snapshot();
    assert!(!snap.connected);
    assert_eq!(snap.mode, Mode::Disconnected);

    rig.connector.refuse_connections(false);
    assert_eq!(rig.controller.connect(" 10.0.0.9 "), "Connected to 10.0.0.9");
    assert_eq!(rig.controller.snapshot().ip, "10.0.0.9");
}

#[test]
fn test_enable_failure_releases_link() {
    let rig = rig();
    rig.link.fail(MockOp::EnableMotion, 2);
    rig.link.set_error_warn(ErrorWarnCodes { error: 22, warn: 0 });

    let status = rig.controller.connect("10.0.0.9");
    assert!(status.contains("err=22"), "{}", status);
    assert!(!rig.controller.snapshot().connected);
    assert!(!rig.link.is_connected());
    // 失败后读取并清除错误码
    assert!(rig.link.calls().contains(&MockCall::ClearError));
}

#[test]
fn test_connect_enters_position_ready() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");

    let calls = rig.link.calls();
    assert_eq!(calls[0], MockCall::EnableMotion(true));
    assert!(calls.contains(&MockCall::SetMode(ControllerMode::Position)));
    assert!(calls.contains(&MockCall::SetCollisionSensitivity(3)));
    assert_eq!(rig.controller.snapshot().mode, Mode::PositionReady);
}

#[test]
fn test_disconnect_then_reconnect() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    assert_eq!(rig.controller.disconnect(), "Disconnected");
    assert_eq!(rig.controller.disconnect(), "Disconnected");

    assert_eq!(rig.controller.connect("10.0.0.9"), "Connected to 10.0.0.9");
    assert_eq!(rig.connector.connect_count(), 2);
}

#[test]
fn test_disconnect_during_motion_stops_task() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    rig.controller.play(2.0, 50.0, 50.0, Axis::Z);
    assert!(wait_until(Duration::from_secs(1), || move_count(&rig.link) > 1));

    assert_eq!(rig.controller.disconnect(), "Disconnected");
    let after = move_count(&rig.link);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(move_count(&rig.link), after);
    assert!(!rig.controller.snapshot().playing);

    // 断开前先回到中心位姿
    assert_eq!(last_move_target(&rig.link), Some(CENTER));
    let calls = rig.link.calls();
    let disconnect_at = calls
        .iter()
        .position(|c| matches!(c, MockCall::Disconnect))
        .unwrap();
    let last_move_at = calls
        .iter()
        .rposition(|c| matches!(c, MockCall::MovePose { .. }))
        .unwrap();
    assert!(last_move_at < disconnect_at);
}

// ==================== 往复运动 ====================

#[test]
fn test_single_task_exclusivity() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");

    assert_eq!(
        rig.controller.play(2.0, 50.0, 50.0, Axis::Z),
        "Point-to-point motion started"
    );
    assert_eq!(rig.controller.play(2.0, 50.0, 50.0, Axis::X), "Already playing");
    assert_eq!(rig.controller.start_playback(1.0), "Already playing");
    assert_eq!(
        rig.controller.snapshot().activity,
        Some(TaskKind::Oscillation)
    );

    assert_eq!(rig.controller.stop(), "Stopped");
}

#[test]
fn test_stop_when_idle_without_center() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    rig.link.clear_calls();

    assert_eq!(rig.controller.stop(), "Stopped");
    assert_eq!(move_count(&rig.link), 0);
}

#[test]
fn test_stop_reports_return_pose_error() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    rig.controller.play(2.0, 50.0, 50.0, Axis::Z);
    assert!(wait_until(Duration::from_secs(1), || move_count(&rig.link) > 0));

    rig.link.fail(MockOp::MovePose, 7);
    let status = rig.controller.stop();
    assert!(
        status.starts_with("Stopped, return pose error: set_position failed (code 7"),
        "{}",
        status
    );
    assert!(!rig.controller.snapshot().playing);
}

#[test]
fn test_motion_failure_ends_task() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    rig.link.fail_times(MockOp::MovePose, 1, 31);

    rig.controller.play(2.0, 50.0, 50.0, Axis::Y);
    assert!(wait_until(Duration::from_secs(1), || {
        !rig.controller.snapshot().playing
    }));
    let status = rig.controller.status();
    assert!(status.starts_with("Motion error: set_position failed (code 31"), "{}", status);

    // 任务结束后可以重新开始
    assert_eq!(
        rig.controller.play(2.0, 50.0, 50.0, Axis::Y),
        "Point-to-point motion started"
    );
    rig.controller.stop();
}

#[test]
fn test_pose_read_failure_aborts_play() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    rig.link.fail(MockOp::ReadPose, 3);

    let status = rig.controller.play(2.0, 50.0, 50.0, Axis::Z);
    assert!(status.starts_with("Failed to read TCP pose"), "{}", status);
    assert!(!rig.controller.snapshot().playing);
}

#[test]
fn test_teach_entry_returns_to_center_first() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");
    rig.controller.play(2.0, 50.0, 50.0, Axis::Z);
    assert!(wait_until(Duration::from_secs(1), || move_count(&rig.link) > 1));

    assert_eq!(rig.controller.set_teach_mode(true), "waiting");
    let snap = rig.controller.snapshot();
    assert!(!snap.playing);
    assert_eq!(snap.mode, Mode::Teach);

    // 回中心的运动发生在切换示教模式之前
    assert_eq!(last_move_target(&rig.link), Some(CENTER));
    let calls = rig.link.calls();
    let teach_at = calls
        .iter()
        .position(|c| matches!(c, MockCall::SetMode(ControllerMode::Teach)))
        .unwrap();
    let last_move_at = calls
        .iter()
        .rposition(|c| matches!(c, MockCall::MovePose { .. }))
        .unwrap();
    assert!(last_move_at < teach_at);

    // 示教模式下 stop 不回中心、不退出示教
    let before = move_count(&rig.link);
    assert_eq!(rig.controller.stop(), "Stopped");
    assert_eq!(move_count(&rig.link), before);
    assert_eq!(rig.controller.snapshot().mode, Mode::Teach);
}

#[test]
fn test_concurrent_commands_are_serialized() {
    let rig = rig();
    rig.controller.connect("10.0.0.9");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let controller = rig.controller.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    controller.play(1.0, 40.0, 40.0, Axis::Z)
                } else {
                    controller.stop()
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    rig.controller.stop();
    let snap = rig.controller.snapshot();
    assert!(!snap.playing);
    assert_eq!(snap.activity, None);
    assert_eq!(snap.mode, Mode::PositionReady);
}
