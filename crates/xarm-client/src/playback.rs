//! 轨迹循环回放
//!
//! 连续的界面速度值（0..=5）吸附到控制器支持的倍速 {1, 2, 4}。
//! 单次回放失败视为瞬时忙碌：退避后重试，不终止循环。

use crate::cancel::CancellationToken;
use crate::error::{ControlError, HardwareFault};
use crate::mode;
use std::time::Duration;
use tracing::{debug, info, warn};
use xarm_link::RobotLink;
use xarm_protocol::{ControllerState, SpeedMultiplier};

/// 速度选择器上限
pub const MAX_SPEED_SELECTOR: f64 = 5.0;

/// 截断速度选择器到 [0, 5]
pub fn clamp_selector(selector: f64) -> f64 {
    if selector.is_nan() {
        0.0
    } else {
        selector.clamp(0.0, MAX_SPEED_SELECTOR)
    }
}

/// 速度吸附：≥3 → 4，≥1.5 → 2，其余 → 1
pub fn snap_speed_multiplier(selector: f64) -> SpeedMultiplier {
    let v = clamp_selector(selector);
    if v >= 3.0 {
        SpeedMultiplier::X4
    } else if v >= 1.5 {
        SpeedMultiplier::X2
    } else {
        SpeedMultiplier::X1
    }
}

/// 回放参数
#[derive(Debug, Clone)]
pub struct PlaybackParams {
    pub trajectory_name: String,
    pub speed: SpeedMultiplier,
    pub backoff: Duration,
    pub poll: Duration,
}

/// 回放循环
///
/// `on_error` 在每次回放失败时被调用（用于更新状态文本）。
/// 返回成功完成的回放次数。
pub fn run<F>(
    link: &dyn RobotLink,
    params: &PlaybackParams,
    token: &CancellationToken,
    mut on_error: F,
) -> u64
where
    F: FnMut(&ControlError),
{
    let name = params.trajectory_name.as_str();

    if let Err(e) = mode::force_position_ready(link) {
        warn!(error = %e, "position mode before playback failed");
    }
    if let Err(e) = link.load_trajectory(name) {
        warn!(trajectory = name, error = %e, "trajectory preload failed, playing anyway");
    }

    info!(trajectory = name, speed = %params.speed, "playback loop started");
    let mut passes = 0u64;
    while !token.is_cancelled() {
        match link.play_trajectory(name, 1, true, params.speed) {
            Ok(()) => {
                passes += 1;
                debug!(passes, "playback pass complete");
            },
            Err(e) => {
                let err = ControlError::Playback(HardwareFault::capture(link, e));
                warn!(error = %err, "playback pass failed, backing off");
                on_error(&err);
                if token.wait_timeout(params.backoff) {
                    break;
                }
            },
        }
        if token.wait_timeout(params.poll) {
            break;
        }
    }

    // 退出时恢复就绪状态
    if let Err(e) = link.set_state(ControllerState::Ready) {
        warn!(error = %e, "ready state after playback failed");
    }
    info!(passes, "playback loop stopped");
    passes
}
