//! 往复运动循环

use crate::cancel::CancellationToken;
use crate::error::{ControlError, HardwareFault, Result};
use crate::mode;
use crate::planner::{OscillationPlan, TCP_JERK_MMPS3};
use tracing::{debug, info, trace, warn};
use xarm_link::{Pose, RobotLink};

/// 在两个端点间往复，直到令牌被取消
///
/// 每次运动阻塞到到位；取消只在两次运动之间检查。
/// 任何一次运动失败立即返回 [`ControlError::Motion`]，不重试。
/// 返回完成的单程次数。
pub fn run(link: &dyn RobotLink, plan: &OscillationPlan, token: &CancellationToken) -> Result<u64> {
    if let Err(e) = link.set_tcp_jerk(TCP_JERK_MMPS3) {
        warn!(error = %e, "failed to set TCP jerk");
    }

    info!(
        speed = plan.speed_mmps,
        accel = plan.accel_mmps2,
        peak_to_peak = plan.peak_to_peak(),
        "oscillation started"
    );

    let mut strokes = 0u64;
    let mut toward_high = true;
    while !token.is_cancelled() {
        let target = if toward_high { &plan.high } else { &plan.low };
        link.move_pose(target, plan.speed_mmps, Some(plan.accel_mmps2), true)
            .map_err(|e| ControlError::Motion(HardwareFault::capture(link, e)))?;

        strokes += 1;
        toward_high = !toward_high;
        trace!(strokes, "stroke complete");
    }

    debug!(strokes, "oscillation cancelled");
    Ok(strokes)
}

/// 停止后回到中心位姿
///
/// 先尽力进入 PositionReady，再以 `speed` 阻塞移动到 `center`。
pub fn return_to_center(link: &dyn RobotLink, center: &Pose, speed: f64) -> Result<()> {
    if let Err(e) = mode::force_position_ready(link) {
        warn!(error = %e, "position mode before return failed");
    }
    link.move_pose(center, speed, None, true)
        .map_err(|e| ControlError::Motion(HardwareFault::capture(link, e)))?;
    debug!(%center, speed, "returned to center pose");
    Ok(())
}
