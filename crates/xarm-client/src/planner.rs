//! 往复运动规划
//!
//! 以当前位姿为中心，沿所选工具轴计算两个端点，并由会话缓存的速度/加速度上限
//! 推导目标速度与加速度。

use crate::error::{ControlError, Result};
use crate::geometry::{Axis, tool_axis_direction};
use nalgebra::Vector3;
use xarm_link::{AngleUnit, Pose};

/// 速度标定系数（补偿 SDK 上报的保守上限）
pub const SPEED_MULTIPLIER: f64 = 4.0;
/// 加速度标定系数
pub const ACCEL_MULTIPLIER: f64 = 4.0;
/// 峰峰值振幅上限（mm）
pub const MAX_AMPLITUDE_MM: f64 = 200.0;
/// 回中心时的最低速度（mm/s）
pub const MIN_RETURN_SPEED_MMPS: f64 = 20.0;
/// 往复前设置的 TCP 加加速度（mm/s³）
pub const TCP_JERK_MMPS3: f64 = 50_000.0;

/// 单次往复运动的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    /// 峰峰值振幅（mm，已截断到 0..=200）
    pub amplitude_mm: f64,
    /// 速度比例 0..=1
    pub speed_fraction: f64,
    /// 加速度比例 0..=1
    pub accel_fraction: f64,
    pub axis: Axis,
}

impl MotionConfig {
    /// 由界面输入构造：振幅为 cm，速度/加速度为百分比
    pub fn from_ui(amplitude_cm: f64, speed_pct: f64, accel_pct: f64, axis: Axis) -> Self {
        Self {
            amplitude_mm: clamp_finite(amplitude_cm * 10.0, 0.0, MAX_AMPLITUDE_MM),
            speed_fraction: clamp_finite(speed_pct, 0.0, 100.0) / 100.0,
            accel_fraction: clamp_finite(accel_pct, 0.0, 100.0) / 100.0,
            axis,
        }
    }
}

/// 会话缓存的线速度/线加速度上限
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    pub max_linear_velocity_mmps: f64,
    pub max_linear_accel_mmps2: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            max_linear_velocity_mmps: 200.0,
            max_linear_accel_mmps2: 1000.0,
        }
    }
}

/// 规划结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillationPlan {
    /// 中心位姿（运动任务期间不变）
    pub center: Pose,
    pub low: Pose,
    pub high: Pose,
    /// 基坐标系下的单位方向
    pub direction: Vector3<f64>,
    pub speed_mmps: f64,
    pub accel_mmps2: f64,
}

impl OscillationPlan {
    /// 两端点间距离（mm）
    pub fn peak_to_peak(&self) -> f64 {
        let low = Vector3::from(self.low.position());
        let high = Vector3::from(self.high.position());
        (high - low).norm()
    }
}

/// 规划往复端点
///
/// `raw_pose` 为一次位姿读数；少于 6 个分量时返回 [`ControlError::InvalidPose`]。
pub fn plan(
    raw_pose: &[f64],
    config: &MotionConfig,
    limits: &MotionLimits,
    unit: AngleUnit,
) -> Result<OscillationPlan> {
    let center = Pose::from_slice(raw_pose).ok_or(ControlError::InvalidPose(raw_pose.len()))?;

    let direction = tool_axis_direction(&center, config.axis, unit);
    let half = config.amplitude_mm.clamp(0.0, MAX_AMPLITUDE_MM) / 2.0;
    let offset = direction * half;

    Ok(OscillationPlan {
        center,
        low: center.translated(-offset.x, -offset.y, -offset.z),
        high: center.translated(offset.x, offset.y, offset.z),
        direction,
        speed_mmps: config.speed_fraction * limits.max_linear_velocity_mmps * SPEED_MULTIPLIER,
        accel_mmps2: config.accel_fraction * limits.max_linear_accel_mmps2 * ACCEL_MULTIPLIER,
    })
}

/// 停止后回到中心点的速度：`max(20, min(vmax, vmax·fraction))`
pub fn return_speed(max_linear_velocity_mmps: f64, speed_fraction: f64) -> f64 {
    let vmax = max_linear_velocity_mmps;
    (vmax * speed_fraction.clamp(0.0, 1.0))
        .min(vmax)
        .max(MIN_RETURN_SPEED_MMPS)
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
