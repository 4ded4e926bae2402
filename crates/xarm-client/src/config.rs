//! 控制器配置
//!
//! [`DetectConfig`] 与 [`ControllerOptions`] 在启动时确定，之后只读。
//! 两者均可从 TOML 反序列化，缺省字段取默认值。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use xarm_protocol::MAX_SENSITIVITY;

/// 默认轨迹名
pub const DEFAULT_TRAJECTORY_NAME: &str = "memory_loop";

/// 示教运动检测参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// 运动判定阈值（rad）
    pub motion_threshold_rad: f64,
    /// 静止多久后结束录制（秒）
    pub idle_timeout_seconds: f64,
    /// 关节上报频率（仅供参考）
    pub report_hz: u32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            motion_threshold_rad: 0.015,
            idle_timeout_seconds: 1.0,
            report_hz: 100,
        }
    }
}

impl DetectConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.idle_timeout_seconds).unwrap_or(Duration::from_secs(1))
    }
}

/// 控制器行为参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// 往复运动线程的等待上限（毫秒）
    pub motion_join_timeout_ms: u64,
    /// 回放线程的等待上限（毫秒）
    pub playback_join_timeout_ms: u64,
    /// 检测线程的等待上限（毫秒）
    pub detector_join_timeout_ms: u64,
    /// 回放失败后的退避时间（毫秒）
    pub playback_backoff_ms: u64,
    /// 回放循环的取消轮询间隔（毫秒）
    pub playback_poll_ms: u64,
    /// 录制与回放使用的轨迹名
    pub trajectory_name: String,
    /// 连接时设置的碰撞灵敏度
    pub collision_sensitivity: u8,
    /// 连接时设置的示教灵敏度
    pub teach_sensitivity: u8,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            motion_join_timeout_ms: 2000,
            playback_join_timeout_ms: 1000,
            detector_join_timeout_ms: 1000,
            playback_backoff_ms: 200,
            playback_poll_ms: 50,
            trajectory_name: DEFAULT_TRAJECTORY_NAME.to_string(),
            collision_sensitivity: 3,
            teach_sensitivity: 3,
        }
    }
}

impl ControllerOptions {
    pub fn motion_join_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_join_timeout_ms)
    }

    pub fn playback_join_timeout(&self) -> Duration {
        Duration::from_millis(self.playback_join_timeout_ms)
    }

    pub fn detector_join_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_join_timeout_ms)
    }

    pub fn playback_backoff(&self) -> Duration {
        Duration::from_millis(self.playback_backoff_ms)
    }

    pub fn playback_poll(&self) -> Duration {
        Duration::from_millis(self.playback_poll_ms)
    }
}

/// 灵敏度截断到 0..=5
pub fn clamp_sensitivity(level: i64) -> u8 {
    level.clamp(0, MAX_SENSITIVITY as i64) as u8
}
