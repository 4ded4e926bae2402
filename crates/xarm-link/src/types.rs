//! 链路层公共类型
//!
//! 位姿、角度单位、关节上报与控制器错误/警告码。

use std::fmt;
use std::time::Instant;

/// 位姿分量个数
pub const POSE_COMPONENTS: usize = 6;

/// 姿态角单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleUnit {
    /// 弧度
    #[default]
    Radian,
    /// 角度
    Degree,
}

impl AngleUnit {
    /// 转换为弧度
    pub fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radian => value,
            AngleUnit::Degree => value.to_radians(),
        }
    }

    /// 从弧度转换为当前单位
    pub fn from_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radian => value,
            AngleUnit::Degree => value.to_degrees(),
        }
    }
}

/// TCP 位姿
///
/// 位置单位为 mm；姿态角单位由会话的 [`AngleUnit`] 决定。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    /// 从原始读数构造
    ///
    /// 分量少于 6 个时返回 `None`（读数不完整）；多余分量被忽略。
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x, y, z, roll, pitch, yaw, ..] => Some(Self::new(*x, *y, *z, *roll, *pitch, *yaw)),
            _ => None,
        }
    }

    /// 按 `[x, y, z, roll, pitch, yaw]` 顺序输出
    pub fn to_array(&self) -> [f64; POSE_COMPONENTS] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }

    /// 位置分量
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// 平移后的位姿（姿态不变）
    pub fn translated(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
            ..*self
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1}, {:.1}, {:.3}, {:.3}, {:.3}]",
            self.x, self.y, self.z, self.roll, self.pitch, self.yaw
        )
    }
}

/// 关节角上报
#[derive(Debug, Clone, PartialEq)]
pub struct JointReport {
    /// 关节角（rad），可能为空（上报不完整）
    pub angles: Vec<f64>,
    /// 接收时间
    pub received_at: Instant,
}

impl JointReport {
    pub fn new(angles: Vec<f64>) -> Self {
        Self {
            angles,
            received_at: Instant::now(),
        }
    }
}

/// 控制器错误码/警告码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorWarnCodes {
    pub error: i32,
    pub warn: i32,
}

impl ErrorWarnCodes {
    /// 两者都为 0
    pub fn is_clear(&self) -> bool {
        self.error == 0 && self.warn == 0
    }
}

impl fmt::Display for ErrorWarnCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err={}, warn={}", self.error, self.warn)
    }
}
