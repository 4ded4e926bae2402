//! 位姿几何
//!
//! 由姿态角构造旋转矩阵、选取工具坐标轴并归一化。
//! 旋转采用内旋 roll→pitch→yaw：`R = Rz(yaw)·Ry(pitch)·Rx(roll)`。

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xarm_link::{AngleUnit, Pose};

/// 归一化时的最小模长
pub const MIN_NORM: f64 = 1e-9;

/// 工具坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    /// 旋转矩阵中的列索引
    pub fn column(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        };
        f.write_str(name)
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            _ => Err(format!("Invalid axis '{}', expected X, Y or Z", s)),
        }
    }
}

/// 由姿态角构造旋转矩阵
pub fn rotation_from_rpy(roll: f64, pitch: f64, yaw: f64, unit: AngleUnit) -> Rotation3<f64> {
    Rotation3::from_euler_angles(
        unit.to_radians(roll),
        unit.to_radians(pitch),
        unit.to_radians(yaw),
    )
}

/// 归一化（模长下限为 [`MIN_NORM`]）
pub fn normalize(v: Vector3<f64>) -> Vector3<f64> {
    v / v.norm().max(MIN_NORM)
}

/// 工具坐标轴在基坐标系中的单位方向
pub fn tool_axis_direction(pose: &Pose, axis: Axis, unit: AngleUnit) -> Vector3<f64> {
    let rotation = rotation_from_rpy(pose.roll, pose.pitch, pose.yaw, unit);
    normalize(rotation.matrix().column(axis.column()).into_owned())
}
