//! 控制器模块
//!
//! 本模块在 [`xarm_link::RobotLink`] 之上实现三种工作流：
//! - 往复运动：沿工具坐标轴在两个端点间点到点往复
//! - 示教录制：拖动示教，运动检测自动开始/停止录制
//! - 轨迹回放：以 1/2/4 倍速循环回放已保存的轨迹
//!
//! # 使用场景
//!
//! 界面层只需持有 [`ArmController`]，调用命令方法并轮询 [`ControllerSnapshot`]。
//! 纯函数部分（[`planner`]、[`geometry`]、[`detector`]）可单独使用。

pub mod cancel;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod mode;
pub mod motion;
pub mod planner;
pub mod playback;
pub mod session;
pub mod snapshot;
pub mod task;

// 重新导出常用类型
pub use cancel::CancellationToken;
pub use config::{ControllerOptions, DEFAULT_TRAJECTORY_NAME, DetectConfig};
pub use controller::ArmController;
pub use detector::{DetectorAction, MotionClassifier, RecordingState};
pub use error::{ControlError, HardwareFault, Result};
pub use geometry::Axis;
pub use mode::Mode;
pub use planner::{MotionConfig, MotionLimits, OscillationPlan};
pub use snapshot::ControllerSnapshot;
pub use task::TaskKind;
pub use xarm_protocol::SpeedMultiplier;
