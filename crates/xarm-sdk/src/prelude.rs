//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use xarm_sdk::prelude::*;
//! ```

// 控制层
pub use crate::client::{
    ArmController, Axis, ControllerOptions, ControllerSnapshot, DetectConfig, Mode, TaskKind,
};

// 链路层
pub use crate::link::{LinkConnector, Pose, RobotLink, TcpConnector};

// 错误类型
pub use crate::client::ControlError;
pub use crate::link::LinkError;
