//! # xArm Link
//!
//! 控制器硬件链路抽象
//!
//! ## 模块
//!
//! - `link`: [`RobotLink`] / [`LinkConnector`] trait
//! - `types`: 位姿、角度单位、关节上报
//! - `error`: [`LinkError`]
//! - `tcp`: 真实控制器链路（私有 Modbus-TCP）
//! - `mock`: 模拟链路（`mock` feature）

pub mod error;
pub mod link;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod tcp;
pub mod types;

pub use error::{LinkError, LinkResult};
pub use link::{LinkConnector, RobotLink};
pub use tcp::{TcpConnector, TcpLink, TcpLinkConfig};
pub use types::{AngleUnit, ErrorWarnCodes, JointReport, POSE_COMPONENTS, Pose};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCall, MockConnector, MockLink, MockOp};
