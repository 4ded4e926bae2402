//! xArm SDK - 往复运动与示教录制/回放控制
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 私有 Modbus-TCP 帧编解码
//! - **链路层** (`link`): [`RobotLink`] 抽象，TCP 与模拟实现
//! - **控制层** (`client`): 模式状态机、后台任务与 [`ArmController`]
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use xarm_sdk::prelude::*;
//!
//! xarm_sdk::init_logger();
//! let controller = ArmController::tcp(DetectConfig::default(), ControllerOptions::default());
//! println!("{}", controller.connect("192.168.1.221"));
//! println!("{}", controller.set_teach_mode(true));
//! ```

pub use xarm_client as client;
pub use xarm_link as link;
pub use xarm_protocol as protocol;

pub mod prelude;

use std::sync::Once;

// 控制层（推荐入口）
pub use client::{
    ArmController, Axis, ControlError, ControllerOptions, ControllerSnapshot, DetectConfig,
    HardwareFault, Mode, SpeedMultiplier, TaskKind,
};

// 链路层
pub use link::{AngleUnit, LinkConnector, LinkError, Pose, RobotLink, TcpConnector};

// 协议层错误
pub use protocol::ProtocolError;

static LOGGER: Once = Once::new();

/// 初始化日志（可重复调用）
///
/// 使用 `RUST_LOG` 环境变量，缺省为 `info`；同时将 `log` 记录转发到 `tracing`。
/// 若进程中已安装其他订阅者，则保持不变。
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = tracing_log::LogTracer::init();

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

        log::debug!("xarm-sdk logger initialized");
    });
}
