//! 控制层错误类型
//!
//! 所有硬件失败在内部以 [`ControlError`] 传播，只在命令边界被展开为状态文本。

use crate::mode::Mode;
use std::fmt;
use thiserror::Error;
use xarm_link::{ErrorWarnCodes, LinkError, RobotLink};

/// 一次失败的硬件调用
///
/// 控制器返回非零结果码时，会附带当时读取到的错误码/警告码。
#[derive(Debug)]
pub struct HardwareFault {
    pub source: LinkError,
    pub codes: Option<ErrorWarnCodes>,
}

impl HardwareFault {
    /// 不读取错误码，直接包装
    pub fn bare(source: LinkError) -> Self {
        Self {
            source,
            codes: None,
        }
    }

    /// 包装失败并补充控制器错误码/警告码
    ///
    /// 仅对控制器结果码失败执行：读取 (err, warn) 后尽力清除两者。
    /// 读取或清除失败不影响返回值。
    pub fn capture(link: &dyn RobotLink, source: LinkError) -> Self {
        if source.controller_code().is_none() {
            return Self::bare(source);
        }

        let codes = link.query_error_warn().ok();
        let _ = link.clear_error();
        let _ = link.clear_warn();
        Self { source, codes }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.codes) {
            (LinkError::Controller { op, code }, Some(codes)) => {
                write!(f, "{} failed (code {}, {})", op, code, codes)
            },
            (source, _) => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for HardwareFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<LinkError> for HardwareFault {
    fn from(source: LinkError) -> Self {
        Self::bare(source)
    }
}

/// 控制层错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    /// 未连接
    #[error("Not connected")]
    NotConnected,

    /// 连接失败或链路不可用
    #[error("Connect failed: {0}")]
    Connection(HardwareFault),

    /// 模式/状态切换被控制器拒绝
    #[error("Failed to enter {target}: {fault}")]
    ModeTransition { target: Mode, fault: HardwareFault },

    /// 非法的模式切换请求
    #[error("Invalid mode transition: {from} -> {to}")]
    InvalidTransition { from: Mode, to: Mode },

    /// 运动指令失败
    #[error("Motion error: {0}")]
    Motion(HardwareFault),

    /// 读取 TCP 位姿失败
    #[error("Failed to read TCP pose: {0}")]
    PoseRead(HardwareFault),

    /// TCP 位姿读数不完整
    #[error("Malformed TCP pose: expected 6 components, got {0}")]
    InvalidPose(usize),

    /// 轨迹录制失败
    #[error("Recording error: {0}")]
    Recording(HardwareFault),

    /// 轨迹回放失败（瞬时）
    #[error("Playback error: {0}")]
    Playback(HardwareFault),

    /// 可选能力不可用
    #[error("{0} unsupported")]
    Unsupported(&'static str),

    /// 已有后台任务在运行
    #[error("{0}")]
    Busy(&'static str),
}

impl ControlError {
    /// 是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ControlError::Playback(_) | ControlError::Busy(_) => true,
            ControlError::Motion(fault) | ControlError::Recording(fault) => {
                fault.source.is_retryable()
            },
            _ => false,
        }
    }

    /// 是否为可选能力缺失
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ControlError::Unsupported(_))
    }

    /// 底层控制器结果码
    pub fn controller_code(&self) -> Option<i32> {
        match self {
            ControlError::Connection(fault)
            | ControlError::ModeTransition { fault, .. }
            | ControlError::Motion(fault)
            | ControlError::PoseRead(fault)
            | ControlError::Recording(fault)
            | ControlError::Playback(fault) => fault.source.controller_code(),
            _ => None,
        }
    }
}

/// 控制层结果类型
pub type Result<T> = std::result::Result<T, ControlError>;
