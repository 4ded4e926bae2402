//! 链路层错误类型定义

use thiserror::Error;
use xarm_protocol::ProtocolError;

/// 链路层错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    /// 底层 I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 控制器返回非零结果码
    #[error("{op} failed (code {code})")]
    Controller { op: &'static str, code: i32 },

    /// 操作超时
    #[error("Operation timeout: {0}")]
    Timeout(&'static str),

    /// 未连接或已断开
    #[error("Not connected")]
    NotConnected,

    /// 连接失败
    #[error("Connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    /// 可选能力不可用
    #[error("{0} unsupported")]
    Unsupported(&'static str),

    /// 上报通道已关闭
    #[error("Report channel closed")]
    ChannelClosed,
}

impl LinkError {
    /// 控制器结果码（仅 `Controller` 变体）
    pub fn controller_code(&self) -> Option<i32> {
        match self {
            LinkError::Controller { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// 是否为可选能力缺失
    pub fn is_unsupported(&self) -> bool {
        matches!(self, LinkError::Unsupported(_))
    }

    /// 是否可重试（瞬时故障）
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::Timeout(_) | LinkError::Controller { .. })
    }

    /// 是否表示链路已不可用
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            LinkError::NotConnected | LinkError::ChannelClosed | LinkError::Io(_)
        )
    }
}

/// 链路层结果类型
pub type LinkResult<T> = Result<T, LinkError>;
