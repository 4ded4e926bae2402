//! # xArm Protocol
//!
//! 控制器私有 Modbus-TCP 协议定义（无 I/O 依赖）
//!
//! ## 模块
//!
//! - `registers`: 寄存器（功能码）定义
//! - `constants`: 端口、控制器模式/状态等协议常量
//! - `frame`: 请求/响应帧编解码
//! - `command`: 指令参数编码与响应载荷解码
//! - `report`: 实时上报帧解析（30003 端口）
//!
//! ## 字节序
//!
//! 帧头与整数参数使用大端字节序；浮点参数为小端 f32。
//! 本模块提供了字节序转换工具函数。

pub mod command;
pub mod constants;
pub mod frame;
pub mod registers;
pub mod report;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use frame::*;
pub use registers::*;
pub use report::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid protocol id: 0x{0:04X}")]
    InvalidProtocolId(u16),

    #[error("Unknown register: {0}")]
    UnknownRegister(u8),

    #[error("Register mismatch: expected {expected:?}, got {actual:?}")]
    RegisterMismatch {
        expected: Register,
        actual: Register,
    },

    #[error("Transaction mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u16, actual: u16 },

    #[error("Invalid trajectory name: {0:?}")]
    InvalidName(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },
}

/// 字节序转换工具函数
///
/// 帧头和整型参数为大端字节序，浮点数为小端 f32。
///
/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// 大端字节序转 u32
pub fn bytes_to_u32_be(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// i32 转大端字节序
pub fn i32_to_bytes_be(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

/// f32 序列转小端字节
pub fn f32s_to_bytes_le(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// 从小端字节中解析 `count` 个 f32
///
/// # 错误
///
/// 字节数不足 `count * 4` 时返回 `InvalidLength`。
pub fn bytes_to_f32s_le(bytes: &[u8], count: usize) -> Result<Vec<f32>, ProtocolError> {
    let expected = count * 4;
    if bytes.len() < expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(bytes[..expected]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
