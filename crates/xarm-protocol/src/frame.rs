//! 请求/响应帧编解码
//!
//! ```text
//! 请求:  [tid:u16 BE][proto:u16 BE][len:u16 BE][register:u8][params...]
//! 响应:  [tid:u16 BE][proto:u16 BE][len:u16 BE][register:u8][status:u8][payload...]
//! ```
//!
//! `len` 计入寄存器号之后的全部字节（含寄存器号本身）。

use crate::{FRAME_HEADER_LEN, PRIVATE_PROTOCOL_ID, ProtocolError, Register, bytes_to_u16_be};
use bilge::prelude::*;
use bytes::{BufMut, Bytes, BytesMut};

/// 响应状态字节
///
/// - Bit 0-3: 保留
/// - Bit 4: 控制器未就绪
/// - Bit 5: 控制器存在警告（0x20）
/// - Bit 6: 控制器存在错误（0x40）
/// - Bit 7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct StatusByte {
    pub reserved_low: u4,  // Bit 0-3
    pub not_ready: bool,   // Bit 4
    pub warning: bool,     // Bit 5
    pub error: bool,       // Bit 6
    pub reserved_high: u1, // Bit 7
}

impl StatusByte {
    /// 从原始字节构造
    pub fn from_byte(byte: u8) -> Self {
        StatusByte::from(u8::new(byte))
    }

    /// 编码为原始字节
    pub fn to_byte(self) -> u8 {
        u8::from(self).value()
    }

    /// 根据状态位推导返回码
    ///
    /// 运动类指令：错误位或未就绪位视为失败。
    /// 其他指令：状态位只反映控制器既有的错误/警告，不算指令失败。
    pub fn result_code(self, register: Register) -> i32 {
        if !register.is_motion() {
            return crate::CODE_OK;
        }
        if self.error() {
            crate::CODE_ERROR
        } else if self.not_ready() {
            crate::CODE_NOT_READY
        } else {
            crate::CODE_OK
        }
    }
}

/// 请求帧
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub transaction_id: u16,
    pub register: Register,
    pub params: Bytes,
}

impl RequestFrame {
    /// 创建请求帧
    pub fn new(transaction_id: u16, register: Register, params: impl Into<Bytes>) -> Self {
        Self {
            transaction_id,
            register,
            params: params.into(),
        }
    }

    /// 编码为线上字节
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 1 + self.params.len());
        buf.put_u16(self.transaction_id);
        buf.put_u16(PRIVATE_PROTOCOL_ID);
        buf.put_u16((self.params.len() + 1) as u16);
        buf.put_u8(self.register.into());
        buf.put_slice(&self.params);
        buf
    }
}

/// 从帧头读取剩余字节数（帧头之后）
///
/// # 错误
///
/// 协议号不是私有协议时返回 `InvalidProtocolId`。
pub fn body_len(header: &[u8; FRAME_HEADER_LEN]) -> Result<usize, ProtocolError> {
    let protocol = bytes_to_u16_be([header[2], header[3]]);
    if protocol != PRIVATE_PROTOCOL_ID {
        return Err(ProtocolError::InvalidProtocolId(protocol));
    }
    Ok(bytes_to_u16_be([header[4], header[5]]) as usize)
}

/// 响应帧
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub transaction_id: u16,
    pub register: Register,
    pub status: StatusByte,
    pub payload: Bytes,
}

impl ResponseFrame {
    /// 解析完整响应帧（含帧头）
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        const MIN_LEN: usize = FRAME_HEADER_LEN + 2;
        if buf.len() < MIN_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: MIN_LEN,
                actual: buf.len(),
            });
        }

        let header: [u8; FRAME_HEADER_LEN] = [buf[0], buf[1], buf[2], buf[3], buf[4], buf[5]];
        let declared = body_len(&header)?;
        let actual = buf.len() - FRAME_HEADER_LEN;
        if declared != actual {
            return Err(ProtocolError::InvalidLength {
                expected: declared + FRAME_HEADER_LEN,
                actual: buf.len(),
            });
        }

        Ok(Self {
            transaction_id: bytes_to_u16_be([buf[0], buf[1]]),
            register: Register::from_byte(buf[6])?,
            status: StatusByte::from_byte(buf[7]),
            payload: Bytes::copy_from_slice(&buf[MIN_LEN..]),
        })
    }

    /// 编码为线上字节（控制器侧格式，用于模拟服务端）
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 2 + self.payload.len());
        buf.put_u16(self.transaction_id);
        buf.put_u16(PRIVATE_PROTOCOL_ID);
        buf.put_u16((self.payload.len() + 2) as u16);
        buf.put_u8(self.register.into());
        buf.put_u8(self.status.to_byte());
        buf.put_slice(&self.payload);
        buf
    }

    /// 校验事务号与寄存器号是否与请求一致
    pub fn check_matches(&self, request: &RequestFrame) -> Result<(), ProtocolError> {
        if self.transaction_id != request.transaction_id {
            return Err(ProtocolError::TransactionMismatch {
                expected: request.transaction_id,
                actual: self.transaction_id,
            });
        }
        if self.register != request.register {
            return Err(ProtocolError::RegisterMismatch {
                expected: request.register,
                actual: self.register,
            });
        }
        Ok(())
    }

    /// 返回码（见 [`StatusByte::result_code`]）
    pub fn result_code(&self) -> i32 {
        self.status.result_code(self.register)
    }
}
