//! 实时上报帧解析（30003 端口）
//!
//! ```text
//! [len:u32 BE][state|mode:u8][cmdnum:u16 BE][angles:7×f32 LE][pose:6×f32 LE][torques:7×f32 LE]...
//! ```
//!
//! 只解析关节角与位姿；固件追加的其他字段被忽略。

use crate::{ControllerMode, ControllerState, ProtocolError, bytes_to_f32s_le, bytes_to_u32_be};
use bilge::prelude::*;

/// 长度前缀字节数
pub const REPORT_LEN_PREFIX: usize = 4;

/// 解析所需的最短帧长度：前缀(4) + 状态(1) + 指令数(2) + 关节(28) + 位姿(24)
pub const REPORT_MIN_LEN: usize = 59;

const ANGLES_OFFSET: usize = 7;
const POSE_OFFSET: usize = 35;

/// 状态/模式字节
///
/// - Bit 0-3: 控制器状态
/// - Bit 4-7: 控制器模式
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct StateModeByte {
    pub state: u4, // Bit 0-3
    pub mode: u4,  // Bit 4-7
}

/// 实时上报
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeReport {
    pub state: ControllerState,
    pub mode: ControllerMode,
    /// 指令缓存数量
    pub command_count: u16,
    /// 7 个关节角（rad）
    pub joint_angles: [f32; 7],
    /// TCP 位姿（mm / rad）
    pub tcp_pose: [f32; 6],
}

impl RealtimeReport {
    /// 从长度前缀读取整帧长度（含前缀本身）
    pub fn declared_len(prefix: [u8; REPORT_LEN_PREFIX]) -> usize {
        bytes_to_u32_be(prefix) as usize
    }

    /// 解析完整上报帧（含长度前缀）
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < REPORT_MIN_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: REPORT_MIN_LEN,
                actual: buf.len(),
            });
        }

        let flags = StateModeByte::from(u8::new(buf[4]));
        let angles = bytes_to_f32s_le(&buf[ANGLES_OFFSET..], 7)?;
        let pose = bytes_to_f32s_le(&buf[POSE_OFFSET..], 6)?;

        let mut joint_angles = [0f32; 7];
        joint_angles.copy_from_slice(&angles);
        let mut tcp_pose = [0f32; 6];
        tcp_pose.copy_from_slice(&pose);

        Ok(Self {
            state: ControllerState::from(flags.state().value()),
            mode: ControllerMode::from(flags.mode().value()),
            command_count: u16::from_be_bytes([buf[5], buf[6]]),
            joint_angles,
            tcp_pose,
        })
    }
}
