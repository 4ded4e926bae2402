//! 指令参数编码与响应载荷解码
//!
//! 每个 `encode_*` 函数返回对应寄存器的参数字节；`decode_*` 解析响应载荷。

use crate::{
    ControllerMode, ControllerState, MAX_SENSITIVITY, MOTION_ENABLE_ALL_AXES, ProtocolError,
    SpeedMultiplier, TRAJECTORY_NAME_LEN, TrajectoryStatus, bytes_to_f32s_le, f32s_to_bytes_le,
    i32_to_bytes_be,
};

// ==================== 参数编码 ====================

/// `MotionEnable`：使能/失能全部关节
pub fn encode_motion_enable(enable: bool) -> Vec<u8> {
    vec![MOTION_ENABLE_ALL_AXES, enable as u8]
}

/// `SetMode`
pub fn encode_set_mode(mode: ControllerMode) -> Vec<u8> {
    vec![mode.code()]
}

/// `SetState`
pub fn encode_set_state(state: ControllerState) -> Vec<u8> {
    vec![state.code()]
}

/// `MoveLine`：目标位姿（mm / rad）+ 速度 + 加速度 + 运动时间
///
/// 9 个小端 f32。`accel` 为 `None` 时发送 0，由控制器使用其默认加速度。
pub fn encode_move_line(pose: [f64; 6], speed: f64, accel: Option<f64>) -> Vec<u8> {
    let mut values = [0f32; 9];
    for (slot, v) in values.iter_mut().zip(pose.iter()) {
        *slot = *v as f32;
    }
    values[6] = speed as f32;
    values[7] = accel.unwrap_or(0.0) as f32;
    values[8] = 0.0; // mvtime
    f32s_to_bytes_le(&values)
}

/// `SetTcpJerk`（mm/s³）
pub fn encode_tcp_jerk(jerk: f64) -> Vec<u8> {
    f32s_to_bytes_le(&[jerk as f32])
}

/// `SetCollisionSensitivity` / `SetTeachSensitivity`，超出范围的值被截断到 0..=5
pub fn encode_sensitivity(level: u8) -> Vec<u8> {
    vec![level.min(MAX_SENSITIVITY)]
}

/// `SetTrajectoryRecord`
pub fn encode_trajectory_record(on: bool) -> Vec<u8> {
    vec![on as u8]
}

/// `SaveTrajectory` / `LoadTrajectory`：81 字节、0 填充的文件名
///
/// # 错误
///
/// 文件名为空、包含 NUL 或超过 80 字节时返回 `InvalidName`。
pub fn encode_trajectory_name(name: &str) -> Result<Vec<u8>, ProtocolError> {
    let raw = name.as_bytes();
    if raw.is_empty() || raw.len() >= TRAJECTORY_NAME_LEN || raw.contains(&0) {
        return Err(ProtocolError::InvalidName(name.to_string()));
    }

    let mut buf = vec![0u8; TRAJECTORY_NAME_LEN];
    buf[..raw.len()].copy_from_slice(raw);
    Ok(buf)
}

/// `PlayTrajectory`：回放次数 + 倍速，两个大端 i32
pub fn encode_play_trajectory(times: i32, speed: SpeedMultiplier) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    buf.extend_from_slice(&i32_to_bytes_be(times));
    buf.extend_from_slice(&i32_to_bytes_be(speed.factor() as i32));
    buf
}

// ==================== 载荷解码 ====================

/// `GetTcpPose`：返回实际解析到的分量（最多 6 个）
///
/// 载荷不足 24 字节时只返回完整的 f32 分量，由上层判断位姿是否可用。
pub fn decode_tcp_pose(payload: &[u8]) -> Vec<f64> {
    payload
        .chunks_exact(4)
        .take(6)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
        .collect()
}

/// `GetJointPosition`：7 个关节角（rad）
pub fn decode_joint_position(payload: &[u8]) -> Result<Vec<f64>, ProtocolError> {
    Ok(bytes_to_f32s_le(payload, 7)?
        .into_iter()
        .map(f64::from)
        .collect())
}

/// `GetErrorWarn`：(错误码, 警告码)
pub fn decode_error_warn(payload: &[u8]) -> Result<(u8, u8), ProtocolError> {
    match payload {
        [err, warn, ..] => Ok((*err, *warn)),
        _ => Err(ProtocolError::InvalidLength {
            expected: 2,
            actual: payload.len(),
        }),
    }
}

/// `GetState`
pub fn decode_state(payload: &[u8]) -> Result<ControllerState, ProtocolError> {
    payload
        .first()
        .map(|b| ControllerState::from(*b))
        .ok_or(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        })
}

/// `GetCommandCount`：大端 u16
pub fn decode_command_count(payload: &[u8]) -> Result<u16, ProtocolError> {
    match payload {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(ProtocolError::InvalidLength {
            expected: 2,
            actual: payload.len(),
        }),
    }
}

/// `GetTrajectoryStatus`
pub fn decode_trajectory_status(payload: &[u8]) -> Result<TrajectoryStatus, ProtocolError> {
    payload
        .first()
        .map(|b| TrajectoryStatus::from(*b))
        .ok_or(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        })
}

/// `GetVersion`：以 NUL 结尾的 ASCII 字符串
pub fn decode_version(payload: &[u8]) -> Result<String, ProtocolError> {
    let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
    let text = std::str::from_utf8(&payload[..end])
        .map_err(|e| ProtocolError::ParseError(format!("firmware version: {}", e)))?;
    Ok(text.trim().to_string())
}
