//! 协议常量定义
//!
//! 端口号、帧长度、控制器模式/状态码以及轨迹回放倍速。

/// 指令端口
pub const CONTROL_PORT: u16 = 502;

/// 实时上报端口
pub const REPORT_REALTIME_PORT: u16 = 30003;

/// 私有协议标识（帧头第 2-3 字节）
pub const PRIVATE_PROTOCOL_ID: u16 = 0x0002;

/// 帧头长度：事务号(2) + 协议号(2) + 长度(2)
pub const FRAME_HEADER_LEN: usize = 6;

/// 轨迹文件名字段长度（含结尾 0）
pub const TRAJECTORY_NAME_LEN: usize = 81;

/// 固件版本字符串长度
pub const FIRMWARE_VERSION_LEN: usize = 40;

/// 使能全部关节时使用的轴号
pub const MOTION_ENABLE_ALL_AXES: u8 = 8;

/// 灵敏度上限（碰撞/示教共用 0..=5）
pub const MAX_SENSITIVITY: u8 = 5;

// ==================== 控制器返回码 ====================

/// 成功
pub const CODE_OK: i32 = 0;
/// 控制器存在错误
pub const CODE_ERROR: i32 = 1;
/// 控制器存在警告
pub const CODE_WARNING: i32 = 2;
/// 控制器未就绪（运动指令被拒绝）
pub const CODE_NOT_READY: i32 = 9;

/// 控制器模式（`SetMode` 参数，实时上报高 4 位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum ControllerMode {
    /// 位置模式
    Position = 0,
    /// 伺服模式
    Servo = 1,
    /// 示教（拖动）模式
    Teach = 2,
    /// 未识别的模式码
    #[num_enum(catch_all)]
    Other(u8),
}

impl ControllerMode {
    /// 协议码
    pub fn code(self) -> u8 {
        match self {
            ControllerMode::Position => 0,
            ControllerMode::Servo => 1,
            ControllerMode::Teach => 2,
            ControllerMode::Other(code) => code,
        }
    }
}

/// 控制器状态（`SetState` 参数，`GetState` 返回值，实时上报低 4 位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum ControllerState {
    /// 就绪（运动状态），`SetState(0)`
    Ready = 0,
    /// 运动中
    Moving = 1,
    /// 空闲待机
    Sleeping = 2,
    /// 暂停
    Paused = 3,
    /// 停止
    Stopped = 4,
    /// 未识别的状态码
    #[num_enum(catch_all)]
    Other(u8),
}

impl ControllerState {
    /// 协议码
    pub fn code(self) -> u8 {
        match self {
            ControllerState::Ready => 0,
            ControllerState::Moving => 1,
            ControllerState::Sleeping => 2,
            ControllerState::Paused => 3,
            ControllerState::Stopped => 4,
            ControllerState::Other(code) => code,
        }
    }
}

/// 轨迹读写状态（`GetTrajectoryStatus`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum TrajectoryStatus {
    Idle = 0,
    Loading = 1,
    LoadSuccess = 2,
    LoadFailed = 3,
    Saving = 4,
    SaveSuccess = 5,
    SaveFailed = 6,
    #[num_enum(catch_all)]
    Other(u8),
}

impl TrajectoryStatus {
    /// 读写操作是否已结束（成功或失败）
    pub fn is_settled(self) -> bool {
        !matches!(self, TrajectoryStatus::Loading | TrajectoryStatus::Saving)
    }
}

/// 轨迹回放倍速（控制器只接受 1/2/4）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpeedMultiplier {
    #[default]
    X1,
    X2,
    X4,
}

impl SpeedMultiplier {
    /// 倍数值
    pub fn factor(self) -> u8 {
        match self {
            SpeedMultiplier::X1 => 1,
            SpeedMultiplier::X2 => 2,
            SpeedMultiplier::X4 => 4,
        }
    }
}

impl std::fmt::Display for SpeedMultiplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.factor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_mode_from_u8() {
        assert_eq!(ControllerMode::from(0), ControllerMode::Position);
        assert_eq!(ControllerMode::from(2), ControllerMode::Teach);
        assert_eq!(ControllerMode::from(7), ControllerMode::Other(7));
        assert_eq!(ControllerMode::Other(7).code(), 7);
    }

    #[test]
    fn test_controller_state_from_u8() {
        assert_eq!(ControllerState::from(1), ControllerState::Moving);
        assert_eq!(ControllerState::from(4), ControllerState::Stopped);
        assert_eq!(ControllerState::Ready.code(), 0);
    }

    #[test]
    fn test_trajectory_status_settled() {
        assert!(!TrajectoryStatus::Saving.is_settled());
        assert!(!TrajectoryStatus::Loading.is_settled());
        assert!(TrajectoryStatus::SaveSuccess.is_settled());
        assert!(TrajectoryStatus::from(3).is_settled());
    }

    #[test]
    fn test_speed_multiplier_factor() {
        assert_eq!(SpeedMultiplier::X1.factor(), 1);
        assert_eq!(SpeedMultiplier::X2.factor(), 2);
        assert_eq!(SpeedMultiplier::X4.to_string(), "4");
    }
}
