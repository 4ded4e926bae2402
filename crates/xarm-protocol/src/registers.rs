//! 寄存器（功能码）定义
//!
//! 每条请求帧在帧头之后携带 1 字节寄存器号，响应帧回显同一寄存器号。

use crate::ProtocolError;

/// 控制器寄存器
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum Register {
    /// 读取固件版本
    GetVersion = 1,
    /// 使能/失能关节
    MotionEnable = 11,
    /// 设置控制器状态（0=就绪, 3=暂停, 4=停止）
    SetState = 12,
    /// 读取控制器状态
    GetState = 13,
    /// 读取指令缓存数量
    GetCommandCount = 14,
    /// 读取错误码/警告码
    GetErrorWarn = 15,
    /// 清除错误
    CleanError = 16,
    /// 清除警告
    CleanWarn = 17,
    /// 设置控制模式（0=位置, 1=伺服, 2=示教）
    SetMode = 19,
    /// 笛卡尔直线运动
    MoveLine = 21,
    /// TCP 加加速度
    SetTcpJerk = 31,
    /// 碰撞检测灵敏度
    SetCollisionSensitivity = 37,
    /// 示教灵敏度
    SetTeachSensitivity = 38,
    /// 保存当前配置
    SaveConfig = 40,
    /// 读取 TCP 位姿
    GetTcpPose = 41,
    /// 读取关节角度
    GetJointPosition = 42,
    /// 轨迹录制开关
    SetTrajectoryRecord = 50,
    /// 保存录制轨迹
    SaveTrajectory = 51,
    /// 加载轨迹
    LoadTrajectory = 52,
    /// 回放已加载轨迹
    PlayTrajectory = 53,
    /// 读取轨迹读写状态
    GetTrajectoryStatus = 54,
}

impl Register {
    /// 是否为运动类指令
    ///
    /// 运动类指令在控制器报告错误位或未就绪位时视为失败；
    /// 其他指令的错误/警告位只反映控制器既有状态。
    pub fn is_motion(self) -> bool {
        matches!(self, Register::MoveLine | Register::PlayTrajectory)
    }

    /// 响应载荷的最小长度（字节）
    pub fn response_len(self) -> usize {
        match self {
            Register::GetVersion => crate::FIRMWARE_VERSION_LEN,
            Register::GetState | Register::GetTrajectoryStatus => 1,
            Register::GetCommandCount | Register::GetErrorWarn => 2,
            Register::GetTcpPose => 6 * 4,
            Register::GetJointPosition => 7 * 4,
            _ => 0,
        }
    }

    /// 从原始字节解析寄存器号
    pub fn from_byte(value: u8) -> Result<Self, ProtocolError> {
        Register::try_from(value).map_err(|_| ProtocolError::UnknownRegister(value))
    }
}
