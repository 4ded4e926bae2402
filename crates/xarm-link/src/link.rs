//! 硬件链路 trait 定义
//!
//! 控制核心只依赖 [`RobotLink`] 与 [`LinkConnector`]，真实控制器（[`TcpLink`](crate::TcpLink)）
//! 与测试用模拟链路（`MockLink`）都实现这两个 trait。
//!
//! # 约定
//!
//! - 所有方法取 `&self`，实现必须是 `Send + Sync`，可在多个线程间共享 `Arc<dyn RobotLink>`
//! - `wait = true` 的运动调用阻塞到到位（或失败）为止
//! - 控制器非零结果码以 [`LinkError::Controller`] 返回
//! - 可选能力默认返回 [`LinkError::Unsupported`]

use crate::{AngleUnit, ErrorWarnCodes, JointReport, LinkError, LinkResult, Pose};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use xarm_protocol::{ControllerMode, ControllerState, SpeedMultiplier};

/// 机械臂硬件链路
pub trait RobotLink: Send + Sync {
    /// 使能/失能全部关节
    fn enable_motion(&self, enable: bool) -> LinkResult<()>;

    /// 设置控制模式
    fn set_mode(&self, mode: ControllerMode) -> LinkResult<()>;

    /// 设置控制器状态
    fn set_state(&self, state: ControllerState) -> LinkResult<()>;

    /// 读取 TCP 位姿原始读数
    ///
    /// 返回值可能少于 6 个分量，由调用方判断是否可用。
    fn read_pose(&self) -> LinkResult<Vec<f64>>;

    /// 笛卡尔直线运动
    ///
    /// # 参数
    ///
    /// - `speed`: mm/s
    /// - `accel`: mm/s²，`None` 表示使用控制器默认值
    /// - `wait`: 是否阻塞到到位
    fn move_pose(&self, pose: &Pose, speed: f64, accel: Option<f64>, wait: bool)
    -> LinkResult<()>;

    /// 设置 TCP 加加速度（mm/s³）
    fn set_tcp_jerk(&self, jerk: f64) -> LinkResult<()>;

    /// 碰撞检测灵敏度（0..=5）
    fn set_collision_sensitivity(&self, level: u8) -> LinkResult<()>;

    /// 示教灵敏度（0..=5），部分固件不支持
    fn set_teach_sensitivity(&self, _level: u8) -> LinkResult<()> {
        Err(LinkError::Unsupported("teach sensitivity"))
    }

    /// 将当前参数写入控制器配置
    fn save_config(&self) -> LinkResult<()> {
        Err(LinkError::Unsupported("save config"))
    }

    /// 订阅关节角上报
    ///
    /// 返回有界通道；消费者过慢时实现丢弃新上报而不是阻塞。
    /// 重复订阅会替换之前的订阅者。
    fn subscribe_joint_reports(&self) -> LinkResult<Receiver<JointReport>>;

    /// 取消关节角上报订阅（未订阅时为空操作）
    fn unsubscribe_joint_reports(&self) -> LinkResult<()>;

    /// 开始轨迹录制
    fn start_recording(&self) -> LinkResult<()>;

    /// 停止轨迹录制；`name` 为 `Some` 时保存，`None` 时丢弃
    fn stop_recording(&self, name: Option<&str>) -> LinkResult<()>;

    /// 加载已保存的轨迹
    fn load_trajectory(&self, name: &str) -> LinkResult<()>;

    /// 回放轨迹
    fn play_trajectory(
        &self,
        name: &str,
        repeat: i32,
        wait: bool,
        speed: SpeedMultiplier,
    ) -> LinkResult<()>;

    /// 最大线速度（mm/s）
    fn query_max_linear_velocity(&self) -> LinkResult<f64> {
        Err(LinkError::Unsupported("max linear velocity query"))
    }

    /// 最大线加速度（mm/s²）
    fn query_max_linear_acceleration(&self) -> LinkResult<f64> {
        Err(LinkError::Unsupported("max linear acceleration query"))
    }

    /// 固件版本
    fn query_firmware_version(&self) -> LinkResult<String>;

    /// 当前错误码/警告码
    fn query_error_warn(&self) -> LinkResult<ErrorWarnCodes>;

    /// 清除错误
    fn clear_error(&self) -> LinkResult<()>;

    /// 清除警告
    fn clear_warn(&self) -> LinkResult<()>;

    /// 位姿中姿态角的单位
    fn angle_unit(&self) -> AngleUnit;

    /// 释放链路
    fn disconnect(&self) -> LinkResult<()>;
}

/// 链路工厂
///
/// 控制器在 `connect` 时通过它打开新链路，便于在测试中替换为模拟实现。
pub trait LinkConnector: Send + Sync {
    fn connect(&self, address: &str) -> LinkResult<Arc<dyn RobotLink>>;
}
