//! 模拟链路（用于测试和无硬件演示）
//!
//! 记录每次调用，支持按操作注入失败、模拟阻塞运动耗时以及手动推送关节上报。
//!
//! # 示例
//!
//! ```rust
//! use xarm_link::mock::{MockLink, MockOp};
//! use xarm_link::RobotLink;
//!
//! let link = MockLink::new();
//! link.fail(MockOp::SetMode, 1);
//! assert!(link.set_mode(xarm_protocol::ControllerMode::Teach).is_err());
//! ```

use crate::{
    AngleUnit, ErrorWarnCodes, JointReport, LinkConnector, LinkError, LinkResult, Pose, RobotLink,
};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use xarm_protocol::{ControllerMode, ControllerState, SpeedMultiplier};

/// 上报通道容量
const MOCK_REPORT_CAPACITY: usize = 64;

/// 记录下来的调用
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    EnableMotion(bool),
    SetMode(ControllerMode),
    SetState(ControllerState),
    ReadPose,
    MovePose {
        pose: Pose,
        speed: f64,
        accel: Option<f64>,
        wait: bool,
    },
    SetTcpJerk(f64),
    SetCollisionSensitivity(u8),
    SetTeachSensitivity(u8),
    SaveConfig,
    SubscribeJointReports,
    UnsubscribeJointReports,
    StartRecording,
    StopRecording(Option<String>),
    LoadTrajectory(String),
    PlayTrajectory {
        name: String,
        repeat: i32,
        wait: bool,
        speed: SpeedMultiplier,
    },
    QueryMaxLinearVelocity,
    QueryMaxLinearAcceleration,
    QueryFirmwareVersion,
    QueryErrorWarn,
    ClearError,
    ClearWarn,
    Disconnect,
}

/// 可注入失败的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    EnableMotion,
    SetMode,
    SetState,
    ReadPose,
    MovePose,
    SetTcpJerk,
    SetCollisionSensitivity,
    SetTeachSensitivity,
    SaveConfig,
    SubscribeJointReports,
    StartRecording,
    StopRecording,
    LoadTrajectory,
    PlayTrajectory,
    QueryFirmwareVersion,
    Disconnect,
}

/// 失败计划
#[derive(Debug, Clone, Copy)]
enum FailurePlan {
    /// 始终失败
    Always(i32),
    /// 接下来 n 次失败
    Times(u32, i32),
}

struct MockState {
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, FailurePlan>,
    pose: Vec<f64>,
    error_warn: ErrorWarnCodes,
    max_linear_velocity: Option<f64>,
    max_linear_acceleration: Option<f64>,
    firmware_version: String,
    teach_sensitivity_supported: bool,
    save_config_supported: bool,
    move_duration: Duration,
    play_duration: Duration,
    connected: bool,
}

/// 模拟链路
pub struct MockLink {
    state: Mutex<MockState>,
    reports: Mutex<Option<Sender<JointReport>>>,
    angle_unit: AngleUnit,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// 默认模拟：弧度制位姿 (300, 0, 200, π, 0, 0)，所有可选能力可用
    pub fn new() -> Self {
        Self::with_angle_unit(AngleUnit::Radian)
    }

    /// 指定姿态角单位
    pub fn with_angle_unit(angle_unit: AngleUnit) -> Self {
        let roll = angle_unit.from_radians(std::f64::consts::PI);
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                failures: HashMap::new(),
                pose: vec![300.0, 0.0, 200.0, roll, 0.0, 0.0],
                error_warn: ErrorWarnCodes::default(),
                max_linear_velocity: Some(1000.0),
                max_linear_acceleration: Some(50000.0),
                firmware_version: "mock-1.0.0".to_string(),
                teach_sensitivity_supported: true,
                save_config_supported: true,
                move_duration: Duration::ZERO,
                play_duration: Duration::ZERO,
                connected: true,
            }),
            reports: Mutex::new(None),
            angle_unit,
        }
    }

    // ==================== 场景配置 ====================

    /// 设置 `read_pose` 返回的原始读数
    pub fn set_pose(&self, pose: Vec<f64>) {
        self.state.lock().pose = pose;
    }

    /// 设置能力查询结果（`None` 表示不支持）
    pub fn set_capabilities(&self, max_velocity: Option<f64>, max_acceleration: Option<f64>) {
        let mut state = self.state.lock();
        state.max_linear_velocity = max_velocity;
        state.max_linear_acceleration = max_acceleration;
    }

    /// 设置示教灵敏度是否支持
    pub fn set_teach_sensitivity_supported(&self, supported: bool) {
        self.state.lock().teach_sensitivity_supported = supported;
    }

    /// 设置 `query_error_warn` 返回值
    pub fn set_error_warn(&self, codes: ErrorWarnCodes) {
        self.state.lock().error_warn = codes;
    }

    /// 阻塞运动（`wait = true`）耗时
    pub fn set_move_duration(&self, duration: Duration) {
        self.state.lock().move_duration = duration;
    }

    /// 阻塞回放（`wait = true`）耗时
    pub fn set_play_duration(&self, duration: Duration) {
        self.state.lock().play_duration = duration;
    }

    /// 指定操作始终以 `code` 失败
    pub fn fail(&self, op: MockOp, code: i32) {
        self.state.lock().failures.insert(op, FailurePlan::Always(code));
    }

    /// 指定操作接下来 `times` 次以 `code` 失败
    pub fn fail_times(&self, op: MockOp, times: u32, code: i32) {
        self.state
            .lock()
            .failures
            .insert(op, FailurePlan::Times(times, code));
    }

    /// 取消失败注入
    pub fn clear_failure(&self, op: MockOp) {
        self.state.lock().failures.remove(&op);
    }

    // ==================== 观察 ====================

    /// 全部调用记录
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// 满足条件的调用次数
    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// 清空调用记录
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// 是否存在上报订阅者
    pub fn has_report_subscriber(&self) -> bool {
        self.reports.lock().is_some()
    }

    /// 是否仍处于连接状态
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// 推送一条关节上报，返回是否送达
    pub fn push_joint_report(&self, angles: Vec<f64>) -> bool {
        let guard = self.reports.lock();
        match guard.as_ref() {
            Some(tx) => match tx.try_send(JointReport::new(angles)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            },
            None => false,
        }
    }

    // ==================== 内部 ====================

    /// 记录调用并检查失败注入
    fn record(&self, call: MockCall, op: Option<MockOp>, name: &'static str) -> LinkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);

        if !state.connected {
            return Err(LinkError::NotConnected);
        }

        let Some(op) = op else {
            return Ok(());
        };
        match state.failures.get(&op).copied() {
            Some(FailurePlan::Always(code)) => Err(LinkError::Controller { op: name, code }),
            Some(FailurePlan::Times(remaining, code)) => {
                if remaining <= 1 {
                    state.failures.remove(&op);
                } else {
                    state
                        .failures
                        .insert(op, FailurePlan::Times(remaining - 1, code));
                }
                Err(LinkError::Controller { op: name, code })
            },
            None => Ok(()),
        }
    }
}

impl RobotLink for MockLink {
    fn enable_motion(&self, enable: bool) -> LinkResult<()> {
        self.record(
            MockCall::EnableMotion(enable),
            Some(MockOp::EnableMotion),
            "motion_enable",
        )
    }

    fn set_mode(&self, mode: ControllerMode) -> LinkResult<()> {
        self.record(MockCall::SetMode(mode), Some(MockOp::SetMode), "set_mode")
    }

    fn set_state(&self, state: ControllerState) -> LinkResult<()> {
        self.record(MockCall::SetState(state), Some(MockOp::SetState), "set_state")
    }

    fn read_pose(&self) -> LinkResult<Vec<f64>> {
        self.record(MockCall::ReadPose, Some(MockOp::ReadPose), "get_position")?;
        Ok(self.state.lock().pose.clone())
    }

    fn move_pose(
        &self,
        pose: &Pose,
        speed: f64,
        accel: Option<f64>,
        wait: bool,
    ) -> LinkResult<()> {
        self.record(
            MockCall::MovePose {
                pose: *pose,
                speed,
                accel,
                wait,
            },
            Some(MockOp::MovePose),
            "set_position",
        )?;

        let duration = self.state.lock().move_duration;
        if wait && !duration.is_zero() {
            thread::sleep(duration);
        }
        self.state.lock().pose = pose.to_array().to_vec();
        Ok(())
    }

    fn set_tcp_jerk(&self, jerk: f64) -> LinkResult<()> {
        self.record(
            MockCall::SetTcpJerk(jerk),
            Some(MockOp::SetTcpJerk),
            "set_tcp_jerk",
        )
    }

    fn set_collision_sensitivity(&self, level: u8) -> LinkResult<()> {
        self.record(
            MockCall::SetCollisionSensitivity(level),
            Some(MockOp::SetCollisionSensitivity),
            "set_collision_sensitivity",
        )
    }

    fn set_teach_sensitivity(&self, level: u8) -> LinkResult<()> {
        if !self.state.lock().teach_sensitivity_supported {
            return Err(LinkError::Unsupported("teach sensitivity"));
        }
        self.record(
            MockCall::SetTeachSensitivity(level),
            Some(MockOp::SetTeachSensitivity),
            "set_teach_sensitivity",
        )
    }

    fn save_config(&self) -> LinkResult<()> {
        if !self.state.lock().save_config_supported {
            return Err(LinkError::Unsupported("save config"));
        }
        self.record(MockCall::SaveConfig, Some(MockOp::SaveConfig), "save_conf")
    }

    fn subscribe_joint_reports(&self) -> LinkResult<Receiver<JointReport>> {
        self.record(
            MockCall::SubscribeJointReports,
            Some(MockOp::SubscribeJointReports),
            "register_report_callback",
        )?;
        let (tx, rx) = bounded(MOCK_REPORT_CAPACITY);
        *self.reports.lock() = Some(tx);
        Ok(rx)
    }

    fn unsubscribe_joint_reports(&self) -> LinkResult<()> {
        self.reports.lock().take();
        self.record(MockCall::UnsubscribeJointReports, None, "release_report_callback")
    }

    fn start_recording(&self) -> LinkResult<()> {
        self.record(
            MockCall::StartRecording,
            Some(MockOp::StartRecording),
            "start_record_trajectory",
        )
    }

    fn stop_recording(&self, name: Option<&str>) -> LinkResult<()> {
        self.record(
            MockCall::StopRecording(name.map(str::to_string)),
            Some(MockOp::StopRecording),
            "stop_record_trajectory",
        )
    }

    fn load_trajectory(&self, name: &str) -> LinkResult<()> {
        self.record(
            MockCall::LoadTrajectory(name.to_string()),
            Some(MockOp::LoadTrajectory),
            "load_trajectory",
        )
    }

    fn play_trajectory(
        &self,
        name: &str,
        repeat: i32,
        wait: bool,
        speed: SpeedMultiplier,
    ) -> LinkResult<()> {
        self.record(
            MockCall::PlayTrajectory {
                name: name.to_string(),
                repeat,
                wait,
                speed,
            },
            Some(MockOp::PlayTrajectory),
            "playback_trajectory",
        )?;

        let duration = self.state.lock().play_duration;
        if wait && !duration.is_zero() {
            thread::sleep(duration);
        }
        Ok(())
    }

    fn query_max_linear_velocity(&self) -> LinkResult<f64> {
        self.record(MockCall::QueryMaxLinearVelocity, None, "max_linear_velocity")?;
        self.state
            .lock()
            .max_linear_velocity
            .ok_or(LinkError::Unsupported("max linear velocity query"))
    }

    fn query_max_linear_acceleration(&self) -> LinkResult<f64> {
        self.record(
            MockCall::QueryMaxLinearAcceleration,
            None,
            "max_linear_acceleration",
        )?;
        self.state
            .lock()
            .max_linear_acceleration
            .ok_or(LinkError::Unsupported("max linear acceleration query"))
    }

    fn query_firmware_version(&self) -> LinkResult<String> {
        self.record(
            MockCall::QueryFirmwareVersion,
            Some(MockOp::QueryFirmwareVersion),
            "get_version",
        )?;
        Ok(self.state.lock().firmware_version.clone())
    }

    fn query_error_warn(&self) -> LinkResult<ErrorWarnCodes> {
        self.record(MockCall::QueryErrorWarn, None, "get_err_warn_code")?;
        Ok(self.state.lock().error_warn)
    }

    fn clear_error(&self) -> LinkResult<()> {
        self.record(MockCall::ClearError, None, "clean_error")?;
        self.state.lock().error_warn.error = 0;
        Ok(())
    }

    fn clear_warn(&self) -> LinkResult<()> {
        self.record(MockCall::ClearWarn, None, "clean_warn")?;
        self.state.lock().error_warn.warn = 0;
        Ok(())
    }

    fn angle_unit(&self) -> AngleUnit {
        self.angle_unit
    }

    fn disconnect(&self) -> LinkResult<()> {
        self.reports.lock().take();
        let result = self.record(MockCall::Disconnect, Some(MockOp::Disconnect), "disconnect");
        // 即使释放调用失败，链路也视为已断开
        self.state.lock().connected = false;
        result
    }
}

/// 模拟链路工厂
///
/// 每次 `connect` 返回同一个 [`MockLink`]（重新标记为已连接），
/// 测试可以在控制器外部观察同一实例。
pub struct MockConnector {
    link: Arc<MockLink>,
    refuse: AtomicBool,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(link: Arc<MockLink>) -> Self {
        Self {
            link,
            refuse: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    /// 被共享的模拟链路
    pub fn link(&self) -> Arc<MockLink> {
        self.link.clone()
    }

    /// 令后续连接失败
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// 成功连接次数
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl LinkConnector for MockConnector {
    fn connect(&self, address: &str) -> LinkResult<Arc<dyn RobotLink>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(LinkError::Connect {
                address: address.to_string(),
                reason: "connection refused (mock)".to_string(),
            });
        }
        self.link.state.lock().connected = true;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.link.clone())
    }
}
