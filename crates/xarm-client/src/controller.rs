//! 控制器上下文
//!
//! [`ArmController`] 是界面命令的唯一入口，内部持有：
//!
//! - 命令锁：串行化所有界面命令
//! - 状态锁：保护会话、模式、录制状态、任务槽与检测线程句柄，只用于纯读写
//! - 快照板：每次状态变更后发布 [`ControllerSnapshot`]，轮询无需加锁
//!
//! 任何硬件调用都在状态锁之外进行。后台线程只持有 `Weak<Shared>`，只获取状态锁。
//!
//! 所有命令返回状态文本，不会 panic。

use crate::cancel::CancellationToken;
use crate::config::{ControllerOptions, DetectConfig, clamp_sensitivity};
use crate::detector::{self, DetectorAction, RecordingState};
use crate::error::{ControlError, HardwareFault};
use crate::geometry::Axis;
use crate::mode::{self, Mode};
use crate::motion;
use crate::planner::{self, MotionConfig};
use crate::playback::{self, PlaybackParams, clamp_selector, snap_speed_multiplier};
use crate::session::{self, Session};
use crate::snapshot::ControllerSnapshot;
use crate::task::{BackgroundTask, TaskKind, TaskSlot};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};
use xarm_link::{LinkConnector, Pose, RobotLink, TcpConnector};

// ==================== 共享状态 ====================

struct SharedState {
    session: Session,
    mode: Mode,
    recording: RecordingState,
    slot: TaskSlot,
    detector: Option<BackgroundTask>,
    playing: bool,
    /// 最近一次往复运动的中心位姿
    center_pose: Option<Pose>,
    last_play_speed_fraction: f64,
    playback_speed: f64,
}

impl SharedState {
    fn new(trajectory_name: &str) -> Self {
        Self {
            session: Session::default(),
            mode: Mode::Disconnected,
            recording: RecordingState::new(trajectory_name),
            slot: TaskSlot::new(),
            detector: None,
            playing: false,
            center_pose: None,
            last_play_speed_fraction: 0.0,
            playback_speed: 1.0,
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            status: self.session.last_status.clone(),
            mode: self.mode,
            connected: self.session.connected,
            ip: self.session.ip.clone(),
            firmware_version: self.session.firmware_version.clone(),
            recording: self.recording.active,
            playing: self.playing,
            activity: if self.playing {
                self.slot.active_kind()
            } else {
                None
            },
            playback_speed: self.playback_speed,
        }
    }
}

struct Shared {
    connector: Arc<dyn LinkConnector>,
    detect: DetectConfig,
    options: ControllerOptions,
    command_lock: Mutex<()>,
    state: Mutex<SharedState>,
    board: ArcSwap<ControllerSnapshot>,
}

impl Shared {
    fn publish(&self, st: &SharedState) {
        self.board.store(Arc::new(st.snapshot()));
    }

    /// 写入状态文本并发布快照
    fn finish(&self, st: &mut SharedState, status: impl Into<String>) -> String {
        let status = status.into();
        st.session.last_status = status.clone();
        self.publish(st);
        status
    }

    fn set_status(&self, status: impl Into<String>) -> String {
        let mut st = self.state.lock();
        self.finish(&mut st, status)
    }

    fn join_timeout(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::Oscillation => self.options.motion_join_timeout(),
            TaskKind::Playback => self.options.playback_join_timeout(),
            TaskKind::Detector => self.options.detector_join_timeout(),
        }
    }

    // ==================== 停止协调 ====================

    /// 停止协议的第 1、2 步，返回被停止的任务类型
    fn stop_task(&self, filter: Option<TaskKind>) -> Option<TaskKind> {
        let ticket = {
            let mut st = self.state.lock();
            let ticket = st.slot.begin_stop(filter)?;
            st.playing = false;
            self.publish(&st);
            ticket
        };

        let kind = ticket.kind();
        if !ticket.wait(self.join_timeout(kind)) {
            warn!(%kind, "task still running after stop timeout, continuing");
        }
        info!(%kind, "task stopped");
        Some(kind)
    }

    /// 停止后回到最近一次往复运动的中心位姿，并停在 PositionReady
    ///
    /// 示教模式下、回放被停止或尚无中心位姿时不移动，返回 `None`。
    fn return_to_center(
        &self,
        link: &dyn RobotLink,
        stopped: Option<TaskKind>,
    ) -> Option<Result<(), ControlError>> {
        let (center, speed) = {
            let st = self.state.lock();
            if st.mode == Mode::Teach || stopped == Some(TaskKind::Playback) {
                return None;
            }
            let center = st.center_pose?;
            let speed = planner::return_speed(
                st.session.max_linear_velocity_mmps,
                st.last_play_speed_fraction,
            );
            (center, speed)
        };

        let result = motion::return_to_center(link, &center, speed);
        if let Err(e) = &result {
            warn!(error = %e, "return to center failed");
        }

        let mut st = self.state.lock();
        st.playing = false;
        st.mode = Mode::PositionReady;
        self.publish(&st);
        Some(result)
    }

    /// 后台任务自行结束
    fn task_exited(&self, token: &CancellationToken, status: Option<String>) {
        let mut st = self.state.lock();
        if st.slot.is_current(token) {
            st.playing = false;
            if let Some(status) = status {
                st.session.last_status = status;
            }
        }
        self.publish(&st);
    }

    /// 后台任务报告状态（任务已被替换时忽略）
    fn task_status(&self, token: &CancellationToken, status: String) {
        let mut st = self.state.lock();
        if st.slot.is_current(token) {
            self.finish(&mut st, status);
        }
    }

    // ==================== 示教 ====================

    /// 退出示教并停在 PositionReady
    ///
    /// 进行中的录制被丢弃而不保存。调用方持有命令锁。
    fn leave_teach(&self, link: &dyn RobotLink) -> String {
        let (discard, detector) = {
            let mut st = self.state.lock();
            let discard = st.recording.finish(Instant::now()).is_some();
            let detector = st.detector.take().map(BackgroundTask::stop);
            self.publish(&st);
            (discard, detector)
        };

        let mut discard_error = None;
        if discard {
            warn!("teach exit requested while recording, discarding trajectory");
            if let Err(e) = link.stop_recording(None) {
                let err = ControlError::Recording(HardwareFault::capture(link, e));
                warn!(error = %err, "failed to discard recording");
                discard_error = Some(err);
            }
        }
        if let Err(e) = link.unsubscribe_joint_reports() {
            warn!(error = %e, "failed to unsubscribe joint reports");
        }
        if let Some(ticket) = detector {
            ticket.wait(self.options.detector_join_timeout());
        }

        let from = self.state.lock().mode;
        let transition = mode::transition(link, from, Mode::PositionReady);

        let mut st = self.state.lock();
        st.mode = transition.mode;
        self.publish(&st);
        match (transition.result, discard_error) {
            (Err(e), _) => format!("Teach disable failed: {}", e),
            (Ok(()), Some(e)) => format!("idle ({})", e),
            (Ok(()), None) => "idle".to_string(),
        }
    }

    /// 检测线程的一次 tick
    fn detector_tick(&self, token: &CancellationToken, moved: bool, now: Instant) -> ControlFlow<()> {
        let (action, link, name) = {
            let mut st = self.state.lock();
            if token.is_cancelled() {
                return ControlFlow::Break(());
            }
            if st.mode != Mode::Teach {
                return ControlFlow::Continue(());
            }
            let action = st
                .recording
                .on_tick(moved, now, self.detect.idle_timeout());
            if action == DetectorAction::None {
                return ControlFlow::Continue(());
            }
            let Some(link) = st.session.link() else {
                return ControlFlow::Break(());
            };
            let name = st.recording.trajectory_name.clone();
            if action == DetectorAction::StopAndSave {
                // 锁内清除，保证每段录制只保存一次
                if let Some(elapsed) = st.recording.finish(now) {
                    debug!(?elapsed, "recording finished");
                }
                self.publish(&st);
            }
            (action, link, name)
        };

        match action {
            DetectorAction::StartRecording => {
                self.begin_recording(token, link.as_ref(), now);
                ControlFlow::Continue(())
            },
            DetectorAction::StopAndSave => {
                self.save_recording(link.as_ref(), &name);
                self.auto_exit_teach(token, link.as_ref());
                ControlFlow::Break(())
            },
            DetectorAction::None => ControlFlow::Continue(()),
        }
    }

    fn begin_recording(&self, token: &CancellationToken, link: &dyn RobotLink, now: Instant) {
        let result = link
            .start_recording()
            .map_err(|e| ControlError::Recording(HardwareFault::capture(link, e)));

        let mut st = self.state.lock();
        match result {
            Ok(()) if token.is_cancelled() || st.mode != Mode::Teach => {
                drop(st);
                warn!("teach mode left while recording started, discarding");
                if let Err(e) = link.stop_recording(None) {
                    warn!(error = %e, "failed to discard late recording");
                }
            },
            Ok(()) => {
                st.recording.mark_started(now);
                info!(trajectory = %st.recording.trajectory_name, "recording started");
                self.finish(&mut st, "recording");
            },
            Err(e) => {
                warn!(error = %e, "failed to start recording");
                self.finish(&mut st, "record:start failed");
            },
        }
    }

    fn save_recording(&self, link: &dyn RobotLink, name: &str) {
        let status = match link.stop_recording(Some(name)) {
            Ok(()) => {
                info!(trajectory = name, "trajectory saved");
                "idle".to_string()
            },
            Err(e) => {
                let err = ControlError::Recording(HardwareFault::capture(link, e));
                warn!(trajectory = name, error = %err, "failed to save trajectory");
                format!("record:save failed: {}", err)
            },
        };
        self.set_status(status);
    }

    /// 保存后自动退出示教（检测线程发起，不等待自身）
    fn auto_exit_teach(&self, token: &CancellationToken, link: &dyn RobotLink) {
        {
            let mut st = self.state.lock();
            if token.is_cancelled() || st.mode != Mode::Teach {
                return;
            }
            if let Some(own) = st.detector.take() {
                // 不 join 自身线程，句柄直接分离
                drop(own.stop());
            }
        }

        if let Err(e) = link.unsubscribe_joint_reports() {
            warn!(error = %e, "failed to unsubscribe joint reports");
        }
        let transition = mode::transition(link, Mode::Teach, Mode::PositionReady);

        let mut st = self.state.lock();
        st.mode = transition.mode;
        match transition.result {
            Ok(()) => {
                info!("teach mode exited after save");
                self.publish(&st);
            },
            Err(e) => {
                warn!(error = %e, "automatic teach exit failed");
                self.finish(&mut st, format!("Teach disable failed: {}", e));
            },
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        if let Some(ticket) = st.slot.begin_stop(None) {
            debug!(kind = %ticket.kind(), "controller dropped, cancelling task");
        }
        if let Some(detector) = st.detector.take() {
            drop(detector.stop());
        }
    }
}

// ==================== 对外接口 ====================

/// 机械臂控制器
///
/// 克隆开销很小（内部为 `Arc`），可分发给多个命令处理方。
///
/// # 示例
///
/// ```rust,no_run
/// use xarm_client::{ArmController, Axis, ControllerOptions, DetectConfig};
///
/// let controller = ArmController::tcp(DetectConfig::default(), ControllerOptions::default());
/// println!("{}", controller.connect("192.168.1.221"));
/// println!("{}", controller.play(2.0, 50.0, 50.0, Axis::Z));
/// println!("{}", controller.stop());
/// println!("{}", controller.disconnect());
/// ```
#[derive(Clone)]
pub struct ArmController {
    shared: Arc<Shared>,
}

impl ArmController {
    pub fn new(
        connector: Arc<dyn LinkConnector>,
        detect: DetectConfig,
        options: ControllerOptions,
    ) -> Self {
        let state = SharedState::new(&options.trajectory_name);
        let board = ArcSwap::from_pointee(state.snapshot());
        Self {
            shared: Arc::new(Shared {
                connector,
                detect,
                options,
                command_lock: Mutex::new(()),
                state: Mutex::new(state),
                board,
            }),
        }
    }

    /// 使用真实控制器链路
    pub fn tcp(detect: DetectConfig, options: ControllerOptions) -> Self {
        Self::new(Arc::new(TcpConnector::default()), detect, options)
    }

    pub fn detect_config(&self) -> &DetectConfig {
        &self.shared.detect
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.shared.options
    }

    /// 最新快照（无锁）
    pub fn snapshot(&self) -> Arc<ControllerSnapshot> {
        self.shared.board.load_full()
    }

    /// 最近一次状态文本
    pub fn status(&self) -> String {
        self.snapshot().status.clone()
    }

    // ==================== 连接 ====================

    /// 连接控制器
    pub fn connect(&self, ip: &str) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();
        let ip = ip.trim();

        {
            let mut st = shared.state.lock();
            if st.session.connected {
                let status = format!("Already connected to {}", st.session.ip);
                return shared.finish(&mut st, status);
            }
        }

        let span = info_span!("connect", %ip);
        let _enter = span.enter();
        match session::open(shared.connector.as_ref(), ip, &shared.options) {
            Ok(opened) => {
                let mut st = shared.state.lock();
                st.session.install(opened);
                st.mode = Mode::PositionReady;
                st.recording = RecordingState::new(shared.options.trajectory_name.as_str());
                info!("connected");
                shared.finish(&mut st, format!("Connected to {}", ip))
            },
            Err(e) => {
                warn!(error = %e, "connect failed");
                let status = match e {
                    ControlError::Connection(_) => e.to_string(),
                    other => format!("Connect failed: {}", other),
                };
                shared.set_status(status)
            },
        }
    }

    /// 断开连接
    ///
    /// 先停止后台任务、丢弃进行中的录制并停在 PositionReady，再释放链路。
    /// 无论释放是否成功，结束时均为未连接状态。
    pub fn disconnect(&self) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let Some(link) = shared.state.lock().session.link() else {
            return shared.set_status("Disconnected");
        };

        let stopped = shared.stop_task(None);
        shared.return_to_center(link.as_ref(), stopped);
        let parked = shared.leave_teach(link.as_ref());
        debug!(status = %parked, "parked before disconnect");

        let link = {
            let mut st = shared.state.lock();
            let link = st.session.release();
            st.mode = Mode::Disconnected;
            st.recording = RecordingState::new(shared.options.trajectory_name.as_str());
            st.playing = false;
            st.center_pose = None;
            shared.publish(&st);
            link
        };
        if let Some(link) = link
            && let Err(e) = link.disconnect()
        {
            warn!(error = %e, "link release failed");
        }

        info!("disconnected");
        shared.set_status("Disconnected")
    }

    // ==================== 示教模式 ====================

    /// 进入或退出示教模式
    pub fn set_teach_mode(&self, enable: bool) -> String {
        if enable {
            self.enter_teach()
        } else {
            self.exit_teach()
        }
    }

    fn enter_teach(&self) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let (link, current) = {
            let st = shared.state.lock();
            (st.session.link(), st.mode)
        };
        let Some(link) = link else {
            return shared.set_status("Not connected");
        };
        if current == Mode::Teach {
            return shared.set_status("Teach already enabled");
        }

        // 进入示教前先停止任何运动任务并回到中心位姿
        let stopped = shared.stop_task(None);
        shared.return_to_center(link.as_ref(), stopped);

        let transition = mode::transition(link.as_ref(), current, Mode::Teach);
        if let Err(e) = transition.result {
            let mut st = shared.state.lock();
            st.mode = transition.mode;
            warn!(error = %e, "failed to enter teach mode");
            return shared.finish(&mut st, e.to_string());
        }

        let reports = link.subscribe_joint_reports();

        let mut st = shared.state.lock();
        st.mode = Mode::Teach;
        st.recording = RecordingState::new(shared.options.trajectory_name.as_str());
        st.center_pose = None;

        let status = match reports {
            Ok(rx) => {
                let weak = Arc::downgrade(&self.shared);
                let detect = shared.detect.clone();
                let ip = st.session.ip.clone();
                let spawned = BackgroundTask::spawn(TaskKind::Detector, move |token| {
                    let _span = info_span!("task", kind = %TaskKind::Detector, %ip).entered();
                    detector::run_loop(&rx, &token, &detect, |moved, now| match weak.upgrade() {
                        Some(shared) => shared.detector_tick(&token, moved, now),
                        None => ControlFlow::Break(()),
                    });
                });
                match spawned {
                    Ok(task) => {
                        st.detector = Some(task);
                        "waiting".to_string()
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to spawn motion detector");
                        format!("waiting (motion detection unavailable: {})", e)
                    },
                }
            },
            Err(e) => {
                warn!(error = %e, "joint report subscription failed");
                format!("waiting (motion detection unavailable: {})", e)
            },
        };
        info!("teach mode enabled");
        shared.finish(&mut st, status)
    }

    fn exit_teach(&self) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let (link, current) = {
            let st = shared.state.lock();
            (st.session.link(), st.mode)
        };
        let Some(link) = link else {
            return shared.set_status("Not connected");
        };
        if current != Mode::Teach {
            return shared.set_status("Teach already disabled");
        }

        let status = shared.leave_teach(link.as_ref());
        info!(%status, "teach mode exit");
        shared.set_status(status)
    }

    // ==================== 往复运动 ====================

    /// 开始沿工具轴往复运动
    ///
    /// `amplitude_cm` 为峰峰值（cm），`speed_pct`/`accel_pct` 为上限的百分比。
    pub fn play(&self, amplitude_cm: f64, speed_pct: f64, accel_pct: f64, axis: Axis) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let (link, limits, unit, ip) = {
            let mut st = shared.state.lock();
            let Some(link) = st.session.link() else {
                return shared.finish(&mut st, "Not connected");
            };
            if st.slot.is_busy() {
                return shared.finish(&mut st, "Already playing");
            }
            if st.mode == Mode::Teach {
                return shared.finish(&mut st, "Disable teach mode before playing");
            }
            (
                link,
                st.session.limits(),
                st.session.angle_unit,
                st.session.ip.clone(),
            )
        };

        let config = MotionConfig::from_ui(amplitude_cm, speed_pct, accel_pct, axis);
        let raw = match link.read_pose() {
            Ok(raw) => raw,
            Err(e) => {
                let err = ControlError::PoseRead(HardwareFault::capture(link.as_ref(), e));
                return shared.set_status(err.to_string());
            },
        };
        let plan = match planner::plan(&raw, &config, &limits, unit) {
            Ok(plan) => plan,
            Err(e) => return shared.set_status(e.to_string()),
        };
        if let Err(e) = mode::force_position_ready(link.as_ref()) {
            return shared.set_status(e.to_string());
        }

        let mut st = shared.state.lock();
        st.mode = Mode::PositionReady;
        st.center_pose = Some(plan.center);
        st.last_play_speed_fraction = config.speed_fraction;

        let weak = Arc::downgrade(&self.shared);
        let spawned = BackgroundTask::spawn(TaskKind::Oscillation, move |token| {
            let _span = info_span!("task", kind = %TaskKind::Oscillation, %ip).entered();
            let status = match motion::run(link.as_ref(), &plan, &token) {
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "oscillation aborted");
                    if let Err(mode_err) = mode::force_position_ready(link.as_ref()) {
                        warn!(error = %mode_err, "position mode after motion error failed");
                    }
                    Some(e.to_string())
                },
            };
            if let Some(shared) = weak.upgrade() {
                shared.task_exited(&token, status);
            }
        });

        match spawned {
            Ok(task) => {
                if let Err(task) = st.slot.install(task) {
                    drop(task.stop());
                    return shared.finish(&mut st, "Already playing");
                }
                st.playing = true;
                info!(axis = %axis, amplitude_mm = config.amplitude_mm, "oscillation task started");
                shared.finish(&mut st, "Point-to-point motion started")
            },
            Err(e) => shared.finish(&mut st, format!("Play error: {}", e)),
        }
    }

    /// 停止当前任务
    ///
    /// 往复运动停止后以 `max(20, min(vmax, vmax·speed))` 回到中心位姿。
    /// 不会退出示教模式。
    pub fn stop(&self) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let Some(link) = shared.state.lock().session.link() else {
            return shared.set_status("Not connected");
        };

        let stopped = shared.stop_task(None);

        let status = match shared.return_to_center(link.as_ref(), stopped) {
            None | Some(Ok(())) => "Stopped".to_string(),
            Some(Err(ControlError::Motion(fault))) => {
                format!("Stopped, return pose error: {}", fault)
            },
            Some(Err(e)) => format!("Stopped, return pose error: {}", e),
        };

        let mut st = shared.state.lock();
        st.playing = false;
        shared.finish(&mut st, status)
    }

    // ==================== 回放 ====================

    /// 开始循环回放已录制的轨迹
    pub fn start_playback(&self, speed_selector: f64) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let mut st = shared.state.lock();
        let Some(link) = st.session.link() else {
            return shared.finish(&mut st, "Not connected");
        };
        if st.slot.is_busy() {
            let status = match st.slot.active_kind() {
                Some(TaskKind::Playback) => "playback already running",
                _ => "Already playing",
            };
            return shared.finish(&mut st, status);
        }
        if st.mode == Mode::Teach {
            return shared.finish(&mut st, "Disable teach mode before playback");
        }

        st.playback_speed = clamp_selector(speed_selector);
        let params = PlaybackParams {
            trajectory_name: shared.options.trajectory_name.clone(),
            speed: snap_speed_multiplier(st.playback_speed),
            backoff: shared.options.playback_backoff(),
            poll: shared.options.playback_poll(),
        };
        let ip = st.session.ip.clone();

        // 轨迹回放为阻塞调用，线程创建本身不涉及硬件
        let weak = Arc::downgrade(&self.shared);
        let spawned = BackgroundTask::spawn(TaskKind::Playback, move |token| {
            let _span = info_span!("task", kind = %TaskKind::Playback, %ip).entered();
            let report = weak.clone();
            playback::run(link.as_ref(), &params, &token, |err| {
                if let Some(shared) = report.upgrade() {
                    shared.task_status(&token, err.to_string());
                }
            });
            if let Some(shared) = weak.upgrade() {
                shared.task_exited(&token, None);
            }
        });

        match spawned {
            Ok(task) => {
                if let Err(task) = st.slot.install(task) {
                    drop(task.stop());
                    return shared.finish(&mut st, "Already playing");
                }
                st.playing = true;
                st.center_pose = None;
                st.mode = Mode::PositionReady;
                info!(speed = st.playback_speed, "playback task started");
                shared.finish(&mut st, "play:start")
            },
            Err(e) => shared.finish(&mut st, format!("Playback error: {}", e)),
        }
    }

    /// 停止回放
    pub fn stop_playback(&self) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        if !shared.state.lock().session.connected {
            return shared.set_status("Not connected");
        }
        shared.stop_task(Some(TaskKind::Playback));
        shared.set_status("play:stop")
    }

    /// 设置回放速度选择器（下次开始回放时生效）
    pub fn set_playback_speed(&self, speed_selector: f64) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let mut st = shared.state.lock();
        st.playback_speed = clamp_selector(speed_selector);
        let status = format!(
            "speed:{:.2} (double_speed={})",
            st.playback_speed,
            snap_speed_multiplier(st.playback_speed)
        );
        shared.finish(&mut st, status)
    }

    // ==================== 灵敏度 ====================

    /// 碰撞检测灵敏度（0..=5），成功后尽力保存到控制器配置
    pub fn set_collision_sensitivity(&self, level: i64) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let Some(link) = shared.state.lock().session.link() else {
            return shared.set_status("Not connected");
        };
        let level = clamp_sensitivity(level);

        let status = match link.set_collision_sensitivity(level) {
            Ok(()) => {
                match link.save_config() {
                    Ok(()) => {},
                    Err(e) if e.is_unsupported() => debug!("save config unsupported"),
                    Err(e) => warn!(error = %e, "failed to persist collision sensitivity"),
                }
                format!("collision:{}", level)
            },
            Err(e) => format!(
                "collision set failed: {}",
                HardwareFault::capture(link.as_ref(), e)
            ),
        };
        shared.set_status(status)
    }

    /// 示教灵敏度（0..=5），部分固件不支持
    pub fn set_teach_sensitivity(&self, level: i64) -> String {
        let shared = &self.shared;
        let _cmd = shared.command_lock.lock();

        let Some(link) = shared.state.lock().session.link() else {
            return shared.set_status("Not connected");
        };
        let level = clamp_sensitivity(level);

        let status = match link.set_teach_sensitivity(level) {
            Ok(()) => format!("teach_sens:{}", level),
            Err(e) if e.is_unsupported() => "teach sensitivity unsupported".to_string(),
            Err(e) => format!(
                "teach sensitivity set failed: {}",
                HardwareFault::capture(link.as_ref(), e)
            ),
        };
        shared.set_status(status)
    }
}

impl std::fmt::Debug for ArmController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmController")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use xarm_link::{MockCall, MockConnector, MockLink, MockOp};
    use xarm_protocol::{ControllerMode, SpeedMultiplier};

    fn mock_controller() -> (ArmController, Arc<MockLink>) {
        let link = Arc::new(MockLink::new());
        let connector = Arc::new(MockConnector::new(link.clone()));
        let detect = DetectConfig {
            idle_timeout_seconds: 0.1,
            ..Default::default()
        };
        let options = ControllerOptions {
            playback_backoff_ms: 10,
            playback_poll_ms: 5,
            ..Default::default()
        };
        (ArmController::new(connector, detect, options), link)
    }

    fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        pred()
    }

    #[test]
    fn test_commands_require_connection() {
        let (ctrl, _) = mock_controller();
        assert_eq!(ctrl.play(1.0, 50.0, 50.0, Axis::Z), "Not connected");
        assert_eq!(ctrl.stop(), "Not connected");
        assert_eq!(ctrl.set_teach_mode(true), "Not connected");
        assert_eq!(ctrl.start_playback(1.0), "Not connected");
        assert_eq!(ctrl.set_collision_sensitivity(3), "Not connected");
        assert_eq!(ctrl.disconnect(), "Disconnected");
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (ctrl, _) = mock_controller();
        assert_eq!(ctrl.connect("10.0.0.5"), "Connected to 10.0.0.5");
        assert_eq!(ctrl.connect("10.0.0.6"), "Already connected to 10.0.0.5");

        let snap = ctrl.snapshot();
        assert!(snap.connected);
        assert_eq!(snap.mode, Mode::PositionReady);
        assert_eq!(snap.firmware_version.as_deref(), Some("mock-1.0.0"));
    }

    #[test]
    fn test_play_and_stop_returns_to_center() {
        let (ctrl, link) = mock_controller();
        link.set_move_duration(Duration::from_millis(5));
        ctrl.connect("10.0.0.5");

        assert_eq!(
            ctrl.play(2.0, 50.0, 50.0, Axis::Z),
            "Point-to-point motion started"
        );
        assert!(ctrl.snapshot().playing);
        assert_eq!(ctrl.snapshot().activity, Some(TaskKind::Oscillation));
        thread::sleep(Duration::from_millis(30));

        assert_eq!(ctrl.stop(), "Stopped");
        assert!(!ctrl.snapshot().playing);

        // 最后一次运动回到中心，速度 = 1000·0.5
        match link.calls().last() {
            Some(MockCall::MovePose { pose, speed, .. }) => {
                assert_eq!(pose.to_array(), [300.0, 0.0, 200.0, std::f64::consts::PI, 0.0, 0.0]);
                assert_eq!(*speed, 500.0);
            },
            other => panic!("unexpected last call: {:?}", other),
        }
    }

    #[test]
    fn test_play_rejected_in_teach() {
        let (ctrl, _) = mock_controller();
        ctrl.connect("10.0.0.5");
        assert_eq!(ctrl.set_teach_mode(true), "waiting");
        assert_eq!(
            ctrl.play(1.0, 50.0, 50.0, Axis::X),
            "Disable teach mode before playing"
        );
        assert_eq!(ctrl.set_teach_mode(false), "idle");
    }

    #[test]
    fn test_malformed_pose_aborts_play() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");
        link.set_pose(vec![1.0, 2.0]);
        assert_eq!(
            ctrl.play(1.0, 50.0, 50.0, Axis::Z),
            "Malformed TCP pose: expected 6 components, got 2"
        );
        assert!(!ctrl.snapshot().playing);
    }

    #[test]
    fn test_teach_enable_failure_keeps_position_mode() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");
        link.fail_times(MockOp::SetMode, 1, 1);

        let status = ctrl.set_teach_mode(true);
        assert!(status.starts_with("Failed to enter teach mode"), "{}", status);
        assert_eq!(ctrl.snapshot().mode, Mode::PositionReady);
        assert!(!link.has_report_subscriber());
    }

    #[test]
    fn test_teach_toggle_hardware_sequence() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");
        link.clear_calls();

        ctrl.set_teach_mode(true);
        assert!(link.has_report_subscriber());
        ctrl.set_teach_mode(false);
        assert!(!link.has_report_subscriber());

        let modes: Vec<_> = link
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::SetMode(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(modes, vec![ControllerMode::Teach, ControllerMode::Position]);
    }

    #[test]
    fn test_detector_records_and_auto_exits() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");
        ctrl.set_teach_mode(true);

        link.push_joint_report(vec![0.0; 6]);
        link.push_joint_report(vec![0.1; 6]);
        assert!(wait_until(Duration::from_secs(1), || ctrl.snapshot().recording));
        assert_eq!(ctrl.snapshot().display_label(), "recording");

        assert!(wait_until(Duration::from_secs(2), || {
            ctrl.snapshot().mode == Mode::PositionReady
        }));
        let saves = link.count_calls(|c| {
            matches!(c, MockCall::StopRecording(Some(name)) if name == "memory_loop")
        });
        assert_eq!(saves, 1);
        assert!(!ctrl.snapshot().recording);
        assert_eq!(ctrl.status(), "idle");
    }

    #[test]
    fn test_record_start_failure_rolls_back() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");
        link.fail(MockOp::StartRecording, 1);
        ctrl.set_teach_mode(true);

        link.push_joint_report(vec![0.0; 6]);
        link.push_joint_report(vec![0.1; 6]);
        assert!(wait_until(Duration::from_secs(1), || {
            ctrl.status() == "record:start failed"
        }));
        assert!(!ctrl.snapshot().recording);
        assert_eq!(ctrl.snapshot().mode, Mode::Teach);
    }

    #[test]
    fn test_playback_exclusivity_and_stop() {
        let (ctrl, link) = mock_controller();
        link.set_play_duration(Duration::from_millis(5));
        ctrl.connect("10.0.0.5");

        assert_eq!(ctrl.start_playback(2.0), "play:start");
        assert_eq!(ctrl.start_playback(2.0), "playback already running");
        assert_eq!(ctrl.play(1.0, 50.0, 50.0, Axis::Z), "Already playing");

        assert!(wait_until(Duration::from_secs(1), || {
            link.count_calls(|c| matches!(c, MockCall::PlayTrajectory { .. })) > 0
        }));
        assert_eq!(ctrl.stop_playback(), "play:stop");
        assert!(!ctrl.snapshot().playing);

        assert!(link.calls().iter().any(|c| matches!(
            c,
            MockCall::PlayTrajectory {
                speed: SpeedMultiplier::X2,
                ..
            }
        )));
    }

    #[test]
    fn test_sensitivity_commands() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");

        assert_eq!(ctrl.set_collision_sensitivity(9), "collision:5");
        assert_eq!(link.calls().last(), Some(&MockCall::SaveConfig));

        assert_eq!(ctrl.set_teach_sensitivity(2), "teach_sens:2");
        link.set_teach_sensitivity_supported(false);
        assert_eq!(ctrl.set_teach_sensitivity(2), "teach sensitivity unsupported");
    }

    #[test]
    fn test_playback_speed_status() {
        let (ctrl, _) = mock_controller();
        assert_eq!(ctrl.set_playback_speed(2.0), "speed:2.00 (double_speed=2)");
        assert_eq!(ctrl.set_playback_speed(9.0), "speed:5.00 (double_speed=4)");
        assert_eq!(ctrl.snapshot().playback_speed, 5.0);
    }

    #[test]
    fn test_disconnect_always_resets() {
        let (ctrl, link) = mock_controller();
        ctrl.connect("10.0.0.5");
        ctrl.set_teach_mode(true);
        link.fail(MockOp::Disconnect, 1);

        assert_eq!(ctrl.disconnect(), "Disconnected");
        let snap = ctrl.snapshot();
        assert!(!snap.connected);
        assert_eq!(snap.mode, Mode::Disconnected);
        assert!(!link.has_report_subscriber());
    }
}
