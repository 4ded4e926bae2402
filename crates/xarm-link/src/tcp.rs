//! TCP 链路实现
//!
//! 指令走 502 端口的请求/响应通道（串行，一次一个事务），
//! 关节角上报由后台线程从 30003 端口读取并转发到订阅通道。
//!
//! # 阻塞运动
//!
//! 控制器对运动指令只回复"已接收"。`wait = true` 时本链路在发送后
//! 轮询控制器状态与指令缓存，连续若干次空闲才视为到位。

use crate::{
    AngleUnit, ErrorWarnCodes, JointReport, LinkConnector, LinkError, LinkResult, Pose, RobotLink,
};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use xarm_protocol::{
    CODE_NOT_READY, CODE_OK, CONTROL_PORT, ControllerMode, ControllerState, FRAME_HEADER_LEN,
    REPORT_LEN_PREFIX, REPORT_MIN_LEN, REPORT_REALTIME_PORT, RealtimeReport, Register,
    RequestFrame, ResponseFrame, SpeedMultiplier, TrajectoryStatus, body_len,
    decode_command_count, decode_error_warn, decode_state, decode_tcp_pose,
    decode_trajectory_status, decode_version, encode_motion_enable, encode_move_line,
    encode_play_trajectory, encode_sensitivity, encode_set_mode, encode_set_state,
    encode_tcp_jerk, encode_trajectory_name, encode_trajectory_record,
};

/// 上报帧长度上限，超过即视为失步
const REPORT_MAX_LEN: usize = 4096;

/// 上报 socket 读超时（决定后台线程响应停止信号的延迟）
const REPORT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// TCP 链路配置
#[derive(Debug, Clone)]
pub struct TcpLinkConfig {
    /// 指令端口
    pub control_port: u16,
    /// 实时上报端口
    pub report_port: u16,
    /// 建立连接超时
    pub connect_timeout: Duration,
    /// 单次请求的读写超时
    pub request_timeout: Duration,
    /// 阻塞运动的总超时
    pub motion_timeout: Duration,
    /// 发送运动指令后开始轮询前的等待
    pub motion_settle: Duration,
    /// 状态轮询间隔
    pub poll_interval: Duration,
    /// 连续空闲次数阈值（防抖）
    pub idle_debounce: u32,
    /// 轨迹保存/加载超时
    pub trajectory_io_timeout: Duration,
    /// 上报通道容量
    pub report_channel_capacity: usize,
}

impl Default for TcpLinkConfig {
    fn default() -> Self {
        Self {
            control_port: CONTROL_PORT,
            report_port: REPORT_REALTIME_PORT,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(2),
            motion_timeout: Duration::from_secs(60),
            motion_settle: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            idle_debounce: 2,
            trajectory_io_timeout: Duration::from_secs(10),
            report_channel_capacity: 256,
        }
    }
}

/// TCP 链路工厂
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TcpLinkConfig,
}

impl TcpConnector {
    pub fn new(config: TcpLinkConfig) -> Self {
        Self { config }
    }
}

impl LinkConnector for TcpConnector {
    fn connect(&self, address: &str) -> LinkResult<Arc<dyn RobotLink>> {
        let link = TcpLink::connect(address, self.config.clone())?;
        Ok(Arc::new(link))
    }
}

/// 上报线程与链路共享的状态
struct ReportShared {
    subscriber: Mutex<Option<Sender<JointReport>>>,
    is_running: AtomicBool,
    dropped_reports: AtomicU64,
}

/// 真实控制器链路
pub struct TcpLink {
    address: String,
    config: TcpLinkConfig,
    control: Mutex<Option<TcpStream>>,
    transaction_id: AtomicU16,
    reports: Arc<ReportShared>,
    report_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TcpLink {
    /// 连接控制器指令端口
    ///
    /// 上报端口在首次订阅时才连接。
    pub fn connect(address: &str, config: TcpLinkConfig) -> LinkResult<Self> {
        let stream = open_stream(address, config.control_port, config.connect_timeout)?;
        stream.set_read_timeout(Some(config.request_timeout))?;
        stream.set_write_timeout(Some(config.request_timeout))?;
        stream.set_nodelay(true)?;

        info!(address, port = config.control_port, "control socket connected");

        Ok(Self {
            address: address.to_string(),
            config,
            control: Mutex::new(Some(stream)),
            transaction_id: AtomicU16::new(1),
            reports: Arc::new(ReportShared {
                subscriber: Mutex::new(None),
                is_running: AtomicBool::new(false),
                dropped_reports: AtomicU64::new(0),
            }),
            report_thread: Mutex::new(None),
        })
    }

    /// 因订阅者过慢而丢弃的上报数
    pub fn dropped_reports(&self) -> u64 {
        self.reports.dropped_reports.load(Ordering::Relaxed)
    }

    fn next_transaction_id(&self) -> u16 {
        self.transaction_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 发送请求并等待响应
    ///
    /// `min_len` 为响应载荷的最小长度，不足时返回协议错误。
    fn request(
        &self,
        op: &'static str,
        register: Register,
        params: Vec<u8>,
        min_len: usize,
    ) -> LinkResult<ResponseFrame> {
        let request = RequestFrame::new(self.next_transaction_id(), register, params);
        let buf = {
            let mut guard = self.control.lock();
            let stream = guard.as_mut().ok_or(LinkError::NotConnected)?;

            trace!(op, ?register, tid = request.transaction_id, "request");
            stream.write_all(&request.encode()).map_err(|e| map_io(e, op))?;

            let mut header = [0u8; FRAME_HEADER_LEN];
            stream.read_exact(&mut header).map_err(|e| map_io(e, op))?;
            let body = body_len(&header)?;

            let mut buf = vec![0u8; FRAME_HEADER_LEN + body];
            buf[..FRAME_HEADER_LEN].copy_from_slice(&header);
            stream.read_exact(&mut buf[FRAME_HEADER_LEN..]).map_err(|e| map_io(e, op))?;
            buf
        };

        let response = ResponseFrame::decode(&buf)?;
        response.check_matches(&request)?;

        let code = response.result_code();
        if code != CODE_OK {
            return Err(LinkError::Controller { op, code });
        }
        if response.payload.len() < min_len {
            return Err(xarm_protocol::ProtocolError::InvalidLength {
                expected: min_len,
                actual: response.payload.len(),
            }
            .into());
        }
        Ok(response)
    }

    /// 无载荷的设置类指令
    fn command(&self, op: &'static str, register: Register, params: Vec<u8>) -> LinkResult<()> {
        self.request(op, register, params, 0).map(|_| ())
    }

    fn query_state(&self) -> LinkResult<ControllerState> {
        let response = self.request(
            "get_state",
            Register::GetState,
            Vec::new(),
            Register::GetState.response_len(),
        )?;
        Ok(decode_state(&response.payload)?)
    }

    fn query_command_count(&self) -> LinkResult<u16> {
        let response = self.request(
            "get_cmdnum",
            Register::GetCommandCount,
            Vec::new(),
            Register::GetCommandCount.response_len(),
        )?;
        Ok(decode_command_count(&response.payload)?)
    }

    /// 等待运动结束
    ///
    /// 状态非 `Moving` 且指令缓存为空，连续 `idle_debounce` 次即视为到位。
    /// 控制器进入 `Stopped` 表示运动被中止。
    fn wait_motion_done(&self, op: &'static str) -> LinkResult<()> {
        let deadline = Instant::now() + self.config.motion_timeout;
        thread::sleep(self.config.motion_settle);

        let mut idle_polls = 0u32;
        loop {
            match self.query_state()? {
                ControllerState::Stopped => {
                    return Err(LinkError::Controller {
                        op,
                        code: CODE_NOT_READY,
                    });
                },
                ControllerState::Moving => idle_polls = 0,
                _ => {
                    if self.query_command_count()? == 0 {
                        idle_polls += 1;
                    } else {
                        idle_polls = 0;
                    }
                },
            }

            if idle_polls >= self.config.idle_debounce {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout(op));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// 等待轨迹保存/加载完成
    fn wait_trajectory_io(&self, op: &'static str, success: TrajectoryStatus) -> LinkResult<()> {
        let deadline = Instant::now() + self.config.trajectory_io_timeout;
        loop {
            let response = self.request(
                "get_traj_status",
                Register::GetTrajectoryStatus,
                Vec::new(),
                Register::GetTrajectoryStatus.response_len(),
            )?;
            let status = decode_trajectory_status(&response.payload)?;

            if status == success {
                return Ok(());
            }
            // Idle 表示控制器尚未开始处理
            if status.is_settled() && status != TrajectoryStatus::Idle {
                return Err(LinkError::Controller {
                    op,
                    code: trajectory_status_code(status),
                });
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout(op));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// 确保上报线程在运行
    fn ensure_report_thread(&self) -> LinkResult<()> {
        let mut slot = self.report_thread.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let stream = open_stream(
            &self.address,
            self.config.report_port,
            self.config.connect_timeout,
        )?;
        stream.set_read_timeout(Some(REPORT_READ_TIMEOUT))?;

        self.reports.is_running.store(true, Ordering::Release);
        let shared = self.reports.clone();
        let handle = thread::Builder::new()
            .name("xarm-report".into())
            .spawn(move || report_loop(stream, shared))?;

        info!(address = %self.address, port = self.config.report_port, "report stream started");
        *slot = Some(handle);
        Ok(())
    }

    fn stop_report_thread(&self) {
        self.reports.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.report_thread.lock().take()
            && handle.join().is_err()
        {
            warn!("report thread panicked");
        }
    }
}

impl RobotLink for TcpLink {
    fn enable_motion(&self, enable: bool) -> LinkResult<()> {
        self.command(
            "motion_enable",
            Register::MotionEnable,
            encode_motion_enable(enable),
        )
    }

    fn set_mode(&self, mode: ControllerMode) -> LinkResult<()> {
        self.command("set_mode", Register::SetMode, encode_set_mode(mode))
    }

    fn set_state(&self, state: ControllerState) -> LinkResult<()> {
        self.command("set_state", Register::SetState, encode_set_state(state))
    }

    fn read_pose(&self) -> LinkResult<Vec<f64>> {
        let response = self.request("get_position", Register::GetTcpPose, Vec::new(), 0)?;
        Ok(decode_tcp_pose(&response.payload))
    }

    fn move_pose(
        &self,
        pose: &Pose,
        speed: f64,
        accel: Option<f64>,
        wait: bool,
    ) -> LinkResult<()> {
        self.command(
            "set_position",
            Register::MoveLine,
            encode_move_line(pose.to_array(), speed, accel),
        )?;
        if wait {
            self.wait_motion_done("set_position")?;
        }
        Ok(())
    }

    fn set_tcp_jerk(&self, jerk: f64) -> LinkResult<()> {
        self.command("set_tcp_jerk", Register::SetTcpJerk, encode_tcp_jerk(jerk))
    }

    fn set_collision_sensitivity(&self, level: u8) -> LinkResult<()> {
        self.command(
            "set_collision_sensitivity",
            Register::SetCollisionSensitivity,
            encode_sensitivity(level),
        )
    }

    fn set_teach_sensitivity(&self, level: u8) -> LinkResult<()> {
        self.command(
            "set_teach_sensitivity",
            Register::SetTeachSensitivity,
            encode_sensitivity(level),
        )
    }

    fn save_config(&self) -> LinkResult<()> {
        self.command("save_conf", Register::SaveConfig, Vec::new())
    }

    fn subscribe_joint_reports(&self) -> LinkResult<Receiver<JointReport>> {
        let (tx, rx) = bounded(self.config.report_channel_capacity);
        *self.reports.subscriber.lock() = Some(tx);
        if let Err(e) = self.ensure_report_thread() {
            self.reports.subscriber.lock().take();
            return Err(e);
        }
        Ok(rx)
    }

    fn unsubscribe_joint_reports(&self) -> LinkResult<()> {
        self.reports.subscriber.lock().take();
        self.stop_report_thread();
        Ok(())
    }

    fn start_recording(&self) -> LinkResult<()> {
        self.command(
            "start_record_trajectory",
            Register::SetTrajectoryRecord,
            encode_trajectory_record(true),
        )
    }

    fn stop_recording(&self, name: Option<&str>) -> LinkResult<()> {
        self.command(
            "stop_record_trajectory",
            Register::SetTrajectoryRecord,
            encode_trajectory_record(false),
        )?;

        if let Some(name) = name {
            self.command(
                "save_record_trajectory",
                Register::SaveTrajectory,
                encode_trajectory_name(name)?,
            )?;
            self.wait_trajectory_io("save_record_trajectory", TrajectoryStatus::SaveSuccess)?;
            debug!(name, "trajectory saved");
        }
        Ok(())
    }

    fn load_trajectory(&self, name: &str) -> LinkResult<()> {
        self.command(
            "load_trajectory",
            Register::LoadTrajectory,
            encode_trajectory_name(name)?,
        )?;
        self.wait_trajectory_io("load_trajectory", TrajectoryStatus::LoadSuccess)
    }

    fn play_trajectory(
        &self,
        name: &str,
        repeat: i32,
        wait: bool,
        speed: SpeedMultiplier,
    ) -> LinkResult<()> {
        self.load_trajectory(name)?;
        self.command(
            "playback_trajectory",
            Register::PlayTrajectory,
            encode_play_trajectory(repeat, speed),
        )?;
        if wait {
            self.wait_motion_done("playback_trajectory")?;
        }
        Ok(())
    }

    fn query_firmware_version(&self) -> LinkResult<String> {
        let response = self.request(
            "get_version",
            Register::GetVersion,
            Vec::new(),
            Register::GetVersion.response_len(),
        )?;
        Ok(decode_version(&response.payload)?)
    }

    fn query_error_warn(&self) -> LinkResult<ErrorWarnCodes> {
        let response = self.request(
            "get_err_warn_code",
            Register::GetErrorWarn,
            Vec::new(),
            Register::GetErrorWarn.response_len(),
        )?;
        let (error, warn) = decode_error_warn(&response.payload)?;
        Ok(ErrorWarnCodes {
            error: error as i32,
            warn: warn as i32,
        })
    }

    fn clear_error(&self) -> LinkResult<()> {
        self.command("clean_error", Register::CleanError, Vec::new())
    }

    fn clear_warn(&self) -> LinkResult<()> {
        self.command("clean_warn", Register::CleanWarn, Vec::new())
    }

    fn angle_unit(&self) -> AngleUnit {
        // 私有协议的位姿姿态角固定为弧度
        AngleUnit::Radian
    }

    fn disconnect(&self) -> LinkResult<()> {
        self.reports.subscriber.lock().take();
        self.stop_report_thread();

        let stream = self.control.lock().take();
        match stream {
            Some(stream) => {
                info!(address = %self.address, "control socket closed");
                match stream.shutdown(Shutdown::Both) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                    Err(e) => Err(e.into()),
                }
            },
            None => Ok(()),
        }
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.stop_report_thread();
    }
}

// ==================== 辅助函数 ====================

fn open_stream(address: &str, port: u16, timeout: Duration) -> LinkResult<TcpStream> {
    let connect_error = |reason: String| LinkError::Connect {
        address: address.to_string(),
        reason,
    };

    let addrs = (address, port)
        .to_socket_addrs()
        .map_err(|e| connect_error(e.to_string()))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            },
        }
    }

    Err(connect_error(
        last_error.map_or_else(|| "address resolved to nothing".to_string(), |e| e.to_string()),
    ))
}

fn map_io(error: io::Error, op: &'static str) -> LinkError {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => LinkError::Timeout(op),
        _ => LinkError::Io(error),
    }
}

fn trajectory_status_code(status: TrajectoryStatus) -> i32 {
    match status {
        TrajectoryStatus::LoadFailed => 3,
        TrajectoryStatus::SaveFailed => 6,
        TrajectoryStatus::Other(code) => code as i32,
        _ => -1,
    }
}

/// 上报线程主循环
///
/// socket 读超时后检查运行标志；半帧数据保留在缓冲区中等待后续字节。
fn report_loop(mut stream: TcpStream, shared: Arc<ReportShared>) {
    let mut buf: Vec<u8> = Vec::with_capacity(REPORT_MAX_LEN);
    let mut chunk = [0u8; 1024];

    while shared.is_running.load(Ordering::Acquire) {
        let n = match stream.read(&mut chunk) {
            Ok(0) => {
                warn!("report stream closed by controller");
                break;
            },
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            },
            Err(e) => {
                warn!(error = %e, "report stream read failed");
                break;
            },
        };
        buf.extend_from_slice(&chunk[..n]);

        while buf.len() >= REPORT_LEN_PREFIX {
            let declared = RealtimeReport::declared_len([buf[0], buf[1], buf[2], buf[3]]);
            if !(REPORT_MIN_LEN..=REPORT_MAX_LEN).contains(&declared) {
                warn!(declared, "report framing lost, resetting buffer");
                buf.clear();
                break;
            }
            if buf.len() < declared {
                break;
            }

            match RealtimeReport::parse(&buf[..declared]) {
                Ok(report) => forward_report(&shared, &report),
                Err(e) => debug!(error = %e, "skipping malformed report"),
            }
            buf.drain(..declared);
        }
    }

    // 线程退出后订阅者收到 Disconnected
    shared.subscriber.lock().take();
    debug!("report thread exited");
}

fn forward_report(shared: &ReportShared, report: &RealtimeReport) {
    let guard = shared.subscriber.lock();
    let Some(tx) = guard.as_ref() else {
        return;
    };

    let angles = report.joint_angles.iter().map(|a| f64::from(*a)).collect();
    match tx.try_send(JointReport::new(angles)) {
        Ok(()) => {},
        Err(TrySendError::Full(_)) => {
            let dropped = shared.dropped_reports.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % 100 == 1 {
                warn!(dropped, "report subscriber lagging, dropping reports");
            }
        },
        Err(TrySendError::Disconnected(_)) => {
            trace!("report subscriber gone");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TcpLinkConfig::default();
        assert_eq!(config.control_port, 502);
        assert_eq!(config.report_port, 30003);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert!(config.idle_debounce >= 1);
    }

    #[test]
    fn test_map_io_timeout() {
        let err = map_io(io::Error::new(io::ErrorKind::WouldBlock, "again"), "get_state");
        assert!(matches!(err, LinkError::Timeout("get_state")));

        let err = map_io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"), "get_state");
        assert!(matches!(err, LinkError::Io(_)));
    }

    #[test]
    fn test_trajectory_status_code() {
        assert_eq!(trajectory_status_code(TrajectoryStatus::SaveFailed), 6);
        assert_eq!(trajectory_status_code(TrajectoryStatus::Other(9)), 9);
    }

    #[test]
    fn test_connect_refused() {
        // 端口 1 在测试环境中不会有监听者
        let config = TcpLinkConfig {
            control_port: 1,
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let result = TcpLink::connect("127.0.0.1", config);
        assert!(matches!(result, Err(LinkError::Connect { .. })));
    }
}
