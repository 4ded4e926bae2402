//! 连接会话
//!
//! 持有硬件链路句柄，缓存能力查询结果（线速度/线加速度上限、固件版本、角度单位）。

use crate::config::ControllerOptions;
use crate::error::{ControlError, HardwareFault, Result};
use crate::mode;
use crate::planner::MotionLimits;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use xarm_link::{AngleUnit, LinkConnector, LinkError, RobotLink};

/// 最大线速度缓存默认值（mm/s）
pub const DEFAULT_MAX_LINEAR_VELOCITY: f64 = 200.0;
/// 最大线加速度缓存默认值（mm/s²）
pub const DEFAULT_MAX_LINEAR_ACCEL: f64 = 1000.0;

/// 会话状态
pub struct Session {
    pub ip: String,
    pub connected: bool,
    pub angle_unit: AngleUnit,
    pub firmware_version: Option<String>,
    pub max_linear_velocity_mmps: f64,
    pub max_linear_accel_mmps2: f64,
    pub last_status: String,
    link: Option<Arc<dyn RobotLink>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            ip: String::new(),
            connected: false,
            angle_unit: AngleUnit::Radian,
            firmware_version: None,
            max_linear_velocity_mmps: DEFAULT_MAX_LINEAR_VELOCITY,
            max_linear_accel_mmps2: DEFAULT_MAX_LINEAR_ACCEL,
            last_status: "idle".to_string(),
            link: None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ip", &self.ip)
            .field("connected", &self.connected)
            .field("angle_unit", &self.angle_unit)
            .field("firmware_version", &self.firmware_version)
            .field("max_linear_velocity_mmps", &self.max_linear_velocity_mmps)
            .field("max_linear_accel_mmps2", &self.max_linear_accel_mmps2)
            .field("last_status", &self.last_status)
            .finish()
    }
}

impl Session {
    /// 当前链路（未连接时为 `None`）
    pub fn link(&self) -> Option<Arc<dyn RobotLink>> {
        self.link.clone()
    }

    /// 当前链路，未连接时返回 [`ControlError::NotConnected`]
    pub fn require_link(&self) -> Result<Arc<dyn RobotLink>> {
        self.link.clone().ok_or(ControlError::NotConnected)
    }

    pub fn limits(&self) -> MotionLimits {
        MotionLimits {
            max_linear_velocity_mmps: self.max_linear_velocity_mmps,
            max_linear_accel_mmps2: self.max_linear_accel_mmps2,
        }
    }

    /// 接管新打开的链路
    pub fn install(&mut self, opened: OpenedLink) {
        self.ip = opened.ip;
        self.connected = true;
        self.angle_unit = opened.angle_unit;
        self.firmware_version = opened.firmware_version;
        self.max_linear_velocity_mmps = opened.max_linear_velocity_mmps;
        self.max_linear_accel_mmps2 = opened.max_linear_accel_mmps2;
        self.link = Some(opened.link);
    }

    /// 交出链路并复位会话（保留 `last_status`）
    pub fn release(&mut self) -> Option<Arc<dyn RobotLink>> {
        let link = self.link.take();
        let last_status = std::mem::take(&mut self.last_status);
        *self = Self {
            last_status,
            ..Self::default()
        };
        link
    }
}

/// 已完成初始化的链路
pub struct OpenedLink {
    pub link: Arc<dyn RobotLink>,
    pub ip: String,
    pub angle_unit: AngleUnit,
    pub firmware_version: Option<String>,
    pub max_linear_velocity_mmps: f64,
    pub max_linear_accel_mmps2: f64,
}

impl fmt::Debug for OpenedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedLink")
            .field("ip", &self.ip)
            .field("firmware_version", &self.firmware_version)
            .finish_non_exhaustive()
    }
}

/// 打开并初始化链路
///
/// 使能电机、进入 PositionReady、下发默认灵敏度并查询能力。
/// 任一必需步骤失败都会释放链路，不留下半初始化的句柄。
pub fn open(connector: &dyn LinkConnector, ip: &str, options: &ControllerOptions) -> Result<OpenedLink> {
    let link = connector
        .connect(ip)
        .map_err(|e| ControlError::Connection(HardwareFault::bare(e)))?;

    if let Err(e) = initialize(link.as_ref(), options) {
        if let Err(release) = link.disconnect() {
            debug!(error = %release, "release after failed connect");
        }
        return Err(e);
    }

    let (max_linear_velocity_mmps, max_linear_accel_mmps2, firmware_version) =
        query_capabilities(link.as_ref());
    info!(
        %ip,
        firmware = firmware_version.as_deref().unwrap_or("unknown"),
        max_linear_velocity_mmps,
        max_linear_accel_mmps2,
        "link opened"
    );

    Ok(OpenedLink {
        angle_unit: link.angle_unit(),
        link,
        ip: ip.to_string(),
        firmware_version,
        max_linear_velocity_mmps,
        max_linear_accel_mmps2,
    })
}

fn initialize(link: &dyn RobotLink, options: &ControllerOptions) -> Result<()> {
    link.enable_motion(true)
        .map_err(|e| ControlError::Connection(HardwareFault::capture(link, e)))?;
    mode::force_position_ready(link)?;

    if let Err(e) = link.set_collision_sensitivity(options.collision_sensitivity) {
        warn!(error = %e, "failed to apply default collision sensitivity");
    }
    match link.set_teach_sensitivity(options.teach_sensitivity) {
        Ok(()) => {},
        Err(e) if e.is_unsupported() => debug!("teach sensitivity not supported by link"),
        Err(e) => warn!(error = %e, "failed to apply default teach sensitivity"),
    }
    Ok(())
}

/// 能力查询失败或不支持时保留默认值
fn query_capabilities(link: &dyn RobotLink) -> (f64, f64, Option<String>) {
    let velocity = positive_or(
        link.query_max_linear_velocity(),
        DEFAULT_MAX_LINEAR_VELOCITY,
        "max linear velocity",
    );
    let accel = positive_or(
        link.query_max_linear_acceleration(),
        DEFAULT_MAX_LINEAR_ACCEL,
        "max linear acceleration",
    );
    let firmware = match link.query_firmware_version() {
        Ok(version) if !version.is_empty() => Some(version),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "firmware version query failed");
            None
        },
    };
    (velocity, accel, firmware)
}

fn positive_or(result: std::result::Result<f64, LinkError>, default: f64, what: &str) -> f64 {
    match result {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        Ok(value) => {
            warn!(what, value, "ignoring invalid capability value");
            default
        },
        Err(e) if e.is_unsupported() => {
            debug!(what, "capability query unsupported");
            default
        },
        Err(e) => {
            warn!(what, error = %e, "capability query failed");
            default
        },
    }
}
