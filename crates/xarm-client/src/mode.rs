//! 控制器模式状态机
//!
//! ```text
//! Disconnected ──connect──▶ PositionReady ◀──▶ Teach
//! ```
//!
//! 任何硬件模式切换都按 `set_mode(code)` → `set_state(0)` 的顺序下发。
//! 切换失败时内存中的模式不会变为目标模式，并尝试重新进入 PositionReady。

use crate::error::{ControlError, HardwareFault, Result};
use std::fmt;
use tracing::{info, warn};
use xarm_link::{LinkError, RobotLink};
use xarm_protocol::{ControllerMode, ControllerState};

/// 会话模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// 未连接
    #[default]
    Disconnected,
    /// 位置模式且已就绪
    PositionReady,
    /// 示教（拖动）模式
    Teach,
}

impl Mode {
    pub fn is_teach(self) -> bool {
        self == Mode::Teach
    }

    pub fn is_connected(self) -> bool {
        self != Mode::Disconnected
    }

    /// 状态机允许的边
    pub fn can_transition_to(self, target: Mode) -> bool {
        matches!(
            (self, target),
            (Mode::Disconnected, Mode::PositionReady)
                | (Mode::PositionReady, Mode::PositionReady)
                | (Mode::PositionReady, Mode::Teach)
                | (Mode::Teach, Mode::PositionReady)
        )
    }

    /// 对应的控制器模式码
    fn controller_mode(self) -> Option<ControllerMode> {
        match self {
            Mode::PositionReady => Some(ControllerMode::Position),
            Mode::Teach => Some(ControllerMode::Teach),
            Mode::Disconnected => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Mode::Disconnected => "disconnected",
            Mode::PositionReady => "position mode",
            Mode::Teach => "teach mode",
        };
        f.write_str(text)
    }
}

/// 模式切换结果
///
/// `mode` 为切换后内存中应记录的模式（硬件已确认的模式），
/// `result` 描述目标模式是否达成。
#[derive(Debug)]
pub struct Transition {
    pub mode: Mode,
    pub result: Result<()>,
}

impl Transition {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// 下发硬件模式：`set_mode(code)` 后 `set_state(0)`
pub fn apply(link: &dyn RobotLink, target: Mode) -> Result<()> {
    let Some(code) = target.controller_mode() else {
        return Err(ControlError::InvalidTransition {
            from: target,
            to: target,
        });
    };

    let fault = |e: LinkError| ControlError::ModeTransition {
        target,
        fault: HardwareFault::capture(link, e),
    };
    link.set_mode(code).map_err(fault)?;
    link.set_state(ControllerState::Ready).map_err(fault)?;

    info!(mode = %target, "controller mode applied");
    Ok(())
}

/// 强制进入 PositionReady
pub fn force_position_ready(link: &dyn RobotLink) -> Result<()> {
    apply(link, Mode::PositionReady)
}

/// 执行一次状态机切换
///
/// 硬件拒绝切换时重新下发 PositionReady：成功则记录为 PositionReady，
/// 否则保持原模式。
pub fn transition(link: &dyn RobotLink, from: Mode, to: Mode) -> Transition {
    if !from.can_transition_to(to) {
        return Transition {
            mode: from,
            result: Err(ControlError::InvalidTransition { from, to }),
        };
    }

    match apply(link, to) {
        Ok(()) => Transition {
            mode: to,
            result: Ok(()),
        },
        Err(err) => {
            warn!(%from, %to, error = %err, "mode transition rejected, re-asserting position mode");
            let mode = match force_position_ready(link) {
                Ok(()) => Mode::PositionReady,
                Err(fallback) => {
                    warn!(error = %fallback, "position mode fallback failed");
                    from
                },
            };
            Transition {
                mode,
                result: Err(err),
            }
        },
    }
}
