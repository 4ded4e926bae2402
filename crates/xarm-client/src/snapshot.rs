//! 控制器状态快照（供界面轮询）

use crate::mode::Mode;
use crate::task::TaskKind;

/// 某一时刻的控制器状态
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    /// 最近一次状态文本
    pub status: String,
    pub mode: Mode,
    pub connected: bool,
    pub ip: String,
    pub firmware_version: Option<String>,
    /// 是否正在录制轨迹
    pub recording: bool,
    /// 是否有往复运动或回放任务
    pub playing: bool,
    /// 正在运行的任务类型
    pub activity: Option<TaskKind>,
    /// 回放速度选择器（0..=5）
    pub playback_speed: f64,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            status: "idle".to_string(),
            mode: Mode::Disconnected,
            connected: false,
            ip: String::new(),
            firmware_version: None,
            recording: false,
            playing: false,
            activity: None,
            playback_speed: 1.0,
        }
    }
}

impl ControllerSnapshot {
    /// 界面显示标签：`recording` / `waiting` / `idle`
    pub fn display_label(&self) -> &'static str {
        if self.recording {
            "recording"
        } else if self.mode.is_teach() {
            "waiting"
        } else {
            "idle"
        }
    }
}
