//! replay 命令
//!
//! 循环回放已保存的轨迹，直到 Ctrl-C。

use super::{Runtime, seconds, stop_signal, wait_for_stop};
use anyhow::Result;
use clap::Args;

/// 最大速度选择器
const MAX_SPEED_SELECTOR: f64 = 5.0;

/// 回放命令参数
#[derive(Args, Debug)]
pub struct ReplayCommand {
    /// 速度选择器（0-5），吸附到 1/2/4 倍速
    ///
    /// - < 1.5: 1x
    /// - 1.5 ~ 3: 2x
    /// - ≥ 3: 4x
    #[arg(short, long, default_value_t = 1.0)]
    pub speed: f64,

    /// 运行时长（秒），缺省运行到 Ctrl-C
    #[arg(short, long)]
    pub duration: Option<f64>,
}

impl ReplayCommand {
    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        if !(0.0..=MAX_SPEED_SELECTOR).contains(&self.speed) {
            anyhow::bail!(
                "❌ 速度选择器超出范围: {:.2}（0 - {}）",
                self.speed,
                MAX_SPEED_SELECTOR
            );
        }

        runtime.connect()?;
        let signal = stop_signal()?;
        let ctrl = &runtime.controller;

        println!("📟 {}", ctrl.set_playback_speed(self.speed));
        let status = ctrl.start_playback(self.speed);
        if !ctrl.snapshot().playing {
            runtime.disconnect();
            anyhow::bail!("❌ {}", status);
        }
        println!("📟 {}", status);
        println!("📁 轨迹: {}", ctrl.options().trajectory_name);
        println!("💡 提示: 按 Ctrl-C 停止回放");

        wait_for_stop(&signal, seconds(self.duration));

        let last = ctrl.status();
        if last.starts_with("Playback error") {
            println!("⚠️  {}", last);
        }
        println!("🛑 {}", ctrl.stop_playback());
        runtime.disconnect();
        Ok(())
    }
}
