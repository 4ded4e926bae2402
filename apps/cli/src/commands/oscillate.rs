//! oscillate 命令
//!
//! 沿工具坐标轴往复运动，Ctrl-C 或到达时长后停止并回到起始位姿。

use super::{Runtime, seconds, stop_signal, wait_for_stop};
use anyhow::Result;
use clap::Args;
use xarm_sdk::Axis;

/// 往复运动参数
#[derive(Args, Debug)]
pub struct OscillateCommand {
    /// 峰峰值振幅（cm，0-20）
    #[arg(short, long, default_value_t = 2.0)]
    pub amplitude: f64,

    /// 速度（最大线速度的百分比，1-100）
    #[arg(short, long, default_value_t = 50.0)]
    pub speed: f64,

    /// 加速度（最大线加速度的百分比，1-100）
    #[arg(long, default_value_t = 50.0)]
    pub accel: f64,

    /// 工具坐标轴（X / Y / Z）
    #[arg(long, default_value_t = Axis::Z)]
    pub axis: Axis,

    /// 运行时长（秒），缺省运行到 Ctrl-C
    #[arg(short, long)]
    pub duration: Option<f64>,
}

impl OscillateCommand {
    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        runtime.connect()?;
        let signal = stop_signal()?;

        let ctrl = &runtime.controller;
        println!(
            "🔁 振幅 {:.1} cm，速度 {:.0}%，加速度 {:.0}%，轴 {}",
            self.amplitude, self.speed, self.accel, self.axis
        );
        let status = ctrl.play(self.amplitude, self.speed, self.accel, self.axis);
        if !ctrl.snapshot().playing {
            runtime.disconnect();
            anyhow::bail!("❌ {}", status);
        }
        println!("📟 {}", status);
        println!("💡 提示: 按 Ctrl-C 停止");

        wait_for_stop(&signal, seconds(self.duration));

        // 运动线程可能已因错误退出
        let last = ctrl.status();
        println!("🛑 {}", ctrl.stop());
        if last.starts_with("Motion error") {
            println!("⚠️  {}", last);
        }
        runtime.disconnect();
        Ok(())
    }
}
