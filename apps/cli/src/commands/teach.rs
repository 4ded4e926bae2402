//! teach 命令
//!
//! 进入示教模式，拖动机械臂后静止即自动保存轨迹并退出示教。

use super::{Runtime, seconds, stop_signal};
use anyhow::Result;
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use xarm_sdk::Mode;
use xarm_sdk::link::MockLink;

/// 示教录制参数
#[derive(Args, Debug)]
pub struct TeachCommand {
    /// 等待自动保存的最长时间（秒）
    #[arg(short, long, default_value_t = 120.0)]
    pub timeout: f64,

    /// 示教灵敏度（0-5）
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..=5))]
    pub sensitivity: Option<i64>,
}

const POLL: Duration = Duration::from_millis(100);

impl TeachCommand {
    pub fn execute(&self, runtime: &Runtime) -> Result<()> {
        runtime.connect()?;
        let signal = stop_signal()?;
        let ctrl = &runtime.controller;

        if let Some(level) = self.sensitivity {
            println!("📟 {}", ctrl.set_teach_sensitivity(level));
        }

        let status = ctrl.set_teach_mode(true);
        if ctrl.snapshot().mode != Mode::Teach {
            runtime.disconnect();
            anyhow::bail!("❌ {}", status);
        }
        println!("📟 {}", status);
        println!("💡 拖动机械臂开始录制，静止后自动保存；按 Ctrl-C 放弃");

        if let Some(link) = &runtime.mock {
            simulate_drag(link.clone());
        }

        let deadline = seconds(Some(self.timeout)).map(|d| Instant::now() + d);
        let mut label = ctrl.snapshot().display_label();
        let finished = loop {
            match signal.recv_timeout(POLL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break false,
                Err(RecvTimeoutError::Timeout) => {},
            }

            let snap = ctrl.snapshot();
            if snap.display_label() != label {
                label = snap.display_label();
                println!("📟 {}", label);
            }
            if snap.mode != Mode::Teach {
                break true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                println!("⚠️  等待超时");
                break false;
            }
        };

        if finished {
            let status = ctrl.status();
            if status.starts_with("record:save failed") || status.starts_with("Teach disable") {
                println!("⚠️  {}", status);
            } else {
                println!("✅ 轨迹已保存: {}", ctrl.options().trajectory_name);
            }
        } else {
            println!("📟 {}", ctrl.set_teach_mode(false));
        }
        runtime.disconnect();
        Ok(())
    }
}

/// 模拟一次拖动：约 0.5 秒的连续关节变化，然后保持静止
fn simulate_drag(link: Arc<MockLink>) {
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        for step in 0..25 {
            let angle = 0.02 * step as f64;
            if !link.push_joint_report(vec![angle, angle / 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]) {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
    });
}
