//! 命令定义和实现

pub mod config;
pub mod oscillate;
pub mod replay;
pub mod teach;

pub use config::{CliConfig, ConfigCommand};
pub use oscillate::OscillateCommand;
pub use replay::ReplayCommand;
pub use teach::TeachCommand;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use std::sync::Arc;
use std::time::Duration;
use xarm_sdk::ArmController;
use xarm_sdk::link::{MockConnector, MockLink};

/// 一次命令的运行环境
pub struct Runtime {
    pub controller: ArmController,
    /// `--mock` 时的模拟链路
    pub mock: Option<Arc<MockLink>>,
    /// 命令行或配置文件中的控制器 IP
    pub ip: Option<String>,
}

impl Runtime {
    /// 按配置构建控制器
    ///
    /// `--mock` 时使用模拟链路，运动带有固定耗时以模拟真实节奏。
    pub fn new(config: &CliConfig, ip: Option<&str>, mock: bool) -> Self {
        let detect = config.detect.clone();
        let options = config.controller_options();

        if mock {
            let link = Arc::new(MockLink::new());
            link.set_move_duration(Duration::from_millis(200));
            link.set_play_duration(Duration::from_millis(500));
            let connector = Arc::new(MockConnector::new(link.clone()));
            return Self {
                controller: ArmController::new(connector, detect, options),
                mock: Some(link),
                ip: Some(ip.unwrap_or("127.0.0.1").to_string()),
            };
        }

        Self {
            controller: ArmController::tcp(detect, options),
            mock: None,
            ip: config.resolve_ip(ip).ok(),
        }
    }

    /// 连接控制器，失败时返回状态文本作为错误
    pub fn connect(&self) -> Result<()> {
        let ip = self.ip.as_deref().ok_or_else(|| {
            anyhow::anyhow!("未指定控制器 IP，请使用 --ip 或 `xarm-cli config set --ip <IP>`")
        })?;
        println!("⏳ 连接到 {} ...", ip);
        let status = self.controller.connect(ip);
        if !self.controller.snapshot().connected {
            anyhow::bail!("❌ {}", status);
        }
        println!("✅ {}", status);
        Ok(())
    }

    pub fn disconnect(&self) {
        println!("📟 {}", self.controller.disconnect());
    }
}

/// 注册 Ctrl-C，返回停止信号
pub fn stop_signal() -> Result<Receiver<()>> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("注册 Ctrl-C 处理器失败")?;
    Ok(rx)
}

/// 等待 Ctrl-C 或到达时长
pub fn wait_for_stop(signal: &Receiver<()>, duration: Option<Duration>) {
    match duration {
        Some(d) => {
            let _ = signal.recv_timeout(d);
        },
        None => {
            let _ = signal.recv();
        },
    }
}

/// 秒数转为 Duration（非正数视为不限时）
pub fn seconds(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(None), None);
        assert_eq!(seconds(Some(-1.0)), None);
        assert_eq!(seconds(Some(1.5)), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_mock_runtime_connects() {
        let runtime = Runtime::new(&CliConfig::default(), None, true);
        assert!(runtime.mock.is_some());
        runtime.connect().unwrap();
        assert!(runtime.controller.snapshot().connected);
        runtime.disconnect();
    }

    #[test]
    fn test_tcp_runtime_requires_ip() {
        let runtime = Runtime::new(&CliConfig::default(), None, false);
        assert!(runtime.ip.is_none());
        assert!(runtime.connect().is_err());
    }
}
