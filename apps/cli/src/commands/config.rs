//! 配置管理命令
//!
//! 配置文件位于 `<config_dir>/xarm-loop/config.toml`，可用 `--config` 覆盖。

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use xarm_sdk::{ControllerOptions, DetectConfig};

/// 缺省配置文件路径
pub fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("xarm-loop");
    path.push("config.toml");
    Ok(path)
}

/// 机器人连接配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSection {
    /// 控制器 IP
    pub ip: Option<String>,
    /// 轨迹名（覆盖 controller.trajectory_name）
    pub trajectory: Option<String>,
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub robot: RobotSection,
    pub detect: DetectConfig,
    pub controller: ControllerOptions,
}

impl CliConfig {
    /// 加载配置；文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, format!("# xArm CLI Configuration\n\n{}", content))
            .context("写入配置文件失败")?;
        Ok(())
    }

    /// 合并轨迹名覆盖后的控制器参数
    pub fn controller_options(&self) -> ControllerOptions {
        let mut options = self.controller.clone();
        if let Some(name) = self.robot.trajectory.as_ref().filter(|n| !n.trim().is_empty()) {
            options.trajectory_name = name.trim().to_string();
        }
        options
    }

    /// 命令行参数优先，其次配置文件
    pub fn resolve_ip(&self, flag: Option<&str>) -> Result<String> {
        flag.map(str::to_string)
            .or_else(|| self.robot.ip.clone())
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("未指定控制器 IP，请使用 --ip 或 `xarm-cli config set --ip <IP>`")
            })
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 控制器 IP
        #[arg(long)]
        ip: Option<String>,

        /// 轨迹名
        #[arg(long)]
        trajectory: Option<String>,

        /// 静止超时（秒）
        #[arg(long)]
        idle_timeout: Option<f64>,

        /// 运动判定阈值（rad）
        #[arg(long)]
        threshold: Option<f64>,

        /// 碰撞灵敏度（0-5）
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
        collision: Option<u8>,

        /// 示教灵敏度（0-5）
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
        teach_sensitivity: Option<u8>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（ip / trajectory / idle_timeout / threshold / all）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                ip,
                trajectory,
                idle_timeout,
                threshold,
                collision,
                teach_sensitivity,
            } => {
                let mut config = CliConfig::load(path)?;

                if let Some(ip) = ip {
                    println!("✅ 设置控制器 IP: {}", ip);
                    config.robot.ip = Some(ip);
                }
                if let Some(name) = trajectory {
                    println!("✅ 设置轨迹名: {}", name);
                    config.robot.trajectory = Some(name);
                }
                if let Some(seconds) = idle_timeout {
                    anyhow::ensure!(seconds > 0.0, "静止超时必须为正数: {}", seconds);
                    println!("✅ 设置静止超时: {}s", seconds);
                    config.detect.idle_timeout_seconds = seconds;
                }
                if let Some(th) = threshold {
                    anyhow::ensure!(th > 0.0, "运动阈值必须为正数: {}", th);
                    println!("✅ 设置运动阈值: {} rad", th);
                    config.detect.motion_threshold_rad = th;
                }
                if let Some(level) = collision {
                    println!("✅ 设置碰撞灵敏度: {}", level);
                    config.controller.collision_sensitivity = level;
                }
                if let Some(level) = teach_sensitivity {
                    println!("✅ 设置示教灵敏度: {}", level);
                    config.controller.teach_sensitivity = level;
                }

                config.save(path)
            },

            ConfigCommand::Get { key } => {
                let config = CliConfig::load(path)?;
                match key.as_str() {
                    "ip" => println!("{}", config.robot.ip.as_deref().unwrap_or("(未设置)")),
                    "trajectory" => println!("{}", config.controller_options().trajectory_name),
                    "idle_timeout" => println!("{}", config.detect.idle_timeout_seconds),
                    "threshold" => println!("{}", config.detect.motion_threshold_rad),
                    _ => print!("{}", toml::to_string_pretty(&config)?),
                }
                Ok(())
            },

            ConfigCommand::Check => {
                let config = CliConfig::load(path)?;
                println!("配置文件: {}", path.display());
                println!("  IP: {:?}", config.robot.ip);
                println!("  轨迹名: {}", config.controller_options().trajectory_name);
                println!(
                    "  运动检测: 阈值 {} rad，静止超时 {}s",
                    config.detect.motion_threshold_rad, config.detect.idle_timeout_seconds
                );
                println!(
                    "  灵敏度: 碰撞 {}，示教 {}",
                    config.controller.collision_sensitivity, config.controller.teach_sensitivity
                );
                if config.robot.ip.is_none() {
                    println!("⚠️  未设置控制器 IP");
                }
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", path.display());
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.robot.ip = Some("192.168.1.221".to_string());
        config.detect.idle_timeout_seconds = 2.5;
        config.save(&path).unwrap();

        assert_eq!(CliConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[robot]\ntrajectory = \"wave\"\n").unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.controller_options().trajectory_name, "wave");
        assert_eq!(config.detect, DetectConfig::default());
    }

    #[test]
    fn test_resolve_ip_precedence() {
        let mut config = CliConfig::default();
        assert!(config.resolve_ip(None).is_err());

        config.robot.ip = Some("10.0.0.1".to_string());
        assert_eq!(config.resolve_ip(None).unwrap(), "10.0.0.1");
        assert_eq!(config.resolve_ip(Some("10.0.0.2")).unwrap(), "10.0.0.2");
    }
}
