//! # xArm CLI
//!
//! Command-line interface for xArm oscillation, teach-record and replay.
//!
//! ## 双模式架构
//!
//! ### One-shot 模式
//!
//! ```bash
//! # 配置默认控制器
//! xarm-cli config set --ip 192.168.1.221
//!
//! # 往复运动（Ctrl-C 停止并回到起始位姿）
//! xarm-cli oscillate --amplitude 3 --speed 40 --axis z
//!
//! # 示教录制、循环回放
//! xarm-cli teach
//! xarm-cli replay --speed 2
//! ```
//!
//! ### REPL 模式
//!
//! ```bash
//! $ xarm-cli shell
//! xarm> connect
//! xarm> play 2 50 50 z
//! xarm> stop
//! xarm> exit
//! ```
//!
//! 所有命令都支持 `--mock`，在无硬件时使用模拟链路。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod modes;

use commands::{
    CliConfig, ConfigCommand, OscillateCommand, ReplayCommand, Runtime, TeachCommand,
};
use modes::repl::run_repl;

/// xArm CLI - 机械臂往复运动与示教回放工具
#[derive(Parser, Debug)]
#[command(name = "xarm-cli")]
#[command(about = "Command-line interface for xArm oscillation, teach-record and replay", long_about = None)]
#[command(version)]
struct Cli {
    /// 控制器 IP（覆盖配置文件）
    #[arg(long, global = true)]
    ip: Option<String>,

    /// 使用模拟链路（无需硬件）
    #[arg(long, global = true)]
    mock: bool,

    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 启动交互式 Shell（REPL 模式）
    Shell,

    /// 沿工具坐标轴往复运动
    Oscillate {
        #[command(flatten)]
        args: OscillateCommand,
    },

    /// 示教录制（静止后自动保存）
    Teach {
        #[command(flatten)]
        args: TeachCommand,
    },

    /// 循环回放已保存的轨迹
    Replay {
        #[command(flatten)]
        args: ReplayCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志（与 SDK 相同的订阅者，缺省 info）
    xarm_sdk::init_logger();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => commands::config::default_config_file()?,
    };

    if let Commands::Config(cmd) = cli.command {
        return cmd.execute(&config_path);
    }

    let config = CliConfig::load(&config_path)?;
    let runtime = Runtime::new(&config, cli.ip.as_deref(), cli.mock);
    tracing::debug!(mock = cli.mock, ip = ?runtime.ip, "runtime ready");

    match cli.command {
        Commands::Shell => run_repl(runtime).await,
        Commands::Oscillate { args } => {
            tokio::task::spawn_blocking(move || args.execute(&runtime)).await?
        },
        Commands::Teach { args } => {
            tokio::task::spawn_blocking(move || args.execute(&runtime)).await?
        },
        Commands::Replay { args } => {
            tokio::task::spawn_blocking(move || args.execute(&runtime)).await?
        },
        Commands::Config(_) => Ok(()),
    }
}
