//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程 + tokio 通道，保留历史记录，不阻塞 tokio。
//! 后台每 500ms 轮询一次快照，状态文本变化时打印（例如检测线程开始录制）。

use crate::commands::Runtime;
use anyhow::{Context, Result};
use rustyline::Editor;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use xarm_sdk::{ArmController, Axis};

/// 状态轮询周期
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ctrl-C 在输入通道中的标记
const SIGINT: &str = "\u{3}";

/// 解析后的 REPL 命令
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Connect(Option<String>),
    Disconnect,
    Play {
        amplitude_cm: f64,
        speed_pct: f64,
        accel_pct: f64,
        axis: Axis,
    },
    Stop,
    Teach(bool),
    PlaybackStart(f64),
    PlaybackStop,
    Speed(f64),
    Collision(i64),
    TeachSensitivity(i64),
    Status,
    Help,
    Exit,
}

fn number<T: std::str::FromStr>(arg: Option<&&str>, name: &str, default: Option<T>) -> Result<T> {
    match (arg, default) {
        (Some(raw), _) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("无效的{}: {}", name, raw)),
        (None, Some(value)) => Ok(value),
        (None, None) => anyhow::bail!("缺少参数: {}", name),
    }
}

/// 解析一行输入
pub fn parse_line(line: &str) -> Result<ReplCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((head, args)) = parts.split_first() else {
        anyhow::bail!("空命令");
    };

    let cmd = match *head {
        "connect" => ReplCommand::Connect(args.first().map(|s| s.to_string())),
        "disconnect" => ReplCommand::Disconnect,
        "play" => ReplCommand::Play {
            amplitude_cm: number(args.first(), "振幅", Some(2.0))?,
            speed_pct: number(args.get(1), "速度", Some(50.0))?,
            accel_pct: number(args.get(2), "加速度", Some(50.0))?,
            axis: match args.get(3) {
                Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
                None => Axis::Z,
            },
        },
        "stop" => ReplCommand::Stop,
        "teach" => match args.first().copied() {
            Some("on") => ReplCommand::Teach(true),
            Some("off") => ReplCommand::Teach(false),
            _ => anyhow::bail!("用法: teach on|off"),
        },
        "playback" => match args.first().copied() {
            Some("start") => ReplCommand::PlaybackStart(number(args.get(1), "速度", Some(1.0))?),
            Some("stop") => ReplCommand::PlaybackStop,
            _ => anyhow::bail!("用法: playback start [speed] | playback stop"),
        },
        "speed" => ReplCommand::Speed(number(args.first(), "速度", None)?),
        "collision" => ReplCommand::Collision(number(args.first(), "灵敏度", None)?),
        "teach-sens" => ReplCommand::TeachSensitivity(number(args.first(), "灵敏度", None)?),
        "status" => ReplCommand::Status,
        "help" => ReplCommand::Help,
        "exit" | "quit" => ReplCommand::Exit,
        other => anyhow::bail!("未知命令: {}", other),
    };
    Ok(cmd)
}

/// 执行一条命令，返回状态文本
fn execute(ctrl: &ArmController, default_ip: Option<&str>, cmd: ReplCommand) -> Result<String> {
    let status = match cmd {
        ReplCommand::Connect(ip) => {
            let ip = ip
                .as_deref()
                .or(default_ip)
                .context("未指定控制器 IP，用法: connect <IP>")?;
            ctrl.connect(ip)
        },
        ReplCommand::Disconnect => ctrl.disconnect(),
        ReplCommand::Play {
            amplitude_cm,
            speed_pct,
            accel_pct,
            axis,
        } => ctrl.play(amplitude_cm, speed_pct, accel_pct, axis),
        ReplCommand::Stop => ctrl.stop(),
        ReplCommand::Teach(enable) => ctrl.set_teach_mode(enable),
        ReplCommand::PlaybackStart(speed) => {
            ctrl.set_playback_speed(speed);
            ctrl.start_playback(speed)
        },
        ReplCommand::PlaybackStop => ctrl.stop_playback(),
        ReplCommand::Speed(speed) => ctrl.set_playback_speed(speed),
        ReplCommand::Collision(level) => ctrl.set_collision_sensitivity(level),
        ReplCommand::TeachSensitivity(level) => ctrl.set_teach_sensitivity(level),
        ReplCommand::Status => {
            let snap = ctrl.snapshot();
            format!(
                "{} | {} | {} | ip={} fw={} speed={:.2}",
                snap.display_label(),
                snap.mode,
                snap.status,
                if snap.ip.is_empty() { "-" } else { snap.ip.as_str() },
                snap.firmware_version.as_deref().unwrap_or("-"),
                snap.playback_speed,
            )
        },
        ReplCommand::Help | ReplCommand::Exit => String::new(),
    };
    Ok(status)
}

/// REPL 输入（专用输入线程）
pub struct ReplInput {
    command_rx: mpsc::Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ReplInput {
    /// 创建专用输入线程（保留历史记录）
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::channel::<String>(10);

        // Editor 在输入线程内创建，生命周期 = REPL 会话
        let input_thread = thread::spawn(move || {
            use rustyline::history::DefaultHistory;

            let mut rl = Editor::<(), DefaultHistory>::new()
                .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;

            let history_path = ".xarm_history";
            rl.load_history(history_path).ok(); // 首次运行时不存在

            println!("xArm CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
            println!("输入 'help' 查看帮助，'exit' 退出");
            println!();

            loop {
                match rl.readline("xarm> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        if line == "exit" || line == "quit" {
                            rl.save_history(history_path).ok();
                            let _ = command_tx.blocking_send(line);
                            break;
                        }

                        let _ = rl.add_history_entry(line.clone());
                        if command_tx.blocking_send(line).is_err() {
                            break;
                        }
                    },

                    Err(rustyline::error::ReadlineError::Interrupted) => {
                        // Ctrl+C：交给主循环停止当前任务
                        println!("^C");
                        let _ = command_tx.blocking_send(SIGINT.to_string());
                    },

                    Err(rustyline::error::ReadlineError::Eof) => {
                        rl.save_history(history_path).ok();
                        let _ = command_tx.blocking_send("exit".to_string());
                        break;
                    },

                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    },
                }
            }

            Ok(())
        });

        Self {
            command_rx,
            _input_thread: input_thread,
        }
    }

    /// 等待用户输入（可在 select! 中安全取消）
    pub async fn recv_command(&mut self) -> Option<String> {
        self.command_rx.recv().await
    }
}

/// 控制器命令可能阻塞（停止时等待线程退出），放到阻塞线程池执行
async fn run_blocking(ctrl: &ArmController, default_ip: Option<String>, cmd: ReplCommand) -> Result<String> {
    let ctrl = ctrl.clone();
    tokio::task::spawn_blocking(move || execute(&ctrl, default_ip.as_deref(), cmd))
        .await
        .context("命令执行线程异常退出")?
}

/// 运行 REPL 模式
pub async fn run_repl(runtime: Runtime) -> Result<()> {
    let ctrl = runtime.controller.clone();
    let mut input = ReplInput::new();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last_seen = ctrl.snapshot().status.clone();

    println!();
    match &runtime.ip {
        Some(ip) => println!("💡 提示: 使用 'connect' 连接到 {}", ip),
        None => println!("💡 提示: 使用 'connect <IP>' 连接到控制器"),
    }
    if runtime.mock.is_some() {
        println!("🧪 模拟链路模式");
    }
    println!();

    loop {
        tokio::select! {
            // 用户输入
            line = input.recv_command() => {
                let Some(line) = line else {
                    break;
                };

                let cmd = if line == SIGINT {
                    ReplCommand::Stop
                } else {
                    match parse_line(&line) {
                        Ok(cmd) => cmd,
                        Err(err) => {
                            eprintln!("❌ {}", err);
                            continue;
                        },
                    }
                };

                match cmd {
                    ReplCommand::Exit => break,
                    ReplCommand::Help => print_help(),
                    cmd => match run_blocking(&ctrl, runtime.ip.clone(), cmd).await {
                        Ok(status) => {
                            println!("📟 {}", status);
                            last_seen = ctrl.snapshot().status.clone();
                        },
                        Err(err) => eprintln!("❌ {}", err),
                    },
                }
            }

            // 后台状态变化
            _ = ticker.tick() => {
                let snap = ctrl.snapshot();
                if snap.status != last_seen {
                    println!("\n📟 {}", snap.status);
                    last_seen = snap.status.clone();
                }
            }

            // Ctrl-C（输入线程未捕获时）
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n🛑 收到 Ctrl-C，停止当前任务");
                let _ = run_blocking(&ctrl, None, ReplCommand::Stop).await;
                break;
            }
        }
    }

    if ctrl.snapshot().connected {
        let _ = run_blocking(&ctrl, None, ReplCommand::Disconnect).await;
    }
    println!("👋 再见！");
    Ok(())
}

fn print_help() {
    println!("可用命令:");
    println!("  connect [ip]                      连接控制器");
    println!("  disconnect                        断开连接");
    println!("  play [cm] [speed%] [accel%] [axis] 沿工具轴往复运动");
    println!("  stop                              停止并回到起始位姿");
    println!("  teach on|off                      进入/退出示教模式");
    println!("  playback start [speed] | stop     循环回放轨迹");
    println!("  speed <0-5>                       设置回放速度");
    println!("  collision <0-5>                   碰撞灵敏度");
    println!("  teach-sens <0-5>                  示教灵敏度");
    println!("  status                            显示当前状态");
    println!("  exit                              退出");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_defaults() {
        assert_eq!(
            parse_line("play").unwrap(),
            ReplCommand::Play {
                amplitude_cm: 2.0,
                speed_pct: 50.0,
                accel_pct: 50.0,
                axis: Axis::Z,
            }
        );
        assert_eq!(
            parse_line("play 5 30 20 x").unwrap(),
            ReplCommand::Play {
                amplitude_cm: 5.0,
                speed_pct: 30.0,
                accel_pct: 20.0,
                axis: Axis::X,
            }
        );
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse_line("teach on").unwrap(), ReplCommand::Teach(true));
        assert_eq!(parse_line("  teach   off ").unwrap(), ReplCommand::Teach(false));
        assert_eq!(
            parse_line("playback start 3").unwrap(),
            ReplCommand::PlaybackStart(3.0)
        );
        assert_eq!(parse_line("playback stop").unwrap(), ReplCommand::PlaybackStop);
        assert_eq!(
            parse_line("connect 10.0.0.2").unwrap(),
            ReplCommand::Connect(Some("10.0.0.2".to_string()))
        );
        assert_eq!(parse_line("quit").unwrap(), ReplCommand::Exit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("").is_err());
        assert!(parse_line("teach maybe").is_err());
        assert!(parse_line("play abc").is_err());
        assert!(parse_line("play 1 2 3 w").is_err());
        assert!(parse_line("collision").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_execute_against_mock() {
        use crate::commands::CliConfig;

        let runtime = Runtime::new(&CliConfig::default(), None, true);
        let ctrl = &runtime.controller;
        let ip = runtime.ip.as_deref();

        assert_eq!(
            execute(ctrl, ip, ReplCommand::Connect(None)).unwrap(),
            "Connected to 127.0.0.1"
        );
        assert_eq!(execute(ctrl, ip, ReplCommand::Collision(4)).unwrap(), "collision:4");
        let status = execute(ctrl, ip, ReplCommand::Status).unwrap();
        assert!(status.starts_with("idle | position mode"), "{}", status);
        assert_eq!(execute(ctrl, ip, ReplCommand::Disconnect).unwrap(), "Disconnected");
    }
}
