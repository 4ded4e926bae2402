//! 运行模式
//!
//! - One-shot 模式：`oscillate` / `teach` / `replay` 每次命令独立连接
//! - REPL 模式：交互式 Shell，会话内保持连接

pub mod repl;
