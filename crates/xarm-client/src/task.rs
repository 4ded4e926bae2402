//! 后台任务槽与停止协调
//!
//! 往复运动与轨迹回放共用一个任务槽，任何时刻至多一个任务存活。
//! 停止分三步进行：
//!
//! 1. 持状态锁：置位取消令牌并取出任务句柄（[`TaskSlot::begin_stop`]）
//! 2. 释放锁后：有界等待线程退出（[`StopTicket::wait`]）
//! 3. 重新持锁：由调用方更新会话状态
//!
//! 第 2 步不持锁，后台线程中的阻塞硬件调用不会与停止方互相等待。

use crate::cancel::CancellationToken;
use crossbeam_channel::{RecvTimeoutError, bounded};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> io::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> io::Result<()> {
        let (tx, rx) = bounded(1);

        // 看门狗线程负责 join，超时后继续在后台等待
        thread::spawn(move || {
            let _ = tx.send(self.join().is_ok());
        });

        match rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) | Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            )),
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "Thread join timeout",
            )),
        }
    }
}

/// 后台任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 往复运动
    Oscillation,
    /// 轨迹回放
    Playback,
    /// 示教运动检测
    Detector,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Oscillation => "oscillation",
            TaskKind::Playback => "playback",
            TaskKind::Detector => "detector",
        };
        f.write_str(name)
    }
}

/// 线程退出时清除运行标志（包括 panic 展开）
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 正在运行的后台任务
pub struct BackgroundTask {
    kind: TaskKind,
    token: CancellationToken,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// 在独立线程中启动任务
    pub fn spawn<F>(kind: TaskKind, body: F) -> io::Result<Self>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        let thread_token = token.clone();
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name(format!("xarm-{}", kind))
            .spawn(move || {
                let _guard = RunningGuard(thread_running);
                body(thread_token);
            })?;

        debug!(%kind, "background task spawned");
        Ok(Self {
            kind,
            token,
            running,
            handle,
        })
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_alive(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 置位取消令牌并交出句柄
    pub fn stop(self) -> StopTicket {
        self.token.cancel();
        StopTicket {
            kind: self.kind,
            handle: self.handle,
        }
    }
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("kind", &self.kind)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// 已请求停止、等待退出的任务
#[derive(Debug)]
pub struct StopTicket {
    kind: TaskKind,
    handle: JoinHandle<()>,
}

impl StopTicket {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// 有界等待任务线程退出
    ///
    /// 返回 `true` 表示线程已在时限内结束。超时后不再等待，线程在后台自行结束。
    /// 从任务自身线程调用时直接返回 `false`。
    pub fn wait(self, timeout: Duration) -> bool {
        let kind = self.kind;
        if self.handle.thread().id() == thread::current().id() {
            debug!(%kind, "skipping self join");
            return false;
        }

        match self.handle.join_timeout(timeout) {
            Ok(()) => {
                debug!(%kind, "background task joined");
                true
            },
            Err(e) => {
                warn!(%kind, ?timeout, error = %e, "background task did not exit cleanly");
                false
            },
        }
    }
}

/// 运动任务槽（往复运动与回放互斥）
#[derive(Debug, Default)]
pub struct TaskSlot {
    current: Option<BackgroundTask>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 回收已自行结束的任务
    pub fn reap_finished(&mut self) -> Option<TaskKind> {
        if self.current.as_ref().is_some_and(|t| !t.is_alive()) {
            let task = self.current.take()?;
            debug!(kind = %task.kind, "reaped finished task");
            return Some(task.kind);
        }
        None
    }

    /// 是否有存活任务
    pub fn is_busy(&mut self) -> bool {
        self.reap_finished();
        self.current.is_some()
    }

    /// 存活任务的类型
    pub fn active_kind(&self) -> Option<TaskKind> {
        self.current
            .as_ref()
            .filter(|t| t.is_alive())
            .map(BackgroundTask::kind)
    }

    /// 槽中任务是否持有 `token`
    pub fn is_current(&self, token: &CancellationToken) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| t.token.same_as(token))
    }

    /// 放入新任务；槽被占用时原样退回
    pub fn install(&mut self, task: BackgroundTask) -> Result<(), BackgroundTask> {
        if self.is_busy() {
            return Err(task);
        }
        self.current = Some(task);
        Ok(())
    }

    /// 停止协议第一步
    ///
    /// `kind` 为 `Some` 时只停止该类型的任务。
    pub fn begin_stop(&mut self, kind: Option<TaskKind>) -> Option<StopTicket> {
        let matches = self
            .current
            .as_ref()
            .is_some_and(|t| kind.is_none_or(|k| t.kind == k));
        if !matches {
            return None;
        }
        self.current.take().map(BackgroundTask::stop)
    }
}
