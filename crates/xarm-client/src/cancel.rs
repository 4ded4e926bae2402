//! 协作式取消令牌
//!
//! 后台任务在迭代之间轮询 [`CancellationToken::is_cancelled`]，
//! 短暂等待使用 [`CancellationToken::wait_timeout`]，取消时立即唤醒。

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

struct Inner {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// 取消令牌（克隆后共享同一状态）
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// 请求取消并唤醒所有等待者
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.cond.notify_all();
    }

    /// 是否与 `other` 为同一令牌
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// 等待至多 `timeout`
    ///
    /// 返回 `true` 表示已取消（可能提前返回）。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            self.inner
                .cond
                .wait_while_for(&mut cancelled, |c| !*c, timeout);
        }
        *cancelled
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
