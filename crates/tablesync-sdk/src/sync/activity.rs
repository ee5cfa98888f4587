//! 活跃度记录：最近一次本地输入、最近一次观察到远端变化、页面可见性
//!
//! 使用 `tokio::time::Instant`（单调时钟），测试中可暂停/推进时间。

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub since_local: Duration,
    /// 从未观察到远端变化时为 `None`
    pub since_remote: Option<Duration>,
    pub visible: bool,
}

#[derive(Debug)]
struct ActivityState {
    last_local: Instant,
    last_remote: Option<Instant>,
    visible: bool,
}

#[derive(Debug)]
pub struct ActivityTracker {
    state: Mutex<ActivityState>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// 创建时视为刚有过本地操作，页面可见
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ActivityState {
                last_local: Instant::now(),
                last_remote: None,
                visible: true,
            }),
        }
    }

    pub fn touch(&self, is_local: bool) {
        let now = Instant::now();
        let mut state = self.state.lock();
        if is_local {
            state.last_local = now;
        } else {
            state.last_remote = Some(now);
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.state.lock().visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    pub fn since_local(&self) -> Duration {
        Instant::now().saturating_duration_since(self.state.lock().last_local)
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        let now = Instant::now();
        let state = self.state.lock();
        ActivitySnapshot {
            since_local: now.saturating_duration_since(state.last_local),
            since_remote: state.last_remote.map(|at| now.saturating_duration_since(at)),
            visible: state.visible,
        }
    }
}
