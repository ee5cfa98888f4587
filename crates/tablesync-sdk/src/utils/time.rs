//! 时间工具
//!
//! - 过期判断、偏好的 `touched_at` 使用 UTC 毫秒时间戳（`Utc::now().timestamp_millis()`）
//! - 轮询间隔、空闲判断使用单调时钟（`tokio::time::Instant`），不受系统时间调整影响

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// 墙上时钟（可在测试中替换）
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_utc_millis()
    }
}

/// 手动推进的时钟
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn now_utc_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO 8601 格式（同步日志使用）
pub fn format_iso8601(utc_timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(utc_timestamp_ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| utc_timestamp_ms.to_string())
}
