//! 空闲检测：距最近一次本地输入超过阈值即视为空闲

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct IdleDetector {
    threshold: Duration,
}

impl IdleDetector {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_idle(&self, since_local: Duration) -> bool {
        since_local >= self.threshold
    }
}
