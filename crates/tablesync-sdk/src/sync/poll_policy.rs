//! 轮询间隔计算（纯函数，除随机抖动外无副作用）
//!
//! 上限由可见性决定（前台小、后台大）；刚观察到远端变化时收缩到下限；
//! 最近有本地输入时再压到本地活跃上限。新间隔 = 上次间隔 × 增长系数，
//! 夹到 `[floor, ceiling]`，加对称抖动后再夹一次。

use std::time::Duration;

use super::activity::ActivitySnapshot;
use crate::sdk::PollConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBounds {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl DelayBounds {
    pub fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.floor, self.ceiling)
    }
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    config: PollConfig,
}

impl PollPolicy {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn bounds(&self, activity: &ActivitySnapshot) -> DelayBounds {
        let c = &self.config;
        let floor = Duration::from_millis(c.floor_ms);
        let mut ceiling = if activity.visible {
            Duration::from_millis(c.foreground_ceiling_ms)
        } else {
            Duration::from_millis(c.background_ceiling_ms)
        };

        if matches!(activity.since_remote, Some(since) if since < Duration::from_millis(c.remote_hot_window_ms)) {
            ceiling = floor;
        }
        if activity.since_local < Duration::from_millis(c.local_hot_window_ms) {
            ceiling = ceiling.min(Duration::from_millis(c.local_activity_ceiling_ms));
        }

        DelayBounds {
            floor,
            ceiling: ceiling.max(floor),
        }
    }

    pub fn next_delay(&self, previous: Duration, activity: &ActivitySnapshot) -> Duration {
        self.next_delay_with(previous, activity, rand::random::<f64>())
    }

    /// `unit` ∈ [0, 1)，0.5 表示无抖动
    pub fn next_delay_with(&self, previous: Duration, activity: &ActivitySnapshot, unit: f64) -> Duration {
        let bounds = self.bounds(activity);
        let growth = if activity.visible {
            self.config.foreground_growth
        } else {
            self.config.background_growth
        };
        let grown = bounds.clamp(previous.mul_f64(growth.max(1.0)));
        let factor = 1.0 + (unit - 0.5) * 2.0 * self.config.jitter_ratio;
        bounds.clamp(grown.mul_f64(factor.max(0.0)))
    }
}
