//! 调度器可见性 Hook
//!
//! 切到后台时放宽轮询上限；切回前台时立即发起一次同步，不阻塞回调。

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::sync::AdaptiveScheduler;
use async_trait::async_trait;
use tracing::info;

pub struct SchedulerVisibilityHook {
    scheduler: AdaptiveScheduler,
}

impl SchedulerVisibilityHook {
    pub fn new(scheduler: AdaptiveScheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl LifecycleHook for SchedulerVisibilityHook {
    async fn on_background(&self) -> Result<()> {
        info!("[Visibility Hook] 页面不可见，轮询切换到后台上限");
        self.scheduler.set_visible(false);
        Ok(())
    }

    async fn on_foreground(&self) -> Result<()> {
        info!("[Visibility Hook] 页面可见，立即同步");
        self.scheduler.set_visible(true);
        self.scheduler.request_sync();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::PollConfig;
    use crate::sync::{ActivityTracker, CycleOutcome, CycleRunner, IdleDetector, PollPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run_cycle(&self) -> CycleOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            CycleOutcome::Clean
        }
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_triggers_one_sync_without_blocking() {
        let runner = Arc::new(CountingRunner::default());
        let activity = Arc::new(ActivityTracker::new());
        let scheduler = AdaptiveScheduler::new(
            runner.clone(),
            PollPolicy::new(PollConfig::default()),
            activity.clone(),
            IdleDetector::new(Duration::from_secs(3600)),
        );
        let hook = SchedulerVisibilityHook::new(scheduler);

        hook.on_background().await.unwrap();
        assert!(!activity.snapshot().visible);

        hook.on_foreground().await.unwrap();
        assert!(activity.snapshot().visible);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }
}
