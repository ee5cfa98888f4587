//! SDK 生命周期管理
//!
//! 管理页面可见性（前后台切换）等一级生命周期事件，统一触发各模块的状态切换。

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// 页面切换到后台（不可见）时调用
    async fn on_background(&self) -> Result<()>;

    /// 页面切换到前台（可见）时调用
    async fn on_foreground(&self) -> Result<()>;
}

/// 生命周期管理器
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// 获取已注册的 Hook 数量
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// 注册生命周期回调 Hook
    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：切换到后台
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误并继续执行其他 Hook，最后返回第一个错误
    pub async fn notify_background(&self) -> Result<()> {
        info!("🔄 通知所有模块：切换到后台");

        let mut errors = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_background().await {
                warn!("⚠️ Hook #{} 后台切换失败: {}", index, e);
                errors.push(e);
            }
        }

        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        info!("✅ 所有模块后台切换完成");
        Ok(())
    }

    /// 通知所有 Hook：切换到前台
    pub async fn notify_foreground(&self) -> Result<()> {
        info!("🔄 通知所有模块：切换到前台");

        let mut errors = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_foreground().await {
                warn!("⚠️ Hook #{} 前台切换失败: {}", index, e);
                errors.push(e);
            }
        }

        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        info!("✅ 所有模块前台切换完成");
        Ok(())
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

// 调度器可见性 Hook（SDK 内部自动注册）
mod visibility_hook;
pub use visibility_hook::SchedulerVisibilityHook;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TablesyncSDKError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        background: AtomicUsize,
        foreground: AtomicUsize,
        fail: bool,
    }

    impl CountingHook {
        fn new(fail: bool) -> Self {
            Self {
                background: AtomicUsize::new(0),
                foreground: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl LifecycleHook for CountingHook {
        async fn on_background(&self) -> Result<()> {
            self.background.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TablesyncSDKError::ShuttingDown("hook".into()));
            }
            Ok(())
        }

        async fn on_foreground(&self) -> Result<()> {
            self.foreground.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_hook_does_not_block_others() {
        let failing = Arc::new(CountingHook::new(true));
        let healthy = Arc::new(CountingHook::new(false));
        let mut manager = LifecycleManager::new();
        manager.register_hook(failing.clone());
        manager.register_hook(healthy.clone());
        assert_eq!(manager.hook_count(), 2);

        assert!(manager.notify_background().await.is_err());
        assert_eq!(healthy.background.load(Ordering::SeqCst), 1);

        manager.notify_foreground().await.unwrap();
        assert_eq!(failing.foreground.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.foreground.load(Ordering::SeqCst), 1);
    }
}
