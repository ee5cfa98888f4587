//! 一次轮询周期：摘要检查 → 拉取应用 → 对账
//!
//! 一个周期内循环处理，直到摘要全部一致（首次加载时房间与全部桌面在同一周期内完成）。
//! 错误按类型处理：资源已删除为终态；其余错误上报后等待下一次轮询。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::activity::ActivityTracker;
use super::context::SharedContext;
use super::digest_checker::check_digests;
use super::scheduler::CycleRunner;
use super::table_fetcher::fetch_and_apply;
use super::CycleOutcome;
use crate::digest::ResourceKey;
use crate::error::{ErrorKind, Result, TablesyncSDKError};
use crate::events::{event_builders, EventManager};
use crate::model::MAX_TABLES;
use crate::transport::RemoteAuthority;
use crate::utils::time::{format_iso8601, Clock};

/// 房间 + 全部桌面，再留一次余量
const MAX_FETCHES_PER_CYCLE: usize = MAX_TABLES as usize + 2;

pub struct SyncPipeline {
    ctx: SharedContext,
    remote: Arc<dyn RemoteAuthority>,
    events: Arc<EventManager>,
    activity: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
}

impl SyncPipeline {
    pub fn new(
        ctx: SharedContext,
        remote: Arc<dyn RemoteAuthority>,
        events: Arc<EventManager>,
        activity: Arc<ActivityTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ctx,
            remote,
            events,
            activity,
            clock,
        }
    }

    pub async fn run_once(&self) -> CycleOutcome {
        let mut applied = Vec::new();
        for _ in 0..MAX_FETCHES_PER_CYCLE {
            match self.step().await {
                Ok(Some(key)) => applied.push(key),
                Ok(None) => {
                    let now = self.clock.now_millis();
                    self.ctx.write().stats.last_success_at = Some(now);
                    if applied.is_empty() {
                        return CycleOutcome::Clean;
                    }
                    info!("✅ 同步完成 {}: {} 个资源已更新", format_iso8601(now), applied.len());
                    return CycleOutcome::Applied(applied);
                }
                Err(e) => return self.report(&e).await,
            }
        }
        warn!("⚠️ 单个周期内拉取次数达到上限，剩余变化留到下一次轮询");
        CycleOutcome::Applied(applied)
    }

    /// 拉取一次指定资源（切换桌面时使用）；失败按错误类型上报后原样返回
    pub async fn fetch(&self, key: ResourceKey) -> Result<()> {
        let now = self.clock.now_millis();
        let result = fetch_and_apply(&self.ctx, self.remote.as_ref(), &self.events, key, now).await;
        if let Err(e) = &result {
            self.report(e).await;
        }
        result
    }

    async fn step(&self) -> Result<Option<ResourceKey>> {
        let now = self.clock.now_millis();
        let dirty = check_digests(&self.ctx, self.remote.as_ref(), &self.activity, now).await?;
        if let Some(key) = dirty {
            fetch_and_apply(&self.ctx, self.remote.as_ref(), &self.events, key, now).await?;
        }
        Ok(dirty)
    }

    async fn report(&self, e: &TablesyncSDKError) -> CycleOutcome {
        self.ctx.write().stats.errors += 1;
        match e.kind() {
            ErrorKind::ResourceGone => {
                let key = match e {
                    TablesyncSDKError::ResourceGone(key) => key.clone(),
                    other => other.to_string(),
                };
                error!("❌ 资源已被删除，停止同步: {}", key);
                self.events.emit(event_builders::resource_gone(key.clone())).await;
                CycleOutcome::Gone(key)
            }
            _ => {
                warn!("⚠️ 同步失败，等待下一次轮询: {}", e);
                self.events.emit(event_builders::sync_error(e.to_string())).await;
                CycleOutcome::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl CycleRunner for SyncPipeline {
    async fn run_cycle(&self) -> CycleOutcome {
        self.run_once().await
    }

    async fn on_suspended(&self, idle_for: Duration) {
        self.events
            .emit(event_builders::sync_suspended(idle_for.as_millis() as u64))
            .await;
    }
}
