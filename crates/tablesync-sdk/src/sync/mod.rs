//! 基于摘要轮询的同步模块
//!
//! 职责：
//! - 摘要检查：一次轻量请求找出第一个不一致的资源
//! - 拉取应用：下载完整资源、更新缓存与摘要
//! - 对账：把当前桌面应用到已渲染集合，保留本地选中
//! - 自适应调度：按活跃度与可见性计算下一次轮询间隔
//! - 空闲检测：长时间无本地输入时挂起轮询

pub mod activity;
pub mod context;
pub mod digest_checker;
pub mod idle;
pub mod materialized;
pub mod pipeline;
pub mod poll_policy;
pub mod reconciler;
pub mod scheduler;
pub mod table_fetcher;

pub use activity::{ActivitySnapshot, ActivityTracker};
pub use context::{SharedContext, SyncContext};
pub use digest_checker::check_digests;
pub use idle::IdleDetector;
pub use materialized::{
    is_drag_placeholder, LayerSet, MaterializedPiece, MaterializedTable, NullSurface, PieceSurface,
    DRAG_PLACEHOLDER_SUFFIX,
};
pub use pipeline::SyncPipeline;
pub use poll_policy::{DelayBounds, PollPolicy};
pub use reconciler::{is_structural_change, reconcile, ReconcileReport};
pub use scheduler::{AdaptiveScheduler, CycleRunner, SchedulerPhase};
pub use table_fetcher::fetch_and_apply;

use crate::digest::ResourceKey;

/// 同步统计
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncStats {
    pub digest_checks: u64,
    pub fetches: u64,
    pub reconciles: u64,
    pub errors: u64,
    /// 最近一次成功检查的时间（UTC 毫秒）
    pub last_success_at: Option<i64>,
}

/// 一次轮询周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 摘要全部一致
    Clean,
    /// 拉取并应用了这些资源
    Applied(Vec<ResourceKey>),
    /// 可重试的错误，下一次轮询自然重试
    Failed(String),
    /// 资源已被删除，调度器永久停止
    Gone(String),
}

impl CycleOutcome {
    pub fn is_gone(&self) -> bool {
        matches!(self, CycleOutcome::Gone(_))
    }
}
