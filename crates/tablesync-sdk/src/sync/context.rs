//! 同步上下文：一个房间会话的全部可变状态
//!
//! 各阶段（检查 → 拉取 → 对账）只在拿到异步结果后短暂持有写锁，锁不会跨越 `.await`。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::materialized::{default_layers, LayerSet, MaterializedTable, PieceSurface};
use super::reconciler::{reconcile, ReconcileReport};
use super::SyncStats;
use crate::digest::{DigestMap, ResourceKey};
use crate::model::{table, Piece, Room, TableSlot};

pub type SharedContext = Arc<RwLock<SyncContext>>;

pub struct SyncContext {
    room_id: String,
    session_id: String,
    pub active_slot: TableSlot,
    pub room: Option<Room>,
    /// 已缓存的桌面（惰性加载，摘要不一致或整桌替换时失效）
    pub tables: HashMap<TableSlot, Vec<Piece>>,
    /// 最近一次看到的服务端摘要
    pub digests: DigestMap,
    pub materialized: MaterializedTable,
    /// 下一次对账时需要选中的 ID（如新建后自动选中）
    pub pending_reselect: HashSet<String>,
    layers: HashMap<TableSlot, LayerSet>,
    pub stats: SyncStats,
}

impl SyncContext {
    pub fn new(room_id: impl Into<String>, active_slot: TableSlot, surface: Arc<dyn PieceSurface>) -> Self {
        Self {
            room_id: room_id.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            active_slot,
            room: None,
            tables: HashMap::new(),
            digests: DigestMap::new(),
            materialized: MaterializedTable::new(surface),
            pending_reselect: HashSet::new(),
            layers: HashMap::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn active_key(&self) -> ResourceKey {
        ResourceKey::Table(self.active_slot)
    }

    pub fn layers_for(&self, slot: TableSlot) -> LayerSet {
        self.layers.get(&slot).cloned().unwrap_or_else(default_layers)
    }

    pub fn set_layers(&mut self, slot: TableSlot, layers: LayerSet) {
        self.layers.insert(slot, layers);
    }

    pub fn active_pieces(&self) -> Option<&[Piece]> {
        self.tables.get(&self.active_slot).map(Vec::as_slice)
    }

    /// 在当前桌面缓存中查找棋子
    pub fn find_piece(&self, id: &str) -> Option<&Piece> {
        self.active_pieces()?.iter().find(|p| p.id == id)
    }

    /// 写入缓存：更新摘要、清理已过期棋子、整体替换
    pub fn cache_table(&mut self, slot: TableSlot, hash: String, mut pieces: Vec<Piece>, now_ms: i64) -> usize {
        self.digests.set(ResourceKey::Table(slot), hash);
        let swept = table::sweep_expired(&mut pieces, now_ms);
        self.tables.insert(slot, pieces);
        swept
    }

    /// 用当前桌面缓存对账；缓存缺失时返回 `None`
    pub fn reconcile_active(&mut self) -> Option<ReconcileReport> {
        let layers = self.layers_for(self.active_slot);
        let pieces = self.tables.get(&self.active_slot)?;
        let report = reconcile(&mut self.materialized, pieces, &self.pending_reselect, &layers);
        let materialized = &self.materialized;
        self.pending_reselect.retain(|id| !materialized.contains(id));
        self.stats.reconciles += 1;
        Some(report)
    }

    /// 切换当前桌面，清空已渲染集合；有缓存时立即对账并返回 `true`
    pub fn switch_to(&mut self, slot: TableSlot) -> bool {
        self.materialized.clear();
        self.pending_reselect.clear();
        self.active_slot = slot;
        self.reconcile_active().is_some()
    }
}
