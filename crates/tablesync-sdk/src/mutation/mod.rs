//! 写入网关：先写后同步
//!
//! 每个操作：本地归一化 → 远端写入 → 请求一次同步（调用方可抑制，用于批量操作）。
//! 写入完成前不修改本地任何状态，UI 只在随后的对账中看到服务端确认的结果。
//!
//! - 受保护的棋子（no-delete / no-move / no-clone）对应操作静默返回 `NoOp`，不发请求
//! - 目标已被他人删除（stale write）只记日志，并且总是请求一次同步（即使调用方抑制了同步），
//!   保证本地缓存能自行纠正

mod patch;

pub use patch::{normalize_rotation, PieceEdit, PiecePatch, NUMBER_MODULUS, ROTATION_STEP};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, TablesyncSDKError};
use crate::model::{Piece, PieceDraft};
use crate::sync::{AdaptiveScheduler, SharedContext};
use crate::transport::{PatchPayload, RemoteAuthority};

/// 写入选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOptions {
    /// 写入后请求同步
    pub sync: bool,
    /// 新建（或克隆）后自动选中服务端分配的 ID
    pub auto_select: bool,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            sync: true,
            auto_select: false,
        }
    }
}

impl MutationOptions {
    /// 批量操作中的单步：不触发同步
    pub fn batched() -> Self {
        Self {
            sync: false,
            auto_select: false,
        }
    }

    pub fn with_auto_select(mut self) -> Self {
        self.auto_select = true;
        self
    }
}

/// 写入结果
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult {
    /// 服务端实际存储的棋子
    Applied(Vec<Piece>),
    /// 被保护标志拦截，没有发出请求
    NoOp { reason: &'static str },
    /// 目标已不存在，等待对账移除
    Stale,
}

impl MutationResult {
    pub fn is_noop(&self) -> bool {
        matches!(self, MutationResult::NoOp { .. })
    }

    pub fn pieces(&self) -> &[Piece] {
        match self {
            MutationResult::Applied(pieces) => pieces,
            _ => &[],
        }
    }
}

pub struct MutationGateway {
    ctx: SharedContext,
    remote: Arc<dyn RemoteAuthority>,
    scheduler: AdaptiveScheduler,
}

impl MutationGateway {
    pub fn new(ctx: SharedContext, remote: Arc<dyn RemoteAuthority>, scheduler: AdaptiveScheduler) -> Self {
        Self { ctx, remote, scheduler }
    }

    pub async fn move_piece(&self, id: &str, x: i32, y: i32, opts: MutationOptions) -> Result<MutationResult> {
        self.patch(id, PiecePatch::Move { x, y, z: None }, opts).await
    }

    pub async fn rotate(&self, id: &str, degrees: i32, opts: MutationOptions) -> Result<MutationResult> {
        self.patch(id, PiecePatch::Rotate { degrees }, opts).await
    }

    pub async fn flip(&self, id: &str, side: Option<i32>, opts: MutationOptions) -> Result<MutationResult> {
        self.patch(id, PiecePatch::Flip { side }, opts).await
    }

    pub async fn set_number(&self, id: &str, value: i32, opts: MutationOptions) -> Result<MutationResult> {
        self.patch(id, PiecePatch::Number { value }, opts).await
    }

    pub async fn recolor(
        &self,
        id: &str,
        color: Option<i32>,
        border: Option<i32>,
        opts: MutationOptions,
    ) -> Result<MutationResult> {
        self.patch(id, PiecePatch::Recolor { color, border }, opts).await
    }

    pub async fn edit(&self, id: &str, edit: PieceEdit, opts: MutationOptions) -> Result<MutationResult> {
        self.patch(id, PiecePatch::Edit(edit), opts).await
    }

    /// 移到所在图层最上方
    pub async fn to_front(&self, id: &str, opts: MutationOptions) -> Result<MutationResult> {
        self.restack(id, true, opts).await
    }

    /// 移到所在图层最下方
    pub async fn to_back(&self, id: &str, opts: MutationOptions) -> Result<MutationResult> {
        self.restack(id, false, opts).await
    }

    pub async fn patch(&self, id: &str, patch: PiecePatch, opts: MutationOptions) -> Result<MutationResult> {
        self.ensure_cached(id)?;
        self.bulk_patch(vec![(id.to_string(), patch)], opts).await
    }

    /// 批量修改；被保护或已不在缓存中的条目跳过，全部被跳过时返回 `NoOp`
    pub async fn bulk_patch(&self, patches: Vec<(String, PiecePatch)>, opts: MutationOptions) -> Result<MutationResult> {
        let (slot, payloads, blocked) = {
            let ctx = self.ctx.read();
            let room = ctx.room.as_ref();
            let mut payloads: Vec<PatchPayload> = Vec::with_capacity(patches.len());
            let mut blocked = None;
            for (id, patch) in &patches {
                let Ok(piece) = find(ctx.active_pieces(), id) else {
                    debug!("棋子 {} 已不在当前桌面，跳过 {}", id, patch.kind());
                    continue;
                };
                if let Some(reason) = patch.blocked_by(piece) {
                    debug!("棋子 {} 受保护 ({})，跳过 {}", id, reason, patch.kind());
                    blocked = Some(reason);
                    continue;
                }
                payloads.push(patch.normalize(piece, room));
            }
            (ctx.active_slot, payloads, blocked)
        };

        if payloads.is_empty() {
            return Ok(MutationResult::NoOp {
                reason: blocked.unwrap_or("empty"),
            });
        }

        let room_id = self.room_id();
        let result = self.remote.patch_pieces(&room_id, slot, &payloads).await;
        self.finish(result, opts, "patch").await
    }

    pub async fn delete(&self, id: &str, opts: MutationOptions) -> Result<MutationResult> {
        self.ensure_cached(id)?;
        self.bulk_delete(vec![id.to_string()], opts).await
    }

    /// 批量删除；no-delete 或已不在缓存中的棋子跳过
    pub async fn bulk_delete(&self, ids: Vec<String>, opts: MutationOptions) -> Result<MutationResult> {
        let (slot, deletable) = {
            let ctx = self.ctx.read();
            let pieces = ctx.active_pieces();
            let mut deletable = Vec::with_capacity(ids.len());
            for id in &ids {
                let Ok(piece) = find(pieces, id) else {
                    debug!("棋子 {} 已不在当前桌面，跳过删除", id);
                    continue;
                };
                if piece.can_delete() {
                    deletable.push(id.clone());
                } else {
                    debug!("棋子 {} 受保护 (no-delete)，跳过删除", id);
                }
            }
            (ctx.active_slot, deletable)
        };

        if deletable.is_empty() {
            return Ok(MutationResult::NoOp { reason: "no-delete" });
        }

        let room_id = self.room_id();
        let result = self
            .remote
            .delete_pieces(&room_id, slot, &deletable)
            .await
            .map(|_| Vec::new());
        self.finish(result, opts, "delete").await
    }

    pub async fn create(&self, draft: PieceDraft, opts: MutationOptions) -> Result<MutationResult> {
        self.create_many(vec![draft], opts).await
    }

    pub async fn create_many(&self, drafts: Vec<PieceDraft>, opts: MutationOptions) -> Result<MutationResult> {
        if drafts.is_empty() {
            return Ok(MutationResult::NoOp { reason: "empty" });
        }
        let (room_id, slot) = {
            let ctx = self.ctx.read();
            (ctx.room_id().to_string(), ctx.active_slot)
        };
        let result = self.remote.create_pieces(&room_id, slot, &drafts).await;
        if opts.auto_select {
            if let Ok(created) = &result {
                let mut ctx = self.ctx.write();
                ctx.pending_reselect.extend(created.iter().map(|p| p.id.clone()));
            }
        }
        self.finish(result, opts, "create").await
    }

    /// 克隆到右下方一个网格；no-clone 的棋子返回 `NoOp`
    pub async fn clone_piece(&self, id: &str, opts: MutationOptions) -> Result<MutationResult> {
        let draft = {
            let ctx = self.ctx.read();
            let piece = find(ctx.active_pieces(), id)?;
            if !piece.can_clone() {
                return Ok(MutationResult::NoOp { reason: "no-clone" });
            }
            let step = ctx.room.as_ref().map(|r| r.setup.grid_size).unwrap_or(1).max(1) as i32;
            let mut draft = PieceDraft::from_piece(piece);
            draft.x += step;
            draft.y += step;
            draft
        };
        self.create(draft, opts).await
    }

    /// 整桌替换（恢复快照）
    pub async fn replace_table(&self, pieces: Vec<Piece>, opts: MutationOptions) -> Result<MutationResult> {
        let (room_id, slot) = {
            let ctx = self.ctx.read();
            (ctx.room_id().to_string(), ctx.active_slot)
        };
        info!("🔄 替换桌面 {}: {} 个棋子", slot, pieces.len());
        let result = self.remote.replace_table(&room_id, slot, &pieces).await;
        self.finish(result, opts, "replace").await
    }

    pub async fn clear_table(&self, opts: MutationOptions) -> Result<MutationResult> {
        self.replace_table(Vec::new(), opts).await
    }

    async fn restack(&self, id: &str, front: bool, opts: MutationOptions) -> Result<MutationResult> {
        let patch = {
            let ctx = self.ctx.read();
            let pieces = ctx.active_pieces();
            let piece = find(pieces, id)?;
            let siblings = pieces
                .unwrap_or(&[])
                .iter()
                .filter(|p| p.layer == piece.layer && p.id != piece.id)
                .map(|p| p.z);
            let z = if front {
                siblings.max().map(|z| z.max(piece.z - 1) + 1)
            } else {
                siblings.min().map(|z| z.min(piece.z + 1) - 1)
            };
            match z {
                Some(z) => PiecePatch::Move {
                    x: piece.x,
                    y: piece.y,
                    z: Some(z),
                },
                None => return Ok(MutationResult::NoOp { reason: "alone" }),
            }
        };
        self.patch(id, patch, opts).await
    }

    fn ensure_cached(&self, id: &str) -> Result<()> {
        find(self.ctx.read().active_pieces(), id).map(|_| ())
    }

    fn room_id(&self) -> String {
        self.ctx.read().room_id().to_string()
    }

    async fn finish(&self, result: Result<Vec<Piece>>, opts: MutationOptions, op: &str) -> Result<MutationResult> {
        match result {
            Ok(pieces) => {
                debug!("写入成功: {} ({} 个棋子)", op, pieces.len());
                if opts.sync {
                    self.scheduler.sync_now().await;
                }
                Ok(MutationResult::Applied(pieces))
            }
            Err(e) if e.is_stale_write() => {
                warn!("⚠️ 写入目标已不存在，等待对账移除: {} ({})", op, e);
                self.scheduler.sync_now().await;
                Ok(MutationResult::Stale)
            }
            Err(e) => Err(e),
        }
    }
}

fn find<'a>(pieces: Option<&'a [Piece]>, id: &str) -> Result<&'a Piece> {
    pieces
        .and_then(|list| list.iter().find(|p| p.id == id))
        .ok_or_else(|| TablesyncSDKError::NotFound(format!("棋子不在当前桌面: {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventManager;
    use crate::model::{Layer, PieceFlags, TableSlot};
    use crate::sdk::PollConfig;
    use crate::sync::{ActivityTracker, IdleDetector, NullSurface, PollPolicy, SyncContext, SyncPipeline};
    use crate::transport::test_helpers::{test_room, MemoryAuthority};
    use crate::utils::time::ManualClock;
    use std::time::Duration;

    struct Client {
        remote: Arc<MemoryAuthority>,
        ctx: SharedContext,
        scheduler: AdaptiveScheduler,
        gateway: MutationGateway,
    }

    fn client(remote: Arc<MemoryAuthority>) -> Client {
        let ctx = SyncContext::new("room-1", TableSlot::default(), Arc::new(NullSurface)).shared();
        let activity = Arc::new(ActivityTracker::new());
        let pipeline = SyncPipeline::new(
            ctx.clone(),
            remote.clone(),
            Arc::new(EventManager::new(32)),
            activity.clone(),
            Arc::new(ManualClock::new(0)),
        );
        let scheduler = AdaptiveScheduler::new(
            Arc::new(pipeline),
            PollPolicy::new(PollConfig::default()),
            activity,
            IdleDetector::new(Duration::from_secs(3600)),
        );
        let gateway = MutationGateway::new(ctx.clone(), remote.clone(), scheduler.clone());
        Client {
            remote,
            ctx,
            scheduler,
            gateway,
        }
    }

    async fn seeded(pieces: Vec<PieceDraft>) -> Client {
        let remote = Arc::new(MemoryAuthority::new(test_room("room-1")));
        for (i, draft) in pieces.into_iter().enumerate() {
            remote.remote_put(TableSlot::default(), Piece::from_draft(format!("p{}", i + 1), draft));
        }
        let c = client(remote);
        c.scheduler.sync_now().await;
        c
    }

    fn token(x: i32) -> PieceDraft {
        PieceDraft::new(Layer::Token, "die", x, 0)
    }

    fn stored(c: &Client, id: &str) -> Piece {
        c.remote
            .pieces(TableSlot::default())
            .into_iter()
            .find(|p| p.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn move_is_written_then_reconciled() {
        let c = seeded(vec![token(0)]).await;
        let result = c.gateway.move_piece("p1", 3, 4, MutationOptions::default()).await.unwrap();
        assert_eq!(result.pieces()[0].x, 3);
        assert_eq!(c.ctx.read().materialized.get("p1").unwrap().piece.y, 4);
    }

    #[tokio::test]
    async fn rotation_and_number_are_normalized_before_write() {
        let c = seeded(vec![token(0), token(1)]).await;
        c.gateway.rotate("p1", -90, MutationOptions::default()).await.unwrap();
        c.gateway.rotate("p2", 270, MutationOptions::default()).await.unwrap();
        assert_eq!(stored(&c, "p1").rotation, stored(&c, "p2").rotation);

        c.gateway.set_number("p1", 40, MutationOptions::default()).await.unwrap();
        assert_eq!(stored(&c, "p1").number, 8);

        c.gateway.recolor("p1", Some(-1), None, MutationOptions::default()).await.unwrap();
        assert_eq!(stored(&c, "p1").color_index, 7);
    }

    #[tokio::test]
    async fn protected_delete_is_a_silent_noop() {
        let c = seeded(vec![token(0).with_flags(PieceFlags::NO_DELETE)]).await;
        c.remote.reset_calls();

        let result = c.gateway.delete("p1", MutationOptions::default()).await.unwrap();
        assert!(result.is_noop());
        assert_eq!(c.remote.calls().writes, 0);
        assert_eq!(c.remote.calls().digests, 0);
        assert_eq!(c.remote.pieces(TableSlot::default()).len(), 1);
    }

    #[tokio::test]
    async fn protected_move_is_a_silent_noop() {
        let c = seeded(vec![token(0).with_flags(PieceFlags::NO_MOVE)]).await;
        c.remote.reset_calls();
        let result = c.gateway.move_piece("p1", 9, 9, MutationOptions::default()).await.unwrap();
        assert_eq!(result, MutationResult::NoOp { reason: "no-move" });
        assert_eq!(c.remote.calls().writes, 0);

        // 其他修改不受 no-move 影响
        c.gateway.rotate("p1", 90, MutationOptions::default()).await.unwrap();
        assert_eq!(stored(&c, "p1").rotation, 90);
    }

    #[tokio::test]
    async fn suppressed_sync_skips_digest_check() {
        let c = seeded(vec![token(0)]).await;
        c.remote.reset_calls();
        c.gateway.move_piece("p1", 1, 1, MutationOptions::batched()).await.unwrap();
        assert_eq!(c.remote.calls().writes, 1);
        assert_eq!(c.remote.calls().digests, 0);
        // 本地尚未看到写入结果
        assert_eq!(c.ctx.read().materialized.get("p1").unwrap().piece.x, 0);
    }

    #[tokio::test]
    async fn stale_write_is_swallowed_and_always_resyncs() {
        let c = seeded(vec![token(0), token(1)]).await;
        c.remote.remote_remove(TableSlot::default(), "p1");
        c.remote.reset_calls();

        let result = c.gateway.move_piece("p1", 5, 5, MutationOptions::batched()).await.unwrap();
        assert_eq!(result, MutationResult::Stale);
        // 即使调用方抑制了同步，也会同步一次以移除过期棋子
        assert!(c.remote.calls().digests >= 1);
        assert!(!c.ctx.read().materialized.contains("p1"));
        assert!(c.ctx.read().materialized.contains("p2"));
    }

    #[tokio::test]
    async fn create_with_auto_select() {
        let c = seeded(vec![]).await;
        let result = c
            .gateway
            .create(token(2), MutationOptions::default().with_auto_select())
            .await
            .unwrap();
        let id = result.pieces()[0].id.clone();
        let ctx = c.ctx.read();
        assert!(ctx.materialized.is_selected(&id));
        assert!(ctx.pending_reselect.is_empty());
    }

    #[tokio::test]
    async fn clone_offsets_by_grid_and_respects_no_clone() {
        let c = seeded(vec![token(10), token(0).with_flags(PieceFlags::NO_CLONE)]).await;
        let result = c.gateway.clone_piece("p1", MutationOptions::default()).await.unwrap();
        let copy = &result.pieces()[0];
        assert_ne!(copy.id, "p1");
        assert_eq!((copy.x, copy.y), (74, 64));

        let blocked = c.gateway.clone_piece("p2", MutationOptions::default()).await.unwrap();
        assert_eq!(blocked, MutationResult::NoOp { reason: "no-clone" });
    }

    #[tokio::test]
    async fn restack_within_layer() {
        let mut low = token(0);
        low.z = 1;
        let mut high = token(1);
        high.z = 7;
        let mut note = PieceDraft::new(Layer::Note, "sticky", 0, 0);
        note.z = 100;
        let c = seeded(vec![low, high, note]).await;

        c.gateway.to_front("p1", MutationOptions::default()).await.unwrap();
        assert_eq!(stored(&c, "p1").z, 8);
        c.gateway.to_back("p1", MutationOptions::default()).await.unwrap();
        assert_eq!(stored(&c, "p1").z, 6);

        let alone = c.gateway.to_front("p3", MutationOptions::default()).await.unwrap();
        assert!(alone.is_noop());
    }

    #[tokio::test]
    async fn bulk_delete_skips_protected() {
        let c = seeded(vec![token(0), token(1).with_flags(PieceFlags::NO_DELETE), token(2)]).await;
        c.gateway
            .bulk_delete(vec!["p1".into(), "p2".into(), "p3".into()], MutationOptions::default())
            .await
            .unwrap();
        let remaining: Vec<String> = c.remote.pieces(TableSlot::default()).into_iter().map(|p| p.id).collect();
        assert_eq!(remaining, vec!["p2".to_string()]);
        assert_eq!(c.ctx.read().materialized.len(), 1);
    }

    #[tokio::test]
    async fn bulk_ops_skip_ids_missing_from_cache() {
        let c = seeded(vec![token(0), token(1)]).await;
        let result = c
            .gateway
            .bulk_patch(
                vec![
                    ("ghost".into(), PiecePatch::Rotate { degrees: 90 }),
                    ("p2".into(), PiecePatch::Rotate { degrees: 90 }),
                ],
                MutationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.pieces().len(), 1);
        assert_eq!(stored(&c, "p2").rotation, 90);

        c.gateway
            .bulk_delete(vec!["p1".into(), "ghost".into()], MutationOptions::default())
            .await
            .unwrap();
        let remaining: Vec<String> = c.remote.pieces(TableSlot::default()).into_iter().map(|p| p.id).collect();
        assert_eq!(remaining, vec!["p2".to_string()]);

        let nothing = c
            .gateway
            .bulk_delete(vec!["ghost".into()], MutationOptions::default())
            .await
            .unwrap();
        assert!(nothing.is_noop());
    }

    #[tokio::test]
    async fn clear_table_empties_materialized_state() {
        let c = seeded(vec![token(0), token(1)]).await;
        c.gateway.clear_table(MutationOptions::default()).await.unwrap();
        assert!(c.ctx.read().materialized.is_empty());
    }

    #[tokio::test]
    async fn unknown_piece_is_not_found() {
        let c = seeded(vec![]).await;
        let err = c.gateway.rotate("ghost", 90, MutationOptions::default()).await.unwrap_err();
        assert!(matches!(err, TablesyncSDKError::NotFound(_)));
        let err = c.gateway.delete("ghost", MutationOptions::default()).await.unwrap_err();
        assert!(matches!(err, TablesyncSDKError::NotFound(_)));
    }
}
