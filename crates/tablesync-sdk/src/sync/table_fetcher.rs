//! 拉取并应用：下载完整资源，用同一响应的哈希更新摘要，整体替换缓存。
//! 只有当前桌面才会触发对账与 UI 通知，其余桌面静默刷新缓存。

use tracing::{debug, info};

use super::context::SharedContext;
use crate::digest::ResourceKey;
use crate::error::Result;
use crate::events::{event_builders, EventManager};
use crate::transport::RemoteAuthority;

pub async fn fetch_and_apply(
    ctx: &SharedContext,
    remote: &dyn RemoteAuthority,
    events: &EventManager,
    key: ResourceKey,
    now_ms: i64,
) -> Result<()> {
    let room_id = ctx.read().room_id().to_string();

    match key {
        ResourceKey::Room => {
            let hashed = remote.fetch_room(&room_id).await?;
            {
                let mut ctx = ctx.write();
                ctx.stats.fetches += 1;
                ctx.digests.set(ResourceKey::Room, hashed.hash);
                ctx.room = Some(hashed.value);
            }
            info!("✅ 房间元数据已更新: {}", room_id);
            events.emit(event_builders::room_updated()).await;
        }
        ResourceKey::Table(slot) => {
            let hashed = remote.fetch_table(&room_id, slot).await?;
            let count = hashed.value.len();
            let report = {
                let mut ctx = ctx.write();
                ctx.stats.fetches += 1;
                let swept = ctx.cache_table(slot, hashed.hash, hashed.value, now_ms);
                if swept > 0 {
                    debug!("桌面 {} 清理过期棋子 {} 个", slot, swept);
                }
                if ctx.active_slot == slot {
                    ctx.reconcile_active()
                } else {
                    None
                }
            };
            match report {
                Some(report) => {
                    info!(
                        "✅ 当前桌面 {} 已对账: {} 个棋子 (+{} ~{} -{})",
                        slot,
                        count,
                        report.created.len() + report.recreated.len(),
                        report.updated.len(),
                        report.removed.len()
                    );
                    events.emit(event_builders::table_updated(slot)).await;
                }
                None => debug!("桌面 {} 缓存已刷新（非当前桌面）", slot),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Layer, Piece, PieceDraft, TableSlot};
    use crate::sync::context::SyncContext;
    use crate::sync::materialized::NullSurface;
    use crate::transport::test_helpers::{hash_of, test_room, MemoryAuthority};
    use std::sync::Arc;

    fn slot(n: u8) -> TableSlot {
        TableSlot::new(n).unwrap()
    }

    fn piece(id: &str) -> Piece {
        Piece::from_draft(id.into(), PieceDraft::new(Layer::Token, "die", 0, 0))
    }

    #[tokio::test]
    async fn active_table_is_reconciled_and_announced() {
        let remote = MemoryAuthority::new(test_room("room-1"));
        remote.remote_put(slot(1), piece("a"));
        let ctx = SyncContext::new("room-1", slot(1), Arc::new(NullSurface)).shared();
        let events = EventManager::new(8);
        let mut rx = events.subscribe();

        fetch_and_apply(&ctx, &remote, &events, ResourceKey::Table(slot(1)), 0).await.unwrap();

        let guard = ctx.read();
        assert!(guard.materialized.contains("a"));
        assert_eq!(
            guard.digests.get(ResourceKey::Table(slot(1))),
            Some(hash_of(&remote.pieces(slot(1))).as_str())
        );
        assert_eq!(rx.try_recv().unwrap().slot(), Some(slot(1)));
    }

    #[tokio::test]
    async fn inactive_table_refreshes_cache_silently() {
        let remote = MemoryAuthority::new(test_room("room-1"));
        remote.remote_put(slot(2), piece("b"));
        let ctx = SyncContext::new("room-1", slot(1), Arc::new(NullSurface)).shared();
        let events = EventManager::new(8);
        let mut rx = events.subscribe();

        fetch_and_apply(&ctx, &remote, &events, ResourceKey::Table(slot(2)), 0).await.unwrap();

        let guard = ctx.read();
        assert_eq!(guard.tables[&slot(2)].len(), 1);
        assert!(guard.materialized.is_empty());
        assert_eq!(guard.stats.reconciles, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_fetch_updates_metadata() {
        let remote = MemoryAuthority::new(test_room("room-1"));
        let ctx = SyncContext::new("room-1", slot(1), Arc::new(NullSurface)).shared();
        let events = EventManager::new(8);
        let mut rx = events.subscribe();

        fetch_and_apply(&ctx, &remote, &events, ResourceKey::Room, 0).await.unwrap();

        assert_eq!(ctx.read().room.as_ref().map(|r| r.name.as_str()), Some("Test Room"));
        assert_eq!(rx.try_recv().unwrap().event_type(), "room_updated");
    }
}
