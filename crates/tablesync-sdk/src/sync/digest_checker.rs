//! 摘要检查
//!
//! 比较顺序：`room.json` → 当前桌面 → 1..9 号桌面（按编号）。
//! 返回第一个不一致的资源；未打开过的桌面同样比较，变化后静默预取，之后切换桌面无需等待。缓存中存在已过期棋子的桌面同样视为不一致：
//! 过期只取决于墙上时间，服务端哈希不会变化。

use tracing::{debug, info};

use super::activity::ActivityTracker;
use super::context::{SharedContext, SyncContext};
use crate::digest::{DigestMap, ResourceKey};
use crate::error::Result;
use crate::model::{table, TableSlot};
use crate::transport::RemoteAuthority;

pub async fn check_digests(
    ctx: &SharedContext,
    remote: &dyn RemoteAuthority,
    activity: &ActivityTracker,
    now_ms: i64,
) -> Result<Option<ResourceKey>> {
    let room_id = ctx.read().room_id().to_string();
    let remote_digests = remote.fetch_digests(&room_id).await?;

    let dirty = {
        let mut ctx = ctx.write();
        ctx.stats.digest_checks += 1;
        find_dirty(&ctx, &remote_digests, now_ms)
    };

    match dirty {
        Some(key) => {
            info!("🔄 检测到资源变化: {}", key);
            activity.touch(false);
        }
        None => debug!("摘要一致，无需拉取 (room: {})", room_id),
    }
    Ok(dirty)
}

/// 按固定顺序找出第一个需要拉取的资源
pub fn find_dirty(ctx: &SyncContext, remote: &DigestMap, now_ms: i64) -> Option<ResourceKey> {
    if ctx.digests.differs(remote, ResourceKey::Room) {
        return Some(ResourceKey::Room);
    }

    let active = ctx.active_slot;
    if table_dirty(ctx, remote, active, now_ms) {
        return Some(ResourceKey::Table(active));
    }

    TableSlot::all()
        .filter(|slot| *slot != active)
        .find(|slot| table_dirty(ctx, remote, *slot, now_ms))
        .map(ResourceKey::Table)
}

fn table_dirty(ctx: &SyncContext, remote: &DigestMap, slot: TableSlot, now_ms: i64) -> bool {
    ctx.digests.differs(remote, ResourceKey::Table(slot))
        || ctx
            .tables
            .get(&slot)
            .map(|pieces| table::has_expired(pieces, now_ms))
            .unwrap_or(false)
}
