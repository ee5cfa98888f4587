//! 测试用内存服务端
//!
//! 行为与 HTTP 服务端一致：哈希随内容变化、读取已删除资源返回 `ResourceGone`、
//! 写入不存在的棋子返回 `StaleWrite`。同时记录每类请求的调用次数。

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{PatchPayload, RemoteAuthority};
use crate::digest::{DigestMap, Hashed, ResourceKey};
use crate::error::{Result, TablesyncSDKError};
use crate::model::{Piece, PieceDraft, Room, TableSlot};

#[derive(Debug, Default, Clone)]
pub struct CallLog {
    pub digests: usize,
    pub rooms: usize,
    pub tables: Vec<TableSlot>,
    pub writes: usize,
}

struct MemoryState {
    room: Option<Room>,
    tables: BTreeMap<TableSlot, Vec<Piece>>,
    next_id: u64,
    calls: CallLog,
    fail_reads: usize,
}

pub struct MemoryAuthority {
    state: Mutex<MemoryState>,
}

pub fn hash_of<T: serde::Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap();
    let digest = Sha256::digest(&bytes);
    hex::encode(&digest[..6])
}

pub fn test_room(id: &str) -> Room {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": "Test Room",
        "library": [
            {"id": "die", "layer": "token", "sides": 6},
            {"id": "coin", "layer": "token", "sides": 2},
            {"id": "grass", "layer": "tile", "w": 2, "h": 2},
            {"id": "sticky", "layer": "note"}
        ],
        "setup": {"gridSize": 64, "width": 48, "height": 32, "paletteSize": 8, "borderPaletteSize": 4}
    }))
    .unwrap()
}

impl MemoryAuthority {
    /// 一个房间，9 张空桌面
    pub fn new(room: Room) -> Self {
        let tables = TableSlot::all().map(|slot| (slot, Vec::new())).collect();
        Self {
            state: Mutex::new(MemoryState {
                room: Some(room),
                tables,
                next_id: 1,
                calls: CallLog::default(),
                fail_reads: 0,
            }),
        }
    }

    pub fn calls(&self) -> CallLog {
        self.state.lock().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls = CallLog::default();
    }

    pub fn pieces(&self, slot: TableSlot) -> Vec<Piece> {
        self.state.lock().tables.get(&slot).cloned().unwrap_or_default()
    }

    pub fn digests(&self) -> DigestMap {
        Self::digest_map(&self.state.lock())
    }

    /// 模拟其他客户端写入
    pub fn remote_put(&self, slot: TableSlot, piece: Piece) {
        let mut state = self.state.lock();
        let table = state.tables.entry(slot).or_default();
        match table.iter_mut().find(|p| p.id == piece.id) {
            Some(existing) => *existing = piece,
            None => table.push(piece),
        }
    }

    pub fn remote_remove(&self, slot: TableSlot, id: &str) {
        if let Some(table) = self.state.lock().tables.get_mut(&slot) {
            table.retain(|p| p.id != id);
        }
    }

    pub fn set_room(&self, room: Room) {
        self.state.lock().room = Some(room);
    }

    /// 删除整个房间：之后所有读取都返回 `ResourceGone`
    pub fn delete_room(&self) {
        let mut state = self.state.lock();
        state.room = None;
        state.tables.clear();
    }

    /// 接下来 `n` 次读取返回传输错误
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().fail_reads = n;
    }

    fn digest_map(state: &MemoryState) -> DigestMap {
        let mut map = DigestMap::new();
        if let Some(room) = &state.room {
            map.set(ResourceKey::Room, hash_of(room));
        }
        for (slot, pieces) in &state.tables {
            map.set(ResourceKey::Table(*slot), hash_of(pieces));
        }
        map
    }

    fn check_read(state: &mut MemoryState) -> Result<()> {
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(TablesyncSDKError::Transport("connection reset".into()));
        }
        if state.room.is_none() {
            return Err(TablesyncSDKError::ResourceGone(ResourceKey::Room.as_string()));
        }
        Ok(())
    }

    fn table_mut(state: &mut MemoryState, slot: TableSlot) -> Result<&mut Vec<Piece>> {
        state
            .tables
            .get_mut(&slot)
            .ok_or_else(|| TablesyncSDKError::StaleWrite(ResourceKey::Table(slot).as_string()))
    }
}

#[async_trait]
impl RemoteAuthority for MemoryAuthority {
    async fn fetch_digests(&self, _room_id: &str) -> Result<DigestMap> {
        let mut state = self.state.lock();
        state.calls.digests += 1;
        Self::check_read(&mut state)?;
        Ok(Self::digest_map(&state))
    }

    async fn fetch_room(&self, _room_id: &str) -> Result<Hashed<Room>> {
        let mut state = self.state.lock();
        state.calls.rooms += 1;
        Self::check_read(&mut state)?;
        let room = state
            .room
            .clone()
            .ok_or_else(|| TablesyncSDKError::ResourceGone(ResourceKey::Room.as_string()))?;
        Ok(Hashed::new(hash_of(&room), room))
    }

    async fn fetch_table(&self, _room_id: &str, slot: TableSlot) -> Result<Hashed<Vec<Piece>>> {
        let mut state = self.state.lock();
        state.calls.tables.push(slot);
        Self::check_read(&mut state)?;
        let pieces = state
            .tables
            .get(&slot)
            .cloned()
            .ok_or_else(|| TablesyncSDKError::ResourceGone(ResourceKey::Table(slot).as_string()))?;
        Ok(Hashed::new(hash_of(&pieces), pieces))
    }

    async fn create_pieces(&self, _room_id: &str, slot: TableSlot, drafts: &[PieceDraft]) -> Result<Vec<Piece>> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        let first_id = state.next_id;
        state.next_id += drafts.len() as u64;
        let created: Vec<Piece> = drafts
            .iter()
            .enumerate()
            .map(|(i, draft)| Piece::from_draft(format!("srv-{}", first_id + i as u64), draft.clone()))
            .collect();
        Self::table_mut(&mut state, slot)?.extend(created.iter().cloned());
        Ok(created)
    }

    async fn patch_pieces(&self, _room_id: &str, slot: TableSlot, patches: &[PatchPayload]) -> Result<Vec<Piece>> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        let table = Self::table_mut(&mut state, slot)?;
        if let Some(missing) = patches.iter().find(|p| !table.iter().any(|piece| piece.id == p.id)) {
            return Err(TablesyncSDKError::StaleWrite(missing.id.clone()));
        }
        let mut updated = Vec::with_capacity(patches.len());
        for patch in patches {
            if let Some(piece) = table.iter_mut().find(|piece| piece.id == patch.id) {
                patch.apply_to(piece);
                updated.push(piece.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_pieces(&self, _room_id: &str, slot: TableSlot, ids: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        let table = Self::table_mut(&mut state, slot)?;
        if let Some(missing) = ids.iter().find(|id| !table.iter().any(|piece| &piece.id == *id)) {
            return Err(TablesyncSDKError::StaleWrite(missing.clone()));
        }
        table.retain(|piece| !ids.contains(&piece.id));
        Ok(())
    }

    async fn replace_table(&self, _room_id: &str, slot: TableSlot, pieces: &[Piece]) -> Result<Vec<Piece>> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        let table = Self::table_mut(&mut state, slot)?;
        *table = pieces.to_vec();
        Ok(pieces.to_vec())
    }
}
