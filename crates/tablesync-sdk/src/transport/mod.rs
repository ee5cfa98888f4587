//! 远端权威服务（房间/桌面存储）的访问边界
//!
//! 同步核心只通过 [`RemoteAuthority`] 与服务端交互；生产实现为 [`HttpAuthority`]，
//! 测试使用内存实现 `test_helpers::MemoryAuthority`。
//!
//! 状态码约定（由实现负责映射）：
//! - 轮询类 GET 的 404 → `ResourceGone`
//! - 写入类请求的 404 → `StaleWrite`
//! - 其余非预期状态 → `UnexpectedStatus`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::digest::{DigestMap, Hashed};
use crate::error::Result;
use crate::model::{Layer, Piece, PieceDraft, Room, TableSlot};

mod http;

pub use http::HttpAuthority;

/// 部分字段更新的线格式（未设置的字段不序列化）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "asset")]
    pub asset_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<u32>,
}

impl PatchPayload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// 将补丁合并到棋子上（内存服务端与本地预览使用）
    pub fn apply_to(&self, piece: &mut Piece) {
        if let Some(x) = self.x {
            piece.x = x;
        }
        if let Some(y) = self.y {
            piece.y = y;
        }
        if let Some(z) = self.z {
            piece.z = z;
        }
        if let Some(rotation) = self.rotation {
            piece.rotation = rotation;
        }
        if let Some(side) = self.side {
            piece.side = side;
        }
        if let Some(number) = self.number {
            piece.number = number;
        }
        if let Some(color_index) = self.color_index {
            piece.color_index = color_index;
        }
        if let Some(border_index) = self.border_index {
            piece.border_index = border_index;
        }
        if let Some(label) = &self.label {
            piece.label = label.clone();
        }
        if let Some(asset_ref) = &self.asset_ref {
            piece.asset_ref = asset_ref.clone();
        }
        if let Some(layer) = self.layer {
            piece.layer = layer;
        }
        if let Some(w) = self.w {
            piece.w = w;
        }
        if let Some(h) = self.h {
            piece.h = h;
        }
    }
}

/// 远端权威服务
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// 当前摘要表（轻量请求）
    async fn fetch_digests(&self, room_id: &str) -> Result<DigestMap>;

    /// 房间元数据，附带 `room.json` 的哈希
    async fn fetch_room(&self, room_id: &str) -> Result<Hashed<Room>>;

    /// 桌面完整棋子列表，附带该桌面的哈希
    async fn fetch_table(&self, room_id: &str, slot: TableSlot) -> Result<Hashed<Vec<Piece>>>;

    /// 新建棋子，返回服务端实际存储的棋子（含分配的 ID）
    async fn create_pieces(&self, room_id: &str, slot: TableSlot, drafts: &[PieceDraft]) -> Result<Vec<Piece>>;

    /// 部分字段更新
    async fn patch_pieces(&self, room_id: &str, slot: TableSlot, patches: &[PatchPayload]) -> Result<Vec<Piece>>;

    async fn delete_pieces(&self, room_id: &str, slot: TableSlot, ids: &[String]) -> Result<()>;

    /// 整桌替换（清空 / 恢复）
    async fn replace_table(&self, room_id: &str, slot: TableSlot, pieces: &[Piece]) -> Result<Vec<Piece>>;
}

#[cfg(test)]
pub mod test_helpers;
