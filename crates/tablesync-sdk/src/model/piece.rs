//! 棋子（共享实体）

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// 图层：决定 z 分组与可选中性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Tile,
    Token,
    Overlay,
    Other,
    Note,
}

impl Layer {
    /// 按绘制顺序（底 → 顶）
    pub const ALL: [Layer; 5] = [Layer::Tile, Layer::Overlay, Layer::Token, Layer::Other, Layer::Note];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tile => "tile",
            Self::Token => "token",
            Self::Overlay => "overlay",
            Self::Other => "other",
            Self::Note => "note",
        }
    }

    /// 新桌面默认可交互的图层（地块默认锁定，避免误拖）
    pub fn enabled_by_default(self) -> bool {
        !matches!(self, Self::Tile)
    }
}

impl FromStr for Layer {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tile" => Ok(Self::Tile),
            "token" => Ok(Self::Token),
            "overlay" => Ok(Self::Overlay),
            "other" => Ok(Self::Other),
            "note" => Ok(Self::Note),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// 棋子保护标志位（线格式为整数）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PieceFlags: u32 {
        const NO_DELETE = 0b0001;
        const NO_CLONE = 0b0010;
        const NO_MOVE = 0b0100;
        const NOTE_ANCHOR = 0b1000;
    }
}

impl Serialize for PieceFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for PieceFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        // 未知位直接丢弃，兼容服务端新增标志
        Ok(PieceFlags::from_bits_truncate(bits))
    }
}

fn one() -> u32 {
    1
}

/// 服务端存储的棋子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    /// 服务端分配的稳定 ID
    pub id: String,
    pub layer: Layer,
    /// 房间素材库中的素材 ID
    #[serde(rename = "asset")]
    pub asset_ref: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: i32,
    /// 尺寸（网格单位）
    #[serde(default = "one")]
    pub w: u32,
    #[serde(default = "one")]
    pub h: u32,
    /// 0 / 90 / 180 / 270
    #[serde(default)]
    pub rotation: u16,
    /// 当前朝上的面（从 0 开始）
    #[serde(default)]
    pub side: u8,
    /// 数字角标，0 表示无
    #[serde(default)]
    pub number: u8,
    #[serde(default)]
    pub color_index: u8,
    #[serde(default)]
    pub border_index: u8,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub flags: PieceFlags,
    /// 过期时间（UTC 毫秒），系统生成的临时棋子使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Piece {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_ms)
    }

    pub fn can_delete(&self) -> bool {
        !self.flags.contains(PieceFlags::NO_DELETE)
    }

    pub fn can_move(&self) -> bool {
        !self.flags.contains(PieceFlags::NO_MOVE)
    }

    pub fn can_clone(&self) -> bool {
        !self.flags.contains(PieceFlags::NO_CLONE)
    }

    /// 由服务端分配的 ID 和草稿组装（内存测试服务端使用）
    pub fn from_draft(id: String, draft: PieceDraft) -> Self {
        Self {
            id,
            layer: draft.layer,
            asset_ref: draft.asset_ref,
            x: draft.x,
            y: draft.y,
            z: draft.z,
            w: draft.w,
            h: draft.h,
            rotation: draft.rotation,
            side: draft.side,
            number: draft.number,
            color_index: draft.color_index,
            border_index: draft.border_index,
            label: draft.label,
            flags: draft.flags,
            expires_at: draft.expires_at,
        }
    }
}

/// 新建棋子的请求体（无 ID，由服务端分配）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceDraft {
    pub layer: Layer,
    #[serde(rename = "asset")]
    pub asset_ref: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: i32,
    #[serde(default = "one")]
    pub w: u32,
    #[serde(default = "one")]
    pub h: u32,
    #[serde(default)]
    pub rotation: u16,
    #[serde(default)]
    pub side: u8,
    #[serde(default)]
    pub number: u8,
    #[serde(default)]
    pub color_index: u8,
    #[serde(default)]
    pub border_index: u8,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub flags: PieceFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl PieceDraft {
    pub fn new(layer: Layer, asset_ref: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            layer,
            asset_ref: asset_ref.into(),
            x,
            y,
            z: 0,
            w: 1,
            h: 1,
            rotation: 0,
            side: 0,
            number: 0,
            color_index: 0,
            border_index: 0,
            label: String::new(),
            flags: PieceFlags::empty(),
            expires_at: None,
        }
    }

    /// 复制已有棋子（克隆操作使用，过期时间不继承）
    pub fn from_piece(piece: &Piece) -> Self {
        Self {
            layer: piece.layer,
            asset_ref: piece.asset_ref.clone(),
            x: piece.x,
            y: piece.y,
            z: piece.z,
            w: piece.w,
            h: piece.h,
            rotation: piece.rotation,
            side: piece.side,
            number: piece.number,
            color_index: piece.color_index,
            border_index: piece.border_index,
            label: piece.label.clone(),
            flags: piece.flags,
            expires_at: None,
        }
    }

    pub fn with_size(mut self, w: u32, h: u32) -> Self {
        self.w = w;
        self.h = h;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_flags(mut self, flags: PieceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}
