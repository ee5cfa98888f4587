//! 房间元数据（所有桌面共享）

use serde::{Deserialize, Serialize};

use super::piece::Layer;

fn one_u8() -> u8 {
    1
}

fn one_u32() -> u32 {
    1
}

/// 素材库条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub layer: Layer,
    #[serde(default = "one_u32")]
    pub w: u32,
    #[serde(default = "one_u32")]
    pub h: u32,
    /// 面数（多面棋子可翻转）
    #[serde(default = "one_u8")]
    pub sides: u8,
    /// 每一面的图片
    #[serde(default)]
    pub media: Vec<String>,
}

/// 网格与调色板参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSetup {
    pub grid_size: u32,
    pub width: u32,
    pub height: u32,
    /// 填充色数量
    pub palette_size: u8,
    /// 边框色数量
    pub border_palette_size: u8,
}

impl Default for RoomSetup {
    fn default() -> Self {
        Self {
            grid_size: 64,
            width: 48,
            height: 32,
            palette_size: 8,
            border_palette_size: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// 房间生命周期内不变，用于划分本地缓存与偏好
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub library: Vec<AssetDef>,
    #[serde(default)]
    pub setup: RoomSetup,
}

impl Room {
    pub fn asset(&self, asset_ref: &str) -> Option<&AssetDef> {
        self.library.iter().find(|a| a.id == asset_ref)
    }

    /// 素材面数；素材缺失时按单面处理
    pub fn sides_of(&self, asset_ref: &str) -> u8 {
        self.asset(asset_ref).map(|a| a.sides.max(1)).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_defaults_and_lookup() {
        let json = r#"{"id":"r1","library":[{"id":"die","layer":"token","sides":6},{"id":"bad","layer":"token","sides":0}]}"#;
        let room: Room = serde_json::from_str(json).unwrap();
        assert_eq!(room.setup, RoomSetup::default());
        assert_eq!(room.sides_of("die"), 6);
        assert_eq!(room.sides_of("bad"), 1);
        assert_eq!(room.sides_of("missing"), 1);
    }
}
