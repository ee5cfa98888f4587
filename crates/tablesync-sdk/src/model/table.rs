//! 桌面编号与过期清理

use serde::{Deserialize, Serialize};

use super::piece::Piece;
use crate::error::{Result, TablesyncSDKError};

/// 每个房间最多 9 张桌面
pub const MAX_TABLES: u8 = 9;

/// 桌面编号 1..=9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TableSlot(u8);

impl TableSlot {
    pub fn new(slot: u8) -> Result<Self> {
        if (1..=MAX_TABLES).contains(&slot) {
            Ok(Self(slot))
        } else {
            Err(TablesyncSDKError::InvalidArgument(format!(
                "桌面编号必须在 1..={} 之间: {}",
                MAX_TABLES, slot
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// 按编号升序的全部桌面
    pub fn all() -> impl Iterator<Item = TableSlot> {
        (1..=MAX_TABLES).map(TableSlot)
    }
}

impl Default for TableSlot {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for TableSlot {
    type Error = TablesyncSDKError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TableSlot> for u8 {
    fn from(slot: TableSlot) -> u8 {
        slot.0
    }
}

impl std::fmt::Display for TableSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn has_expired(pieces: &[Piece], now_ms: i64) -> bool {
    pieces.iter().any(|p| p.is_expired(now_ms))
}

/// 本地过期清理，返回被移除的数量
pub fn sweep_expired(pieces: &mut Vec<Piece>, now_ms: i64) -> usize {
    let before = pieces.len();
    pieces.retain(|p| !p.is_expired(now_ms));
    before - pieces.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::piece::{Layer, PieceDraft};

    #[test]
    fn slot_bounds() {
        assert!(TableSlot::new(0).is_err());
        assert!(TableSlot::new(10).is_err());
        assert_eq!(TableSlot::new(9).unwrap().get(), 9);
        let all: Vec<u8> = TableSlot::all().map(TableSlot::get).collect();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(serde_json::from_str::<TableSlot>("12").is_err());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mut pieces = vec![
            Piece::from_draft("a".into(), PieceDraft::new(Layer::Token, "x", 0, 0)),
            Piece::from_draft("b".into(), PieceDraft::new(Layer::Other, "x", 0, 0).with_expiry(500)),
            Piece::from_draft("c".into(), PieceDraft::new(Layer::Other, "x", 0, 0).with_expiry(5000)),
        ];
        assert!(has_expired(&pieces, 1000));
        assert_eq!(sweep_expired(&mut pieces, 1000), 1);
        let ids: Vec<&str> = pieces.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(!has_expired(&pieces, 1000));
    }
}
