//! 棋子修改意图与本地归一化
//!
//! 归一化规则：
//! - 旋转取到 90° 的倍数并对 360 取模（-90 与 270 存储值相同）
//! - 数字角标对 16 取模
//! - 填充色、边框色分别对房间调色板大小取模（-1 即最后一个颜色）
//! - 翻面对素材面数取模，未指定目标面时翻到下一面

use crate::model::{Piece, Room, RoomSetup};
use crate::transport::PatchPayload;

pub const ROTATION_STEP: i32 = 90;
pub const NUMBER_MODULUS: i32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum PiecePatch {
    Move { x: i32, y: i32, z: Option<i32> },
    /// 目标角度（任意整数，归一化到 0/90/180/270）
    Rotate { degrees: i32 },
    /// `None` 表示翻到下一面
    Flip { side: Option<i32> },
    Number { value: i32 },
    Recolor { color: Option<i32>, border: Option<i32> },
    Edit(PieceEdit),
}

/// 字段编辑（标签、素材、尺寸）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PieceEdit {
    pub label: Option<String>,
    pub asset_ref: Option<String>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

impl PiecePatch {
    pub fn kind(&self) -> &'static str {
        match self {
            PiecePatch::Move { .. } => "move",
            PiecePatch::Rotate { .. } => "rotate",
            PiecePatch::Flip { .. } => "flip",
            PiecePatch::Number { .. } => "number",
            PiecePatch::Recolor { .. } => "recolor",
            PiecePatch::Edit(_) => "edit",
        }
    }

    /// 受保护标志阻止时返回原因
    pub fn blocked_by(&self, piece: &Piece) -> Option<&'static str> {
        match self {
            PiecePatch::Move { .. } if !piece.can_move() => Some("no-move"),
            _ => None,
        }
    }

    /// 归一化为线格式
    pub fn normalize(&self, piece: &Piece, room: Option<&Room>) -> PatchPayload {
        let default_setup = RoomSetup::default();
        let setup = room.map(|r| &r.setup).unwrap_or(&default_setup);
        let mut payload = PatchPayload::new(piece.id.clone());

        match self {
            PiecePatch::Move { x, y, z } => {
                payload.x = Some(*x);
                payload.y = Some(*y);
                payload.z = *z;
            }
            PiecePatch::Rotate { degrees } => {
                payload.rotation = Some(normalize_rotation(*degrees));
            }
            PiecePatch::Flip { side } => {
                let sides = room.map(|r| r.sides_of(&piece.asset_ref)).unwrap_or(1);
                let target = side.unwrap_or(piece.side as i32 + 1);
                payload.side = Some(wrap(target, sides as i32) as u8);
            }
            PiecePatch::Number { value } => {
                payload.number = Some(wrap(*value, NUMBER_MODULUS) as u8);
            }
            PiecePatch::Recolor { color, border } => {
                payload.color_index = color.map(|c| wrap(c, setup.palette_size as i32) as u8);
                payload.border_index = border.map(|b| wrap(b, setup.border_palette_size as i32) as u8);
            }
            PiecePatch::Edit(edit) => {
                payload.label = edit.label.clone();
                payload.asset_ref = edit.asset_ref.clone();
                payload.w = edit.w.map(|w| w.max(1));
                payload.h = edit.h.map(|h| h.max(1));
            }
        }
        payload
    }
}

pub fn normalize_rotation(degrees: i32) -> u16 {
    let steps = (degrees as f64 / ROTATION_STEP as f64).round() as i32;
    (steps * ROTATION_STEP).rem_euclid(360) as u16
}

/// 取模到 `0..modulus`，模数非正时按 1 处理
fn wrap(value: i32, modulus: i32) -> i32 {
    value.rem_euclid(modulus.max(1))
}
