//! 数据模型：棋子、桌面、房间
//!
//! 与服务端 JSON 线格式一一对应（camelCase 字段）。

pub mod piece;
pub mod room;
pub mod table;

pub use piece::{Layer, Piece, PieceDraft, PieceFlags};
pub use room::{AssetDef, Room, RoomSetup};
pub use table::{TableSlot, MAX_TABLES};
