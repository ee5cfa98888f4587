//! 已渲染的棋子集合（本地 UI 状态）
//!
//! 渲染本身不在本库内，UI 层实现 [`PieceSurface`] 接收增删改与选中变化。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::model::{Layer, Piece};

/// 正在拖拽中的占位棋子 ID 后缀，对账时不会被移除
pub const DRAG_PLACEHOLDER_SUFFIX: &str = "-dragging";

pub fn is_drag_placeholder(id: &str) -> bool {
    id.ends_with(DRAG_PLACEHOLDER_SUFFIX)
}

/// UI 渲染边界
pub trait PieceSurface: Send + Sync {
    fn create(&self, _piece: &Piece) {}
    fn update(&self, _old: &Piece, _new: &Piece) {}
    fn remove(&self, _id: &str) {}
    fn set_selected(&self, _id: &str, _selected: bool) {}
}

/// 无 UI 时使用
#[derive(Debug, Default)]
pub struct NullSurface;

impl PieceSurface for NullSurface {}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedPiece {
    pub piece: Piece,
    pub selected: bool,
}

/// 可交互图层集合
pub type LayerSet = BTreeSet<Layer>;

pub fn default_layers() -> LayerSet {
    Layer::ALL.iter().copied().filter(|l| l.enabled_by_default()).collect()
}

pub struct MaterializedTable {
    entries: HashMap<String, MaterializedPiece>,
    surface: Arc<dyn PieceSurface>,
}

impl Default for MaterializedTable {
    fn default() -> Self {
        Self::new(Arc::new(NullSurface))
    }
}

impl MaterializedTable {
    pub fn new(surface: Arc<dyn PieceSurface>) -> Self {
        Self {
            entries: HashMap::new(),
            surface,
        }
    }

    pub fn surface(&self) -> &Arc<dyn PieceSurface> {
        &self.surface
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MaterializedPiece> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.entries.get(id).map(|e| e.selected).unwrap_or(false)
    }

    /// 当前选中的棋子 ID（排序后）
    pub fn selection(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.selected)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// 绘制顺序：图层分组，组内按 z，再按 ID 稳定排序
    pub fn paint_order(&self) -> Vec<&Piece> {
        let mut pieces: Vec<&Piece> = self.entries.values().map(|e| &e.piece).collect();
        pieces.sort_by(|a, b| {
            layer_rank(a.layer)
                .cmp(&layer_rank(b.layer))
                .then(a.z.cmp(&b.z))
                .then_with(|| a.id.cmp(&b.id))
        });
        pieces
    }

    /// 设置选中状态，返回是否发生变化
    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.selected != selected => {
                entry.selected = selected;
                self.surface.set_selected(id, selected);
                true
            }
            _ => false,
        }
    }

    /// 取消某图层上的全部选中
    pub fn deselect_layer(&mut self, layer: Layer) -> usize {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.selected && e.piece.layer == layer)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.set_selected(id, false);
        }
        ids.len()
    }

    /// 拖拽开始：复制一份占位棋子，返回占位 ID
    pub fn begin_drag(&mut self, id: &str) -> Option<String> {
        let source = self.entries.get(id)?.piece.clone();
        let placeholder_id = format!("{}{}", id, DRAG_PLACEHOLDER_SUFFIX);
        let placeholder = Piece {
            id: placeholder_id.clone(),
            ..source
        };
        self.insert(placeholder, false);
        Some(placeholder_id)
    }

    pub fn end_drag(&mut self, id: &str) {
        let placeholder_id = format!("{}{}", id, DRAG_PLACEHOLDER_SUFFIX);
        self.remove(&placeholder_id);
    }

    /// 清空（切换桌面时使用）
    pub fn clear(&mut self) {
        for id in self.entries.keys() {
            self.surface.remove(id);
        }
        self.entries.clear();
    }

    pub(crate) fn insert(&mut self, piece: Piece, selected: bool) {
        self.surface.create(&piece);
        if selected {
            self.surface.set_selected(&piece.id, true);
        }
        self.entries.insert(piece.id.clone(), MaterializedPiece { piece, selected });
    }

    pub(crate) fn replace_piece(&mut self, piece: Piece) {
        if let Some(entry) = self.entries.get_mut(&piece.id) {
            self.surface.update(&entry.piece, &piece);
            entry.piece = piece;
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<MaterializedPiece> {
        let removed = self.entries.remove(id);
        if removed.is_some() {
            self.surface.remove(id);
        }
        removed
    }
}

fn layer_rank(layer: Layer) -> usize {
    Layer::ALL.iter().position(|l| *l == layer).unwrap_or(Layer::ALL.len())
}
