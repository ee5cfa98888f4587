//! 对账：把服务端的棋子列表应用到已渲染集合
//!
//! 1. 新 ID 创建；结构性字段变化的删除重建；其余只更新变化字段
//! 2. 重新应用选中：`reselect` 中且图层可交互的选中；原地更新的棋子保留原有选中；
//!    图层不可交互的一律取消选中
//! 3. 不在新列表中的棋子视为已删除（拖拽占位除外）
//!
//! 同一列表连续对账两次，第二次不产生任何可见变化。

use std::collections::HashSet;

use tracing::debug;

use super::materialized::{is_drag_placeholder, LayerSet, MaterializedTable};
use crate::model::Piece;

/// 结构性字段变化时需要重建而不是原地更新
///
/// 结构性字段：图层、朝上的面、尺寸。旋转不算结构性变化（原地更新），
/// 这一区分与面切换的处理不一致，保留现状待确认。
pub fn is_structural_change(old: &Piece, new: &Piece) -> bool {
    old.layer != new.layer || old.side != new.side || old.w != new.w || old.h != new.h
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub recreated: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub selection_changed: usize,
}

impl ReconcileReport {
    /// 是否有可见变化
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.recreated.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.selection_changed == 0
    }
}

pub fn reconcile(
    table: &mut MaterializedTable,
    entities: &[Piece],
    reselect: &HashSet<String>,
    enabled_layers: &LayerSet,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut keep_ids: HashSet<&str> = HashSet::with_capacity(entities.len());

    for entity in entities {
        keep_ids.insert(entity.id.as_str());
        let selectable = enabled_layers.contains(&entity.layer);
        let requested = reselect.contains(&entity.id);

        let existing = table.get(&entity.id).map(|e| (e.piece.clone(), e.selected));
        match existing {
            None => {
                table.insert(entity.clone(), requested && selectable);
                report.created.push(entity.id.clone());
            }
            Some((old, _)) if is_structural_change(&old, entity) => {
                table.remove(&entity.id);
                table.insert(entity.clone(), requested && selectable);
                report.recreated.push(entity.id.clone());
            }
            Some((old, was_selected)) => {
                if old != *entity {
                    table.replace_piece(entity.clone());
                    report.updated.push(entity.id.clone());
                }
                if table.set_selected(&entity.id, (was_selected || requested) && selectable) {
                    report.selection_changed += 1;
                }
            }
        }
    }

    let stale: Vec<String> = table
        .ids()
        .filter(|id| !keep_ids.contains(id) && !is_drag_placeholder(id))
        .map(str::to_string)
        .collect();
    for id in stale {
        table.remove(&id);
        report.removed.push(id);
    }

    debug!(
        "对账完成: created={}, recreated={}, updated={}, removed={}",
        report.created.len(),
        report.recreated.len(),
        report.updated.len(),
        report.removed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Layer, PieceDraft};
    use crate::sync::materialized::default_layers;
    use crate::sync::materialized::test_helpers::RecordingSurface;
    use std::sync::Arc;

    fn piece(id: &str, layer: Layer, x: i32, y: i32) -> Piece {
        Piece::from_draft(id.into(), PieceDraft::new(layer, "die", x, y))
    }

    fn ids(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn snapshot(table: &MaterializedTable) -> Vec<(String, Piece, bool)> {
        let mut items: Vec<_> = table
            .ids()
            .map(|id| {
                let e = table.get(id).unwrap();
                (id.to_string(), e.piece.clone(), e.selected)
            })
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    #[test]
    fn structural_predicate_covers_layer_side_and_size() {
        let base = piece("p", Layer::Token, 0, 0);
        let mut moved = base.clone();
        moved.x = 5;
        moved.z = 3;
        moved.label = "x".into();
        assert!(!is_structural_change(&base, &moved));

        let mut rotated = base.clone();
        rotated.rotation = 90;
        assert!(!is_structural_change(&base, &rotated));

        let mut asset = base.clone();
        asset.asset_ref = "coin".into();
        assert!(!is_structural_change(&base, &asset));

        let changes: [fn(&mut Piece); 4] = [
            |p: &mut Piece| p.layer = Layer::Note,
            |p: &mut Piece| p.side = 1,
            |p: &mut Piece| p.w = 2,
            |p: &mut Piece| p.h = 3,
        ];
        for change in changes {
            let mut changed = base.clone();
            change(&mut changed);
            assert!(is_structural_change(&base, &changed));
        }
    }

    #[test]
    fn reconcile_is_idempotent() {
        let surface = Arc::new(RecordingSurface::default());
        let mut table = MaterializedTable::new(surface.clone());
        let layers = default_layers();
        let list = vec![
            piece("a", Layer::Token, 1, 1),
            piece("b", Layer::Note, 2, 2),
            piece("c", Layer::Tile, 0, 0),
        ];
        let reselect = ids(&["a", "c"]);

        let first = reconcile(&mut table, &list, &reselect, &layers);
        assert_eq!(first.created.len(), 3);
        let after_first = snapshot(&table);
        surface.take();

        let second = reconcile(&mut table, &list, &reselect, &layers);
        assert!(second.is_noop());
        assert_eq!(snapshot(&table), after_first);
        assert!(surface.take().is_empty());
    }

    #[test]
    fn selection_survives_position_change() {
        let mut table = MaterializedTable::default();
        let layers = default_layers();
        reconcile(&mut table, &[piece("a", Layer::Token, 0, 0)], &ids(&["a"]), &layers);
        assert!(table.is_selected("a"));

        let mut moved = piece("a", Layer::Token, 7, 8);
        moved.z = 4;
        let report = reconcile(&mut table, &[moved], &HashSet::new(), &layers);
        assert_eq!(report.updated, vec!["a".to_string()]);
        assert!(report.recreated.is_empty());
        assert!(table.is_selected("a"));
        assert_eq!(table.get("a").unwrap().piece.x, 7);
    }

    #[test]
    fn layer_change_recreates_and_clears_selection() {
        let mut table = MaterializedTable::default();
        let layers = default_layers();
        reconcile(&mut table, &[piece("a", Layer::Token, 0, 0)], &ids(&["a"]), &layers);

        let report = reconcile(&mut table, &[piece("a", Layer::Other, 0, 0)], &HashSet::new(), &layers);
        assert_eq!(report.recreated, vec!["a".to_string()]);
        assert!(!table.is_selected("a"));

        // 显式请求时恢复选中
        reconcile(&mut table, &[piece("a", Layer::Note, 0, 0)], &ids(&["a"]), &layers);
        assert!(table.is_selected("a"));
    }

    #[test]
    fn disabled_layer_is_never_selected() {
        let mut table = MaterializedTable::default();
        let layers = default_layers();
        assert!(!layers.contains(&Layer::Tile));
        reconcile(&mut table, &[piece("g", Layer::Tile, 0, 0)], &ids(&["g"]), &layers);
        assert!(!table.is_selected("g"));
    }

    #[test]
    fn missing_ids_are_removed_except_drag_placeholders() {
        let mut table = MaterializedTable::default();
        let layers = default_layers();
        reconcile(
            &mut table,
            &[piece("a", Layer::Token, 0, 0), piece("b", Layer::Token, 1, 0)],
            &HashSet::new(),
            &layers,
        );
        let placeholder = table.begin_drag("a").unwrap();

        let report = reconcile(&mut table, &[piece("a", Layer::Token, 0, 0)], &HashSet::new(), &layers);
        assert_eq!(report.removed, vec!["b".to_string()]);
        assert!(!table.contains("b"));
        assert!(table.contains(&placeholder));
    }

    #[test]
    fn two_clients_converge_on_latest_list() {
        let layers = default_layers();
        let older = vec![piece("a", Layer::Token, 0, 0), piece("b", Layer::Token, 1, 1)];
        let mut latest = vec![piece("a", Layer::Token, 5, 5), piece("c", Layer::Note, 2, 2)];
        latest[0].side = 1;

        let mut client_a = MaterializedTable::default();
        let mut client_b = MaterializedTable::default();
        reconcile(&mut client_a, &older, &HashSet::new(), &layers);
        reconcile(&mut client_a, &latest, &HashSet::new(), &layers);
        reconcile(&mut client_b, &latest, &HashSet::new(), &layers);

        assert_eq!(snapshot(&client_a), snapshot(&client_b));
    }
}
