//! 房间偏好（按房间 ID 存储于本地）
//!
//! - 上次使用的桌面
//! - 每张桌面的可交互图层
//! - 房间级 `touched_at`，供外部缓存清理按最近使用时间淘汰

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kv::KvStore;
use crate::error::Result;
use crate::model::{Layer, TableSlot};
use crate::sync::materialized::{default_layers, LayerSet};

const PREFS_KEY: &str = "prefs";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreferences {
    pub enabled_layers: Vec<Layer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPreferences {
    #[serde(default)]
    pub last_table: Option<TableSlot>,
    #[serde(default)]
    pub tables: BTreeMap<TableSlot, TablePreferences>,
    /// 最近一次打开房间的时间（UTC 毫秒）
    #[serde(default)]
    pub touched_at: i64,
}

impl RoomPreferences {
    pub fn layers_for(&self, slot: TableSlot) -> LayerSet {
        self.tables
            .get(&slot)
            .map(|t| t.enabled_layers.iter().copied().collect())
            .unwrap_or_else(default_layers)
    }

    pub fn set_layers(&mut self, slot: TableSlot, layers: &LayerSet) {
        self.tables.insert(
            slot,
            TablePreferences {
                enabled_layers: layers.iter().copied().collect(),
            },
        );
    }
}

/// 偏好读写（调用方负责先 `switch_room`）
pub struct PreferenceStore {
    kv: Arc<KvStore>,
}

impl PreferenceStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    pub async fn load(&self) -> Result<RoomPreferences> {
        Ok(self.kv.get(PREFS_KEY).await?.unwrap_or_default())
    }

    pub async fn save(&self, prefs: &RoomPreferences) -> Result<()> {
        self.kv.set(PREFS_KEY, prefs).await
    }

    /// 读-改-写
    pub async fn update<F>(&self, f: F) -> Result<RoomPreferences>
    where
        F: FnOnce(&mut RoomPreferences),
    {
        let mut prefs = self.load().await?;
        f(&mut prefs);
        self.save(&prefs).await?;
        debug!("房间偏好已保存: last_table={:?}", prefs.last_table);
        Ok(prefs)
    }
}
