//! 摘要表（Digest Map）
//!
//! 服务端为每个资源维护一个短哈希：`room.json` 以及 `tables/1.json` … `tables/9.json`。
//! 两端哈希相同即视为内容相同；哈希碰撞导致的漏检会在下一次内容变化时自愈。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::model::TableSlot;

const ROOM_KEY: &str = "room.json";

/// 资源键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    Room,
    Table(TableSlot),
}

impl ResourceKey {
    pub fn as_string(self) -> String {
        match self {
            Self::Room => ROOM_KEY.to_string(),
            Self::Table(slot) => format!("tables/{}.json", slot.get()),
        }
    }

    pub fn table_slot(self) -> Option<TableSlot> {
        match self {
            Self::Room => None,
            Self::Table(slot) => Some(slot),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOM_KEY {
            return Ok(Self::Room);
        }
        let slot = s
            .strip_prefix("tables/")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|n| n.parse::<u8>().ok())
            .ok_or(())?;
        TableSlot::new(slot).map(Self::Table).map_err(|_| ())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// 资源键 → 哈希
///
/// 线格式为 `{"room.json": "..", "tables/1.json": ".."}`，无法识别的键被忽略。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestMap {
    entries: BTreeMap<ResourceKey, String>,
}

impl DigestMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: ResourceKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn set(&mut self, key: ResourceKey, hash: impl Into<String>) {
        self.entries.insert(key, hash.into());
    }

    pub fn remove(&mut self, key: ResourceKey) -> Option<String> {
        self.entries.remove(&key)
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// 与服务端摘要比较某个键是否不一致
    ///
    /// 本地有、服务端没有也算不一致（资源可能已被删除）。
    pub fn differs(&self, remote: &DigestMap, key: ResourceKey) -> bool {
        match (self.get(key), remote.get(key)) {
            (Some(local), Some(server)) => local != server,
            (None, Some(_)) => true,
            (Some(_), None) => true,
            (None, None) => false,
        }
    }
}

impl Serialize for DigestMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw: BTreeMap<String, &str> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_string(), v.as_str()))
            .collect();
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DigestMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let entries = raw
            .into_iter()
            .filter_map(|(k, v)| k.parse::<ResourceKey>().ok().map(|key| (key, v)))
            .collect();
        Ok(Self { entries })
    }
}

/// 带响应级哈希的资源，哈希与摘要表中对应条目相同
#[derive(Debug, Clone, PartialEq)]
pub struct Hashed<T> {
    pub hash: String,
    pub value: T,
}

impl<T> Hashed<T> {
    pub fn new(hash: impl Into<String>, value: T) -> Self {
        Self { hash: hash.into(), value }
    }
}
