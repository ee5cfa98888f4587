//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - 按房间隔离的命名空间（每个房间一个 Tree）
//! - JSON 序列化的读写
//! - 打开数据库时的锁冲突重试

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tokio::sync::RwLock;

use crate::error::{Result, TablesyncSDKError};

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    db: Arc<Db>,
    /// 房间专属的 Tree 实例
    room_trees: Arc<RwLock<HashMap<String, Tree>>>,
    current_room: Arc<RwLock<Option<String>>>,
}

fn tree_name(room_id: &str) -> String {
    format!("room_{}", room_id)
}

impl KvStore {
    pub async fn new(base_path: &Path) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| TablesyncSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 同一目录的旧实例可能刚释放锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            TablesyncSDKError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        Ok(Self {
            db: Arc::new(db),
            room_trees: Arc::new(RwLock::new(HashMap::new())),
            current_room: Arc::new(RwLock::new(None)),
        })
    }

    async fn init_room_tree(&self, room_id: &str) -> Result<()> {
        let tree = self
            .db
            .open_tree(tree_name(room_id))
            .map_err(|e| TablesyncSDKError::KvStore(format!("打开房间 Tree 失败: {}", e)))?;

        self.room_trees.write().await.insert(room_id.to_string(), tree);
        tracing::info!("房间 KV Tree 初始化完成: {}", room_id);
        Ok(())
    }

    /// 切换当前房间（Tree 不存在时先初始化）
    pub async fn switch_room(&self, room_id: &str) -> Result<()> {
        let exists = self.room_trees.read().await.contains_key(room_id);
        if !exists {
            self.init_room_tree(room_id).await?;
        }
        *self.current_room.write().await = Some(room_id.to_string());
        Ok(())
    }

    async fn get_current_tree(&self) -> Result<Tree> {
        let current_room = self.current_room.read().await;
        let room_id = current_room
            .as_ref()
            .ok_or_else(|| TablesyncSDKError::NotInitialized("未选择房间".to_string()))?;

        let room_trees = self.room_trees.read().await;
        let tree = room_trees
            .get(room_id)
            .ok_or_else(|| TablesyncSDKError::KvStore("房间 Tree 不存在".to_string()))?;
        Ok(tree.clone())
    }

    pub async fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let tree = self.get_current_tree().await?;
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| TablesyncSDKError::Serialization(format!("序列化值失败: {}", e)))?;
        tree.insert(key, value_bytes)
            .map_err(|e| TablesyncSDKError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    pub async fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let tree = self.get_current_tree().await?;
        let result = tree
            .get(key)
            .map_err(|e| TablesyncSDKError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| TablesyncSDKError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| TablesyncSDKError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn rooms_are_isolated() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::new(dir.path()).await.unwrap();

        assert!(kv.set("k", &1u32).await.is_err());

        kv.switch_room("a").await.unwrap();
        kv.set("k", &"alpha").await.unwrap();
        kv.switch_room("b").await.unwrap();
        assert_eq!(kv.get::<_, String>("k").await.unwrap(), None);
        kv.set("k", &"beta").await.unwrap();

        kv.switch_room("a").await.unwrap();
        assert_eq!(kv.get::<_, String>("k").await.unwrap().as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn flushed_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let kv = KvStore::new(dir.path()).await.unwrap();
            kv.switch_room("r").await.unwrap();
            kv.set("t:1", &10).await.unwrap();
            kv.flush().await.unwrap();
        }

        let kv = KvStore::new(dir.path()).await.unwrap();
        kv.switch_room("r").await.unwrap();
        assert_eq!(kv.get::<_, i32>("t:1").await.unwrap(), Some(10));
    }
}
