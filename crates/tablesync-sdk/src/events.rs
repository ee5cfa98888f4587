//! 事件系统模块
//!
//! 同步核心通过 [`EventManager`] 向 UI 层通知：
//! - 当前桌面对账完成（`TableUpdated`）
//! - 房间元数据变化（`RoomUpdated`）
//! - 房间/桌面已被删除（`ResourceGone`，终态）
//! - 空闲挂起与恢复
//! - 可重试的同步错误（交给通用错误上报）

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::model::TableSlot;
use crate::utils::time::now_utc_millis;

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SDKEvent {
    /// 当前桌面完成一次对账
    TableUpdated {
        slot: TableSlot,
        timestamp: i64,
    },
    /// 房间元数据已更新
    RoomUpdated {
        timestamp: i64,
    },
    /// 资源已被服务端删除，自动同步永久停止
    ResourceGone {
        key: String,
        timestamp: i64,
    },
    /// 长时间无本地操作，轮询已挂起
    SyncSuspended {
        idle_ms: u64,
        timestamp: i64,
    },
    /// 从挂起中恢复
    SyncResumed {
        timestamp: i64,
    },
    /// 可重试的同步错误（下一次轮询会自动重试）
    SyncError {
        message: String,
        timestamp: i64,
    },
}

impl SDKEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SDKEvent::TableUpdated { .. } => "table_updated",
            SDKEvent::RoomUpdated { .. } => "room_updated",
            SDKEvent::ResourceGone { .. } => "resource_gone",
            SDKEvent::SyncSuspended { .. } => "sync_suspended",
            SDKEvent::SyncResumed { .. } => "sync_resumed",
            SDKEvent::SyncError { .. } => "sync_error",
        }
    }

    /// 获取事件关联的桌面
    pub fn slot(&self) -> Option<TableSlot> {
        match self {
            SDKEvent::TableUpdated { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// 获取事件时间戳（UTC 毫秒）
    pub fn timestamp(&self) -> i64 {
        match self {
            SDKEvent::TableUpdated { timestamp, .. }
            | SDKEvent::RoomUpdated { timestamp }
            | SDKEvent::ResourceGone { timestamp, .. }
            | SDKEvent::SyncSuspended { timestamp, .. }
            | SDKEvent::SyncResumed { timestamp }
            | SDKEvent::SyncError { timestamp, .. } => *timestamp,
        }
    }

    /// 是否为终态事件
    pub fn is_terminal(&self) -> bool {
        matches!(self, SDKEvent::ResourceGone { .. })
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件类型过滤器
    pub event_types: Option<Vec<String>>,
    /// 桌面过滤器
    pub slots: Option<Vec<TableSlot>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn with_slots(mut self, slots: Vec<TableSlot>) -> Self {
        self.slots = Some(slots);
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &SDKEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        if let Some(ref slots) = self.slots {
            match event.slot() {
                Some(slot) if slots.contains(&slot) => {}
                _ => return false, // 事件没有桌面信息但过滤器要求有
            }
        }

        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SDKEvent) + Send + Sync>;

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SDKEvent>,
    /// 事件监听器映射
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    /// 事件统计
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<i64>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SDKEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景（无 UI 的客户端），仅打 debug
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }

        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SDKEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器，`"*"` 监听全部事件
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SDKEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners.entry(event_type.to_string()).or_insert_with(Vec::new).push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub async fn clear_listeners(&self) {
        let mut listeners = self.listeners.write().await;
        listeners.clear();

        let mut stats = self.stats.write().await;
        stats.listener_count = 0;

        info!("Cleared all event listeners");
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 过滤事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<SDKEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<SDKEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<SDKEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 尝试接收事件（非阻塞）
    pub fn try_recv(&mut self) -> Result<SDKEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// 事件生成器 - 辅助函数
pub mod event_builders {
    use super::*;

    pub fn table_updated(slot: TableSlot) -> SDKEvent {
        SDKEvent::TableUpdated {
            slot,
            timestamp: now_utc_millis(),
        }
    }

    pub fn room_updated() -> SDKEvent {
        SDKEvent::RoomUpdated {
            timestamp: now_utc_millis(),
        }
    }

    pub fn resource_gone(key: impl Into<String>) -> SDKEvent {
        SDKEvent::ResourceGone {
            key: key.into(),
            timestamp: now_utc_millis(),
        }
    }

    pub fn sync_suspended(idle_ms: u64) -> SDKEvent {
        SDKEvent::SyncSuspended {
            idle_ms,
            timestamp: now_utc_millis(),
        }
    }

    pub fn sync_resumed() -> SDKEvent {
        SDKEvent::SyncResumed {
            timestamp: now_utc_millis(),
        }
    }

    pub fn sync_error(message: impl Into<String>) -> SDKEvent {
        SDKEvent::SyncError {
            message: message.into(),
            timestamp: now_utc_millis(),
        }
    }
}
