//! 统一 SDK 接口 - TablesyncSDK 主入口
//!
//! 分层架构：
//! ```text
//! TablesyncSDK (控制面)
//!   ├── KvStore / PreferenceStore (本地偏好层)
//!   ├── RemoteAuthority (HTTP 远端)
//!   ├── SyncPipeline + AdaptiveScheduler (轮询同步层)
//!   ├── MutationGateway (写入层)
//!   ├── EventManager (事件系统层)
//!   └── LifecycleManager (可见性)
//! ```
//!
//! 一个 SDK 实例对应一个房间会话；多个实例可以在同一进程内并存。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::digest::ResourceKey;
use crate::error::{Result, TablesyncSDKError};
use crate::events::{event_builders, EventFilter, EventManager, FilteredEventReceiver, SDKEvent};
use crate::lifecycle::{LifecycleManager, SchedulerVisibilityHook};
use crate::model::{Layer, Piece, PieceDraft, Room, TableSlot};
use crate::mutation::{MutationGateway, MutationOptions, MutationResult};
use crate::storage::{KvStore, PreferenceStore};
use crate::sync::{
    AdaptiveScheduler, ActivityTracker, IdleDetector, NullSurface, PieceSurface, PollPolicy, SchedulerPhase,
    SharedContext, SyncContext, SyncPipeline, SyncStats,
};
use crate::transport::{HttpAuthority, RemoteAuthority};
use crate::utils::time::{now_utc_millis, SystemClock};

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// 轮询配置（毫秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// 最短间隔
    pub floor_ms: u64,
    /// 前台上限
    pub foreground_ceiling_ms: u64,
    /// 后台上限
    pub background_ceiling_ms: u64,
    /// 最近有本地输入时的上限
    pub local_activity_ceiling_ms: u64,
    /// 远端变化后多久内保持最快轮询
    pub remote_hot_window_ms: u64,
    /// 本地输入后多久内视为活跃
    pub local_hot_window_ms: u64,
    pub foreground_growth: f64,
    pub background_growth: f64,
    /// 对称抖动比例，取值 `[0, 0.5)`
    pub jitter_ratio: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            floor_ms: 1000,
            foreground_ceiling_ms: 5000,
            background_ceiling_ms: 60000,
            local_activity_ceiling_ms: 2000,
            remote_hot_window_ms: 10000,
            local_hot_window_ms: 5000,
            foreground_growth: 1.5,
            background_growth: 1.25,
            jitter_ratio: 0.1,
        }
    }
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 事件缓冲区大小
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// Tablesync SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesyncConfig {
    /// 服务端基础 URL，例如 `https://tables.example.com/api`
    pub server_url: String,
    pub room_id: String,
    /// 以 `Authorization: Bearer` 发送
    pub auth_token: Option<String>,
    /// 本地偏好存储目录
    pub data_dir: PathBuf,
    pub http_client_config: HttpClientConfig,
    pub poll_config: PollConfig,
    /// 多久无本地输入后挂起轮询（秒）
    pub idle_timeout_secs: u64,
    pub event_config: EventConfig,
    /// 初始桌面；未指定时使用上次打开的桌面，再否则为 1
    pub initial_table: Option<u8>,
}

impl Default for TablesyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            room_id: String::new(),
            auth_token: None,
            data_dir: get_default_data_dir(),
            http_client_config: HttpClientConfig::default(),
            poll_config: PollConfig::default(),
            idle_timeout_secs: 15 * 60,
            event_config: EventConfig::default(),
            initial_table: None,
        }
    }
}

/// 获取默认数据目录 ~/.tablesync/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".tablesync")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        // Windows
        home_dir.join(".tablesync")
    } else {
        PathBuf::from("./tablesync_data")
    }
}

impl TablesyncConfig {
    pub fn builder() -> TablesyncConfigBuilder {
        TablesyncConfigBuilder::new()
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.room_id.trim().is_empty() {
            return Err(TablesyncSDKError::Config("房间 ID 不能为空".to_string()));
        }

        reqwest::Url::parse(&self.server_url)
            .map_err(|e| TablesyncSDKError::Config(format!("无效的服务端 URL {}: {}", self.server_url, e)))?;

        if self.data_dir.as_os_str().is_empty() {
            return Err(TablesyncSDKError::Config("数据目录不能为空".to_string()));
        }

        let poll = &self.poll_config;
        if poll.floor_ms == 0 {
            return Err(TablesyncSDKError::Config("轮询下限必须大于 0".to_string()));
        }
        if poll.floor_ms > poll.foreground_ceiling_ms
            || poll.floor_ms > poll.background_ceiling_ms
            || poll.floor_ms > poll.local_activity_ceiling_ms
        {
            return Err(TablesyncSDKError::Config("轮询下限不能大于任何上限".to_string()));
        }
        if !(0.0..0.5).contains(&poll.jitter_ratio) {
            return Err(TablesyncSDKError::Config(format!(
                "抖动比例必须在 [0, 0.5) 内: {}",
                poll.jitter_ratio
            )));
        }
        if poll.foreground_growth < 1.0 || poll.background_growth < 1.0 {
            return Err(TablesyncSDKError::Config("增长系数不能小于 1".to_string()));
        }

        if let Some(slot) = self.initial_table {
            TableSlot::new(slot)?;
        }

        Ok(())
    }
}

/// Tablesync SDK 配置构建器
pub struct TablesyncConfigBuilder {
    config: TablesyncConfig,
}

impl Default for TablesyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TablesyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TablesyncConfig::default(),
        }
    }

    pub fn server_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn room_id<S: Into<String>>(mut self, room_id: S) -> Self {
        self.config.room_id = room_id.into();
        self
    }

    pub fn auth_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.auth_token = Some(token.into());
        self
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn poll_config(mut self, config: PollConfig) -> Self {
        self.config.poll_config = config;
        self
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.idle_timeout_secs = secs;
        self
    }

    pub fn event_config(mut self, config: EventConfig) -> Self {
        self.config.event_config = config;
        self
    }

    pub fn initial_table(mut self, slot: u8) -> Self {
        self.config.initial_table = Some(slot);
        self
    }

    pub fn build(self) -> TablesyncConfig {
        self.config
    }
}

/// 统一 SDK 主接口
pub struct TablesyncSDK {
    config: TablesyncConfig,
    ctx: SharedContext,
    kv: Arc<KvStore>,
    prefs: PreferenceStore,
    event_manager: Arc<EventManager>,
    pipeline: Arc<SyncPipeline>,
    scheduler: AdaptiveScheduler,
    gateway: MutationGateway,
    lifecycle_manager: Arc<RwLock<LifecycleManager>>,
    shutting_down: Arc<RwLock<bool>>,
}

impl TablesyncSDK {
    /// 使用 HTTP 远端初始化
    ///
    /// 初始化只建立会话，不发请求；调用 [`start_auto_sync`](Self::start_auto_sync)
    /// 或 [`sync_now`](Self::sync_now) 开始加载。
    pub async fn initialize(config: TablesyncConfig) -> Result<Arc<Self>> {
        Self::initialize_with_surface(config, Arc::new(NullSurface)).await
    }

    /// 使用 HTTP 远端初始化，并把渲染变化交给 `surface`
    pub async fn initialize_with_surface(config: TablesyncConfig, surface: Arc<dyn PieceSurface>) -> Result<Arc<Self>> {
        config.validate()?;
        let ctx = SyncContext::new(config.room_id.clone(), TableSlot::default(), surface);
        let remote = HttpAuthority::new(
            &config.http_client_config,
            config.server_url.clone(),
            config.auth_token.as_deref(),
            ctx.session_id(),
        )?;
        Self::assemble(config, ctx, Arc::new(remote)).await
    }

    /// 使用自定义远端初始化（嵌入到其他传输层或测试）
    pub async fn initialize_with_remote(
        config: TablesyncConfig,
        remote: Arc<dyn RemoteAuthority>,
        surface: Arc<dyn PieceSurface>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let ctx = SyncContext::new(config.room_id.clone(), TableSlot::default(), surface);
        Self::assemble(config, ctx, remote).await
    }

    /// 分层初始化顺序：
    /// 1. 存储层 → 2. 同步上下文 → 3. 事件层 → 4. 调度层 → 5. 写入层 → 6. 生命周期
    async fn assemble(config: TablesyncConfig, mut ctx: SyncContext, remote: Arc<dyn RemoteAuthority>) -> Result<Arc<Self>> {
        info!("正在初始化 TablesyncSDK (room: {})...", config.room_id);

        // === 第1层：本地偏好 ===
        let kv = Arc::new(KvStore::new(&config.data_dir).await?);
        kv.switch_room(&config.room_id).await?;
        let prefs = PreferenceStore::new(kv.clone());
        let room_prefs = prefs
            .update(|p| p.touched_at = now_utc_millis())
            .await?;
        info!("✅ 房间偏好已加载 (last_table: {:?})", room_prefs.last_table);

        // === 第2层：同步上下文 ===
        let initial = match config.initial_table {
            Some(slot) => TableSlot::new(slot)?,
            None => room_prefs.last_table.unwrap_or_default(),
        };
        ctx.active_slot = initial;
        for slot in room_prefs.tables.keys() {
            ctx.set_layers(*slot, room_prefs.layers_for(*slot));
        }
        let session_id = ctx.session_id().to_string();
        let ctx = ctx.shared();

        // === 第3层：事件管理器 ===
        let event_manager = Arc::new(EventManager::new(config.event_config.buffer_size));

        // === 第4层：同步管线与调度器 ===
        let activity = Arc::new(ActivityTracker::new());
        let pipeline = Arc::new(SyncPipeline::new(
            ctx.clone(),
            remote.clone(),
            event_manager.clone(),
            activity.clone(),
            Arc::new(SystemClock),
        ));
        let scheduler = AdaptiveScheduler::new(
            pipeline.clone(),
            PollPolicy::new(config.poll_config.clone()),
            activity,
            IdleDetector::new(std::time::Duration::from_secs(config.idle_timeout_secs)),
        );
        info!("✅ 调度器初始化完成 (session: {}, table: {})", session_id, initial);

        // === 第5层：写入网关 ===
        let gateway = MutationGateway::new(ctx.clone(), remote, scheduler.clone());

        // === 第6层：生命周期管理器 ===
        let mut lifecycle = LifecycleManager::new();
        lifecycle.register_hook(Arc::new(SchedulerVisibilityHook::new(scheduler.clone())));
        let lifecycle_manager = Arc::new(RwLock::new(lifecycle));

        info!("✅ TablesyncSDK 初始化完成");
        Ok(Arc::new(Self {
            config,
            ctx,
            kv,
            prefs,
            event_manager,
            pipeline,
            scheduler,
            gateway,
            lifecycle_manager,
            shutting_down: Arc::new(RwLock::new(false)),
        }))
    }

    pub fn config(&self) -> &TablesyncConfig {
        &self.config
    }

    pub fn session_id(&self) -> String {
        self.ctx.read().session_id().to_string()
    }

    async fn check_running(&self) -> Result<()> {
        if *self.shutting_down.read().await {
            return Err(TablesyncSDKError::ShuttingDown("SDK 已关闭".to_string()));
        }
        Ok(())
    }

    // ========== 同步控制 ==========

    /// 开始自动轮询（立即执行第一次）；资源已删除后返回 `false`
    pub async fn start_auto_sync(&self) -> Result<bool> {
        self.check_running().await?;
        Ok(self.scheduler.start())
    }

    pub fn stop_auto_sync(&self) {
        self.scheduler.stop();
    }

    /// 立即同步一次；正在同步时合并到当前周期之后
    pub async fn sync_now(&self) -> Result<()> {
        self.check_running().await?;
        self.scheduler.sync_now().await;
        Ok(())
    }

    pub fn is_syncing(&self) -> bool {
        self.scheduler.is_syncing()
    }

    pub fn is_auto_sync(&self) -> bool {
        self.scheduler.is_auto()
    }

    /// 资源已删除，同步永久停止
    pub fn is_halted(&self) -> bool {
        self.scheduler.is_halted()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    /// 输入事件上报；本地输入会收紧当前轮询间隔
    pub fn touch(&self, is_local: bool) {
        self.scheduler.touch(is_local);
    }

    /// 从空闲挂起中恢复
    pub async fn resume(&self) -> Result<bool> {
        self.check_running().await?;
        let resumed = self.scheduler.resume();
        if resumed {
            info!("🔄 从空闲挂起中恢复");
            self.event_manager.emit(event_builders::sync_resumed()).await;
        }
        Ok(resumed)
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.ctx.read().stats.clone()
    }

    // ========== 可见性 ==========

    pub async fn notify_background(&self) -> Result<()> {
        self.lifecycle_manager.read().await.notify_background().await
    }

    pub async fn notify_foreground(&self) -> Result<()> {
        self.lifecycle_manager.read().await.notify_foreground().await
    }

    pub async fn register_lifecycle_hook(&self, hook: Arc<dyn crate::lifecycle::LifecycleHook>) {
        self.lifecycle_manager.write().await.register_hook(hook);
    }

    // ========== 桌面与图层 ==========

    pub fn active_table(&self) -> TableSlot {
        self.ctx.read().active_slot
    }

    pub fn room(&self) -> Option<Room> {
        self.ctx.read().room.clone()
    }

    /// 当前已渲染的棋子（绘制顺序）
    pub fn pieces(&self) -> Vec<Piece> {
        self.ctx.read().materialized.paint_order().into_iter().cloned().collect()
    }

    /// 切换桌面：有缓存时立即对账，否则拉取
    pub async fn switch_table(&self, slot: u8) -> Result<()> {
        self.check_running().await?;
        let slot = TableSlot::new(slot)?;
        if self.active_table() == slot {
            return Ok(());
        }

        let cached = self.ctx.write().switch_to(slot);
        if cached {
            debug!("桌面 {} 命中缓存", slot);
            self.event_manager.emit(event_builders::table_updated(slot)).await;
        } else {
            info!("🔄 桌面 {} 未缓存，开始拉取", slot);
            if let Err(e) = self.pipeline.fetch(ResourceKey::Table(slot)).await {
                if e.is_resource_gone() {
                    self.scheduler.halt();
                }
                return Err(e);
            }
        }

        self.prefs.update(|p| p.last_table = Some(slot)).await?;
        Ok(())
    }

    pub fn enabled_layers(&self) -> BTreeSet<Layer> {
        let ctx = self.ctx.read();
        ctx.layers_for(ctx.active_slot)
    }

    /// 当前桌面的图层是否可交互；关闭时取消该图层上的选中
    pub async fn set_layer_enabled(&self, layer: Layer, enabled: bool) -> Result<()> {
        self.check_running().await?;
        let (slot, layers) = {
            let mut ctx = self.ctx.write();
            let slot = ctx.active_slot;
            let mut layers = ctx.layers_for(slot);
            if enabled {
                layers.insert(layer);
            } else {
                layers.remove(&layer);
                let cleared = ctx.materialized.deselect_layer(layer);
                debug!("图层 {} 已关闭，取消 {} 个选中", layer, cleared);
            }
            ctx.set_layers(slot, layers.clone());
            (slot, layers)
        };
        self.prefs.update(|p| p.set_layers(slot, &layers)).await?;
        Ok(())
    }

    // ========== 选中与拖拽 ==========

    pub fn selection(&self) -> BTreeSet<String> {
        self.ctx.read().materialized.selection()
    }

    /// 设置选中；所在图层未开启时不能选中，返回是否发生变化
    pub fn set_selected(&self, id: &str, selected: bool) -> bool {
        let mut ctx = self.ctx.write();
        let slot = ctx.active_slot;
        let selectable = match ctx.materialized.get(id) {
            Some(entry) => ctx.layers_for(slot).contains(&entry.piece.layer),
            None => return false,
        };
        if selected && !selectable {
            return false;
        }
        ctx.materialized.set_selected(id, selected)
    }

    pub fn clear_selection(&self) {
        let mut ctx = self.ctx.write();
        for id in ctx.materialized.selection() {
            ctx.materialized.set_selected(&id, false);
        }
    }

    /// 拖拽开始，返回占位棋子 ID（对账不会移除占位棋子）
    pub fn begin_drag(&self, id: &str) -> Option<String> {
        self.scheduler.touch(true);
        self.ctx.write().materialized.begin_drag(id)
    }

    pub fn end_drag(&self, id: &str) {
        self.ctx.write().materialized.end_drag(id);
    }

    // ========== 写入 ==========

    /// 写入网关（旋转、翻面、批量等全部操作）
    pub fn mutations(&self) -> &MutationGateway {
        &self.gateway
    }

    pub async fn create_piece(&self, draft: PieceDraft, auto_select: bool) -> Result<MutationResult> {
        self.check_running().await?;
        let opts = MutationOptions {
            auto_select,
            ..MutationOptions::default()
        };
        self.gateway.create(draft, opts).await
    }

    pub async fn move_piece(&self, id: &str, x: i32, y: i32) -> Result<MutationResult> {
        self.check_running().await?;
        self.gateway.move_piece(id, x, y, MutationOptions::default()).await
    }

    pub async fn delete_piece(&self, id: &str) -> Result<MutationResult> {
        self.check_running().await?;
        self.gateway.delete(id, MutationOptions::default()).await
    }

    pub async fn clone_piece(&self, id: &str) -> Result<MutationResult> {
        self.check_running().await?;
        self.gateway.clone_piece(id, MutationOptions::default()).await
    }

    // ========== 事件 ==========

    pub fn subscribe(&self) -> broadcast::Receiver<SDKEvent> {
        self.event_manager.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        self.event_manager.subscribe_filtered(filter)
    }

    /// 当前桌面每次对账完成后回调
    pub async fn on_table_updated<F>(&self, callback: F)
    where
        F: Fn(TableSlot) + Send + Sync + 'static,
    {
        self.event_manager
            .add_listener("table_updated", move |event| {
                if let Some(slot) = event.slot() {
                    callback(slot);
                }
            })
            .await;
    }

    pub async fn on_room_updated<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_manager.add_listener("room_updated", move |_| callback()).await;
    }

    /// 房间或桌面被删除（终态）
    pub async fn on_resource_gone<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_manager
            .add_listener("resource_gone", move |event| {
                if let SDKEvent::ResourceGone { key, .. } = event {
                    callback(key);
                }
            })
            .await;
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.event_manager
    }

    // ========== 关闭 ==========

    /// 停止轮询并刷盘；之后所有操作返回 `ShuttingDown`
    pub async fn shutdown(&self) -> Result<()> {
        info!("正在关闭 TablesyncSDK...");
        {
            let mut shutting_down = self.shutting_down.write().await;
            *shutting_down = true;
        }

        self.scheduler.stop();
        if let Err(e) = self.kv.flush().await {
            warn!("⚠️ 刷新本地偏好失败: {}", e);
        }
        self.event_manager.clear_listeners().await;

        info!("TablesyncSDK 关闭完成");
        Ok(())
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.shutting_down.read().await
    }
}
