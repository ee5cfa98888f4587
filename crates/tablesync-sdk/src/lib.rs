//! Tablesync SDK - 共享桌游桌面的客户端状态同步核心
//!
//! 本 SDK 提供：
//! - 🔍 摘要轮询：一次轻量请求发现房间/桌面变化，只拉取变化的资源
//! - 🧩 对账：把服务端棋子列表应用到本地渲染集合，保留本地选中状态
//! - ✍️ 先写后同步：写入服务端后由下一次对账呈现确认结果
//! - ⏱️ 自适应调度：按可见性、本地输入与远端活跃度调整轮询间隔
//! - 💤 空闲挂起：长时间无操作时停止轮询，可随时恢复
//! - ⚙️ 事件系统：统一的事件管理和回调机制
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tablesync_sdk::{Layer, PieceDraft, TablesyncConfig, TablesyncSDK};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TablesyncConfig::builder()
//!         .server_url("https://tables.example.com/api")
//!         .room_id("room-42")
//!         .data_dir("/path/to/data")
//!         .build();
//!
//!     let sdk = TablesyncSDK::initialize(config).await?;
//!
//!     sdk.on_table_updated(|slot| {
//!         println!("桌面 {} 已更新", slot);
//!     })
//!     .await;
//!
//!     sdk.start_auto_sync().await?;
//!
//!     // 输入事件上报
//!     sdk.touch(true);
//!
//!     sdk.create_piece(PieceDraft::new(Layer::Token, "die", 3, 4), true).await?;
//!
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod digest;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod model;
pub mod mutation;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod utils;
pub mod version;

// 重新导出核心类型，方便使用
pub use digest::{DigestMap, Hashed, ResourceKey};
pub use error::{ErrorKind, Result, TablesyncSDKError};
pub use events::{EventFilter, EventManager, SDKEvent};
pub use lifecycle::{LifecycleHook, LifecycleManager};
pub use model::{AssetDef, Layer, Piece, PieceDraft, PieceFlags, Room, RoomSetup, TableSlot, MAX_TABLES};
pub use mutation::{MutationGateway, MutationOptions, MutationResult, PieceEdit, PiecePatch};
pub use sdk::{EventConfig, HttpClientConfig, PollConfig, TablesyncConfig, TablesyncConfigBuilder, TablesyncSDK};
pub use sync::{CycleOutcome, PieceSurface, SchedulerPhase, SyncStats};
pub use transport::{HttpAuthority, PatchPayload, RemoteAuthority};
pub use version::{BUILD_TIME, GIT_SHA, SDK_VERSION};
