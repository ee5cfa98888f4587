//! 观察一个房间的同步过程
//!
//! 用法：
//! ```text
//! TABLESYNC_SERVER=http://127.0.0.1:8080/api TABLESYNC_ROOM=room-42 cargo run --example watch_room
//! ```
//!
//! 演示流程：
//! 1. 初始化 SDK，开启自动轮询
//! 2. 打印每次对账后的棋子数量与同步统计
//! 3. 模拟一次切到后台再回到前台
//! 4. Ctrl-C 退出

use std::path::PathBuf;
use std::time::Duration;

use tablesync_sdk::events::EventFilter;
use tablesync_sdk::{Result, SDKEvent, TablesyncConfig, TablesyncSDK};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    info!("🚀 Tablesync 房间观察示例");

    let server = std::env::var("TABLESYNC_SERVER").unwrap_or_else(|_| "http://127.0.0.1:8080/api".to_string());
    let room = std::env::var("TABLESYNC_ROOM").unwrap_or_else(|_| "demo".to_string());

    let mut builder = TablesyncConfig::builder()
        .server_url(server)
        .room_id(room)
        .data_dir(PathBuf::from("/tmp/tablesync_watch_demo"));
    if let Ok(token) = std::env::var("TABLESYNC_TOKEN") {
        builder = builder.auth_token(token);
    }
    let sdk = TablesyncSDK::initialize(builder.build()).await?;

    let mut events = sdk.subscribe_filtered(EventFilter::new().with_event_types(vec![
        "table_updated".to_string(),
        "room_updated".to_string(),
        "resource_gone".to_string(),
        "sync_suspended".to_string(),
    ]));

    sdk.start_auto_sync().await?;

    // 模拟页面切到后台再回到前台
    let lifecycle_sdk = sdk.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        if let Err(e) = lifecycle_sdk.notify_background().await {
            warn!("切到后台失败: {}", e);
        }
        tokio::time::sleep(Duration::from_secs(20)).await;
        if let Err(e) = lifecycle_sdk.notify_foreground().await {
            warn!("回到前台失败: {}", e);
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl-C，退出");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(SDKEvent::TableUpdated { slot, .. }) => {
                        info!("🧩 桌面 {} 已对账: {} 个棋子, 统计 {:?}", slot, sdk.pieces().len(), sdk.sync_stats());
                    }
                    Ok(SDKEvent::RoomUpdated { .. }) => {
                        if let Some(room) = sdk.room() {
                            info!("🏠 房间: {} (素材 {} 个)", room.name, room.library.len());
                        }
                    }
                    Ok(SDKEvent::ResourceGone { key, .. }) => {
                        error!("❌ {} 已被删除，停止观察", key);
                        break;
                    }
                    Ok(SDKEvent::SyncSuspended { idle_ms, .. }) => {
                        info!("💤 {} 秒无操作，恢复轮询", idle_ms / 1000);
                        sdk.resume().await?;
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                    Err(e) => {
                        warn!("事件接收失败: {}", e);
                    }
                }
            }
        }
    }

    sdk.shutdown().await?;
    Ok(())
}
