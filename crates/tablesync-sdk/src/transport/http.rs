//! 基于 reqwest 的远端权威服务实现
//!
//! 路由：
//! - `GET    {base}/api/rooms/{room}/digest`
//! - `GET    {base}/api/rooms/{room}`
//! - `GET    {base}/api/rooms/{room}/tables/{slot}`
//! - `PUT    {base}/api/rooms/{room}/tables/{slot}`
//! - `POST | PATCH | DELETE {base}/api/rooms/{room}/tables/{slot}/pieces`
//!
//! 房间与桌面响应的哈希取自 `ETag` 响应头。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, ETAG, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{PatchPayload, RemoteAuthority};
use crate::digest::{DigestMap, Hashed, ResourceKey};
use crate::error::{Result, TablesyncSDKError};
use crate::model::{Piece, PieceDraft, Room, TableSlot};
use crate::sdk::HttpClientConfig;
use crate::version;

/// 客户端会话标识头，服务端可据此忽略本会话自己的写入回声
const SESSION_HEADER: &str = "X-Tablesync-Session";

#[derive(Serialize)]
struct DeleteBody<'a> {
    ids: &'a [String],
}

/// HTTP 远端
pub struct HttpAuthority {
    client: Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(
        config: &HttpClientConfig,
        base_url: impl Into<String>,
        auth_token: Option<&str>,
        session_id: &str,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TablesyncSDKError::Config(format!("无效的 auth_token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        let session = HeaderValue::from_str(session_id)
            .map_err(|e| TablesyncSDKError::Config(format!("无效的 session_id: {}", e)))?;
        headers.insert(SESSION_HEADER, session);
        let agent = HeaderValue::from_str(&version::user_agent())
            .map_err(|e| TablesyncSDKError::Config(format!("无效的 User-Agent: {}", e)))?;
        headers.insert(USER_AGENT, agent);

        let mut builder = Client::builder().default_headers(headers);

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| TablesyncSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("✅ HTTP 远端已创建 (base_url: {})", base_url);

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn room_url(&self, room_id: &str) -> String {
        format!("{}/api/rooms/{}", self.base_url, room_id)
    }

    fn table_url(&self, room_id: &str, slot: TableSlot) -> String {
        format!("{}/tables/{}", self.room_url(room_id), slot.get())
    }

    fn pieces_url(&self, room_id: &str, slot: TableSlot) -> String {
        format!("{}/pieces", self.table_url(room_id, slot))
    }

    /// 轮询类请求：404 表示资源已被删除
    async fn send_read(&self, request: RequestBuilder, key: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| TablesyncSDKError::Transport(format!("请求 {} 失败: {}", key, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            warn!("⚠️ 资源已不存在: {}", key);
            return Err(TablesyncSDKError::ResourceGone(key.to_string()));
        }
        error!("❌ 读取 {} 失败，HTTP 状态码: {}", key, status);
        Err(TablesyncSDKError::UnexpectedStatus {
            status: status.as_u16(),
            context: format!("GET {}", key),
        })
    }

    /// 写入类请求：404 表示目标已被他人删除
    async fn send_write(&self, method: Method, url: String, body: &impl Serialize, context: &str) -> Result<Response> {
        let response = self
            .client
            .request(method.clone(), &url)
            .json(body)
            .send()
            .await
            .map_err(|e| TablesyncSDKError::Transport(format!("{} 失败: {}", context, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TablesyncSDKError::StaleWrite(context.to_string()));
        }
        let error_text = response.text().await.unwrap_or_default();
        error!("❌ {} 失败，HTTP 状态码: {}, 错误: {}", context, status, error_text);
        Err(TablesyncSDKError::UnexpectedStatus {
            status: status.as_u16(),
            context: format!("{} {}", method, context),
        })
    }

    async fn read_hashed<T: DeserializeOwned>(&self, url: String, key: ResourceKey) -> Result<Hashed<T>> {
        let key = key.as_string();
        let response = self.send_read(self.client.get(&url), &key).await?;
        let hash = response_hash(&response).ok_or_else(|| {
            TablesyncSDKError::Serialization(format!("{} 响应缺少 ETag", key))
        })?;
        let value: T = response.json().await?;
        debug!("拉取 {} 完成 (hash: {})", key, hash);
        Ok(Hashed::new(hash, value))
    }
}

/// 取 ETag 作为资源哈希，去掉弱校验前缀与引号
fn response_hash(response: &Response) -> Option<String> {
    let raw = response.headers().get(ETAG)?.to_str().ok()?;
    let hash = raw.trim().trim_start_matches("W/").trim_matches('"');
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_string())
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn fetch_digests(&self, room_id: &str) -> Result<DigestMap> {
        let url = format!("{}/digest", self.room_url(room_id));
        let response = self.send_read(self.client.get(&url), "digest").await?;
        Ok(response.json().await?)
    }

    async fn fetch_room(&self, room_id: &str) -> Result<Hashed<Room>> {
        self.read_hashed(self.room_url(room_id), ResourceKey::Room).await
    }

    async fn fetch_table(&self, room_id: &str, slot: TableSlot) -> Result<Hashed<Vec<Piece>>> {
        self.read_hashed(self.table_url(room_id, slot), ResourceKey::Table(slot)).await
    }

    async fn create_pieces(&self, room_id: &str, slot: TableSlot, drafts: &[PieceDraft]) -> Result<Vec<Piece>> {
        let context = format!("创建 {} 个棋子 (桌面 {})", drafts.len(), slot);
        let response = self
            .send_write(Method::POST, self.pieces_url(room_id, slot), &drafts, &context)
            .await?;
        Ok(response.json().await?)
    }

    async fn patch_pieces(&self, room_id: &str, slot: TableSlot, patches: &[PatchPayload]) -> Result<Vec<Piece>> {
        let context = format!("更新 {} 个棋子 (桌面 {})", patches.len(), slot);
        let response = self
            .send_write(Method::PATCH, self.pieces_url(room_id, slot), &patches, &context)
            .await?;
        Ok(response.json().await?)
    }

    async fn delete_pieces(&self, room_id: &str, slot: TableSlot, ids: &[String]) -> Result<()> {
        let context = format!("删除 {} 个棋子 (桌面 {})", ids.len(), slot);
        self.send_write(Method::DELETE, self.pieces_url(room_id, slot), &DeleteBody { ids }, &context)
            .await?;
        Ok(())
    }

    async fn replace_table(&self, room_id: &str, slot: TableSlot, pieces: &[Piece]) -> Result<Vec<Piece>> {
        let context = format!("替换桌面 {} ({} 个棋子)", slot, pieces.len());
        let response = self
            .send_write(Method::PUT, self.table_url(room_id, slot), &pieces, &context)
            .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> HttpAuthority {
        HttpAuthority::new(&HttpClientConfig::default(), "https://tables.example.com/", Some("tok"), "s-1").unwrap()
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let http = authority();
        let slot = TableSlot::new(4).unwrap();
        assert_eq!(http.base_url(), "https://tables.example.com");
        assert_eq!(http.room_url("r1"), "https://tables.example.com/api/rooms/r1");
        assert_eq!(http.table_url("r1", slot), "https://tables.example.com/api/rooms/r1/tables/4");
        assert_eq!(http.pieces_url("r1", slot), "https://tables.example.com/api/rooms/r1/tables/4/pieces");
    }

    #[test]
    fn rejects_token_with_control_characters() {
        let result = HttpAuthority::new(&HttpClientConfig::default(), "http://x", Some("bad\ntoken"), "s-1");
        assert!(matches!(result, Err(TablesyncSDKError::Config(_))));
    }
}
