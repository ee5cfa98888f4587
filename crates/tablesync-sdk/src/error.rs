use thiserror::Error;

/// SDK 错误
///
/// 远端错误按三类归并（见 [`ErrorKind`]）：传输/非预期状态码、资源已删除、写入过期实体。
#[derive(Debug, Error)]
pub enum TablesyncSDKError {
    #[error("Transport error: {0}")]
    Transport(String),
    /// 调用方未预期的 HTTP 状态码
    #[error("Unexpected status {status} ({context})")]
    UnexpectedStatus { status: u16, context: String },
    /// 轮询时服务端返回 404：房间或桌面已被删除
    #[error("Resource gone: {0}")]
    ResourceGone(String),
    /// 写入时服务端返回 404：目标棋子已不存在
    #[error("Stale write: {0}")]
    StaleWrite(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("KV store error: {0}")]
    KvStore(String),
    #[error("IO error: {0}")]
    IO(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    #[error("Shutting down: {0}")]
    ShuttingDown(String),
}

/// 错误分类（决定同步管线与写入网关如何传播）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 可重试：交给错误上报，下次轮询自然重试
    Transport,
    /// 终态：停止调度器，不再重试
    ResourceGone,
    /// 吞掉：只记日志，随后的对账会移除过期实体
    StaleWrite,
    /// 本地错误（参数、序列化、存储）
    Local,
}

impl TablesyncSDKError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::UnexpectedStatus { .. } => ErrorKind::Transport,
            Self::ResourceGone(_) => ErrorKind::ResourceGone,
            Self::StaleWrite(_) => ErrorKind::StaleWrite,
            _ => ErrorKind::Local,
        }
    }

    pub fn is_resource_gone(&self) -> bool {
        self.kind() == ErrorKind::ResourceGone
    }

    pub fn is_stale_write(&self) -> bool {
        self.kind() == ErrorKind::StaleWrite
    }
}

impl From<serde_json::Error> for TablesyncSDKError {
    fn from(error: serde_json::Error) -> Self {
        TablesyncSDKError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for TablesyncSDKError {
    fn from(error: std::io::Error) -> Self {
        TablesyncSDKError::IO(error.to_string())
    }
}

impl From<sled::Error> for TablesyncSDKError {
    fn from(error: sled::Error) -> Self {
        TablesyncSDKError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for TablesyncSDKError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            TablesyncSDKError::Serialization(error.to_string())
        } else {
            TablesyncSDKError::Transport(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, TablesyncSDKError>;
