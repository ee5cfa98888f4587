//! SDK 版本与运行时元信息
//!
//! - **SDK Version** → Cargo.toml（唯一权威源）
//! - **Runtime Metadata** → 本模块（由 vergen 在 build.rs 中生成）

/// SDK semver，来自 Cargo.toml
///
/// 禁止手写版本号，必须用 `env!("CARGO_PKG_VERSION")` 与 Cargo.toml 保持同步。
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// git commit（短 SHA）
pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");

/// build time
pub const BUILD_TIME: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// HTTP 请求使用的 User-Agent，形如 `tablesync-sdk/0.1.0 (abc1234)`
pub fn user_agent() -> String {
    format!("tablesync-sdk/{} ({})", SDK_VERSION, GIT_SHA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_version() {
        let ua = user_agent();
        assert!(ua.starts_with("tablesync-sdk/"));
        assert!(ua.contains(SDK_VERSION));
    }
}
