//! 本地持久化：sled 键值存储与房间偏好

pub mod kv;
pub mod prefs;

pub use kv::KvStore;
pub use prefs::{PreferenceStore, RoomPreferences, TablePreferences};
