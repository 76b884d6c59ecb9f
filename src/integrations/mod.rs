//! 外部集成：Bluesky、对象存储、Gancho 短链（均为薄 HTTP 客户端）

pub mod bluesky;
pub mod shortener;
pub mod storage;

pub use bluesky::{BlueskyClient, Notification};
pub use shortener::Shortener;
pub use storage::ObjectStore;
