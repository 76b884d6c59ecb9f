//! 通知循环：把 Bluesky mention 变成 Bacalhau 任务再变成回复
//!
//! - **components**: 启动时一次性构建、所有账号共享的组件
//! - **handler**: 单条 mention 的完整处理流程
//! - **runner**: 每个账号的轮询循环与过滤规则

pub mod components;
pub mod handler;
pub mod runner;

pub use components::{create_bot_components, BotComponents};
pub use handler::{handle_mention, SocialClient};
pub use runner::{is_eligible, AccountRunner, NotificationSource, MAX_BACKOFF};
