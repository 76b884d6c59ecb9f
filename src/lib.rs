//! BBB - Bacalhau Bluesky Bot
//!
//! 监听 Bluesky 上对机器人账号的 mention，识别指令，提交 Bacalhau 任务并把结果回复给用户。
//!
//! 模块划分：
//! - **bot**: 通知循环（组件构建、单条 mention 处理、账号轮询）
//! - **command**: Mention 类型与指令识别（CommandRecognizer）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、任务池
//! - **dispatch**: 任务提交 / 轮询 / 取消（JobDispatcher）
//! - **integrations**: Bluesky、对象存储、短链客户端
//! - **ledger**: 已回复记录
//! - **orchestrator**: Bacalhau 客户端抽象、任务模板、任务文件
//! - **reply**: 回复文本（ResponseComposer）
//! - **server**: 健康检查与结果页（feature `web`）

pub mod bot;
pub mod command;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod integrations;
pub mod ledger;
pub mod observability;
pub mod orchestrator;
pub mod reply;
#[cfg(feature = "web")]
pub mod server;

pub use command::{Command, CommandKind, CommandRecognizer, Mention};
pub use dispatch::{JobDispatcher, JobOutcome, JobSubmission};
pub use reply::ResponseComposer;
