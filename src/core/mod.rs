//! 核心层：错误类型、后台任务池

pub mod error;
pub mod task_scheduler;

pub use error::BotError;
pub use task_scheduler::{TaskId, TaskPool};
