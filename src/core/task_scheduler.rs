//! 任务池：每条 mention 一个后台任务，Semaphore 限制同时运行的数量
//!
//! spawn 后不等待结果（fire-and-forget）；许可在任务内部获取，因此 spawn 本身不会阻塞轮询循环。

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

/// 任务 ID（仅用于日志）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskId {
    pub fn new() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// 有界任务池
#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
}

impl TaskPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// 启动后台任务，超过并发上限时在任务内排队
    pub fn spawn<F>(&self, label: &str, fut: F) -> TaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = TaskId::new();
        let permits = Arc::clone(&self.permits);
        let label = label.to_string();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!("{} ({}) dropped: task pool closed", id, label);
                return;
            };
            tracing::debug!("{} started: {}", id, label);
            fut.await;
            tracing::debug!("{} finished: {}", id, label);
        });
        id
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new(16)
    }
}
