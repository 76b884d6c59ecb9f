//! 编排器客户端抽象
//!
//! 所有后端（Bacalhau HTTP / 测试用 Scripted）实现 OrchestratorClient：submit、list_executions、cancel、auth_token。
//! token 由调用方（JobDispatcher）在每次提交前获取一次，然后随后续请求传入。

use async_trait::async_trait;

use crate::core::BotError;

/// 编排器返回的一条执行记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub id: String,
    /// 标准输出，可能为空
    pub stdout: String,
}

impl Execution {
    pub fn new(id: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stdout: stdout.into(),
        }
    }

    /// stdout 去掉空白后非空才算有输出
    pub fn has_output(&self) -> bool {
        !self.stdout.trim().is_empty()
    }
}

#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// 提交任务，返回 job id
    async fn submit(&self, payload: &[u8], token: Option<&str>) -> Result<String, BotError>;

    /// 查询某个任务的全部执行记录（按编排器返回顺序）
    async fn list_executions(
        &self,
        job_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<Execution>, BotError>;

    /// 取消任务，返回 evaluation id
    async fn cancel(&self, job_id: &str, reason: &str, token: Option<&str>)
        -> Result<String, BotError>;

    /// 用共享密钥换取 Bearer token（仅 secure 模式）
    async fn auth_token(&self) -> Result<String, BotError> {
        Err(BotError::Auth("auth is not configured".to_string()))
    }

    /// 是否需要先调用 auth_token
    fn requires_auth(&self) -> bool {
        false
    }
}
