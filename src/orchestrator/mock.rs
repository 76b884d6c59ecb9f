//! Scripted 编排器（用于测试，无需 Bacalhau）
//!
//! 提交结果与每次轮询的返回值都预先写好；记录每类调用的次数，便于断言重试与取消行为。
//! 轮询脚本耗尽后一律返回空列表（“尚无结果”）。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::BotError;
use crate::orchestrator::{Execution, OrchestratorClient};

/// 单次轮询的脚本
#[derive(Debug, Clone)]
pub enum PollScript {
    Executions(Vec<Execution>),
    /// 模拟非 2xx
    Status(u16),
    /// 模拟网络错误
    Transport,
}

#[derive(Debug)]
enum SubmitScript {
    JobId(String),
    Status(u16),
    MissingJobId,
}

#[derive(Debug)]
pub struct ScriptedOrchestrator {
    submit: SubmitScript,
    polls: Mutex<VecDeque<PollScript>>,
    secure: bool,
    token_fails: bool,
    cancel_fails: bool,
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    cancel_reasons: Mutex<Vec<String>>,
    tokens_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedOrchestrator {
    /// 提交成功并返回给定 job id
    pub fn new(job_id: impl Into<String>) -> Self {
        Self::with_submit(SubmitScript::JobId(job_id.into()))
    }

    /// 提交返回非 2xx
    pub fn failing_submit(status: u16) -> Self {
        Self::with_submit(SubmitScript::Status(status))
    }

    /// 提交返回 2xx 但没有 JobID
    pub fn missing_job_id() -> Self {
        Self::with_submit(SubmitScript::MissingJobId)
    }

    fn with_submit(submit: SubmitScript) -> Self {
        Self {
            submit,
            polls: Mutex::new(VecDeque::new()),
            secure: false,
            token_fails: false,
            cancel_fails: false,
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            cancel_reasons: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次轮询的返回
    pub fn then_poll(self, script: PollScript) -> Self {
        self.polls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(script);
        self
    }

    /// 追加一次返回空列表的轮询
    pub fn then_not_ready(self) -> Self {
        self.then_poll(PollScript::Executions(Vec::new()))
    }

    /// secure 模式；token_fails 为 true 时 auth_token 失败
    pub fn secure(mut self, token_fails: bool) -> Self {
        self.secure = true;
        self.token_fails = token_fails;
        self
    }

    pub fn cancel_fails(mut self) -> Self {
        self.cancel_fails = true;
        self
    }

    pub fn cancel_reasons(&self) -> Vec<String> {
        self.cancel_reasons
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// 每次 submit / list_executions / cancel 收到的 token
    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn see_token(&self, token: Option<&str>) {
        self.tokens_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(token.map(str::to_string));
    }
}

#[async_trait]
impl OrchestratorClient for ScriptedOrchestrator {
    async fn submit(&self, _payload: &[u8], token: Option<&str>) -> Result<String, BotError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.see_token(token);
        match &self.submit {
            SubmitScript::JobId(id) => Ok(id.clone()),
            SubmitScript::Status(status) => Err(BotError::Status {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            SubmitScript::MissingJobId => Err(BotError::MissingField("JobID")),
        }
    }

    async fn list_executions(
        &self,
        _job_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<Execution>, BotError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.see_token(token);
        let next = self
            .polls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match next {
            None => Ok(Vec::new()),
            Some(PollScript::Executions(items)) => Ok(items),
            Some(PollScript::Status(status)) => Err(BotError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            Some(PollScript::Transport) => Err(BotError::Transport("connection reset".to_string())),
        }
    }

    async fn cancel(
        &self,
        job_id: &str,
        reason: &str,
        token: Option<&str>,
    ) -> Result<String, BotError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.see_token(token);
        self.cancel_reasons
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(reason.to_string());
        if self.cancel_fails {
            return Err(BotError::Transport("cancel refused".to_string()));
        }
        Ok(format!("eval-{job_id}"))
    }

    async fn auth_token(&self) -> Result<String, BotError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.token_fails {
            return Err(BotError::Auth("bad secret".to_string()));
        }
        Ok("scripted-token".to_string())
    }

    fn requires_auth(&self) -> bool {
        self.secure
    }
}
