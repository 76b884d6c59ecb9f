//! 一次分发的输入与输出：JobSubmission、WaitPolicy、JobOutcome

use std::collections::HashMap;

use crate::command::CommandKind;
use crate::config::OrchestratorSection;

/// 提交给编排器的任务；一次分发期间由 JobDispatcher 独占，产出结果后丢弃
#[derive(Debug, Clone)]
pub struct JobSubmission {
    /// 序列化后的任务 JSON（`{"Job": {...}}`）
    pub payload: Vec<u8>,
    /// 首次查询前的等待秒数，也是轮询间隔
    pub wait_secs: u64,
    /// 放弃后取消任务前是否先等待宽限期
    pub graceful_stop: bool,
    pub kind: CommandKind,
}

/// 等待窗口：默认值 + 按指令名覆盖
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub default_secs: u64,
    pub overrides: HashMap<String, u64>,
}

impl WaitPolicy {
    pub fn new(default_secs: u64) -> Self {
        Self {
            default_secs,
            overrides: HashMap::new(),
        }
    }

    pub fn from_section(section: &OrchestratorSection) -> Self {
        Self {
            default_secs: section.wait_secs,
            overrides: section.wait_overrides.clone(),
        }
    }

    pub fn wait_for(&self, kind: CommandKind) -> u64 {
        self.overrides
            .get(kind.name())
            .copied()
            .unwrap_or(self.default_secs)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(30)
    }
}

/// 分发的终态，只被 ResponseComposer 消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        job_id: String,
        execution_id: String,
        stdout: String,
    },
    /// 重试用尽仍无输出
    NoResultYet { job_id: String },
    /// 提交失败（含 token 获取失败、模板构建失败）
    SubmissionFailed { reason: String },
}

impl JobOutcome {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobOutcome::Succeeded { job_id, .. } | JobOutcome::NoResultYet { job_id } => {
                Some(job_id)
            }
            JobOutcome::SubmissionFailed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}
