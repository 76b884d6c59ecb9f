//! 任务分发状态机
//!
//! Submitting → AwaitingFirstWindow → Polling →（NoResultYet 时）PostFailureCleanup
//!
//! - 提交失败（网络 / 非 2xx / 无 JobID / token 获取失败）直接终止为 SubmissionFailed，不重试
//! - 先等待一个窗口，之后最多查询 MAX_POLL_ATTEMPTS 次，两次查询之间同样等待一个窗口（最后一次之后不再等待）
//! - 查询出错或没有带输出的执行记录都视为“尚未就绪”；有多条带输出的记录时取列表中最后一条
//! - 用尽次数后返回 NoResultYet，并在后台发出一次取消请求；取消失败只记录日志
//!
//! 分发一旦开始无法从外部中止。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::OrchestratorConfig;
use crate::core::BotError;
use crate::dispatch::{JobOutcome, JobSubmission};
use crate::orchestrator::{Execution, HttpOrchestrator, OrchestratorClient};

/// 查询次数上限，与等待窗口长度无关
pub const MAX_POLL_ATTEMPTS: usize = 5;

/// graceful_stop 时取消前的宽限期
pub const CANCEL_GRACE: Duration = Duration::from_secs(40);

pub const CANCEL_REASON: &str =
    "Job was cancelled by the bot after no results were returned in time";

#[derive(Clone)]
pub struct JobDispatcher {
    client: Arc<dyn OrchestratorClient>,
}

impl JobDispatcher {
    pub fn new(client: Arc<dyn OrchestratorClient>) -> Self {
        Self { client }
    }

    /// 用校验后的配置构造 Bacalhau HTTP 客户端
    pub fn from_config(cfg: OrchestratorConfig) -> Result<Self, BotError> {
        Ok(Self::new(Arc::new(HttpOrchestrator::new(cfg)?)))
    }

    pub fn client(&self) -> Arc<dyn OrchestratorClient> {
        Arc::clone(&self.client)
    }

    /// 分发一个任务直到终态；取消请求在后台进行，不等待
    pub async fn dispatch(&self, submission: JobSubmission) -> JobOutcome {
        let (outcome, _cleanup) = self.dispatch_with_cleanup(submission).await;
        outcome
    }

    /// 同 dispatch，另外返回后台取消任务的句柄（仅 NoResultYet 时存在）
    pub async fn dispatch_with_cleanup(
        &self,
        submission: JobSubmission,
    ) -> (JobOutcome, Option<JoinHandle<()>>) {
        let kind = submission.kind;

        let token = if self.client.requires_auth() {
            match self.client.auth_token().await {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("[{}] could not obtain orchestrator token: {}", kind, e);
                    return (
                        JobOutcome::SubmissionFailed {
                            reason: e.to_string(),
                        },
                        None,
                    );
                }
            }
        } else {
            None
        };

        let job_id = match self.client.submit(&submission.payload, token.as_deref()).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("[{}] job submission failed: {}", kind, e);
                return (
                    JobOutcome::SubmissionFailed {
                        reason: e.to_string(),
                    },
                    None,
                );
            }
        };
        tracing::info!("[{}] submitted job {}", kind, job_id);

        let window = Duration::from_secs(submission.wait_secs);
        match self.await_result(&job_id, window, token.as_deref()).await {
            Some(exec) => {
                tracing::info!("[{}] job {} produced output in execution {}", kind, job_id, exec.id);
                (
                    JobOutcome::Succeeded {
                        job_id,
                        execution_id: exec.id,
                        stdout: exec.stdout,
                    },
                    None,
                )
            }
            None => {
                tracing::info!(
                    "[{}] job {} has no results after {} attempts, giving up",
                    kind,
                    job_id,
                    MAX_POLL_ATTEMPTS
                );
                let cleanup = self.spawn_cancel(job_id.clone(), submission.graceful_stop, token);
                (JobOutcome::NoResultYet { job_id }, Some(cleanup))
            }
        }
    }

    async fn await_result(
        &self,
        job_id: &str,
        window: Duration,
        token: Option<&str>,
    ) -> Option<Execution> {
        tokio::time::sleep(window).await;

        for attempt in 1..=MAX_POLL_ATTEMPTS {
            match self.client.list_executions(job_id, token).await {
                Ok(executions) => {
                    if let Some(exec) = last_with_output(executions) {
                        return Some(exec);
                    }
                    tracing::debug!("job {} not ready (attempt {}/{})", job_id, attempt, MAX_POLL_ATTEMPTS);
                }
                Err(e) => {
                    tracing::warn!(
                        "job {} result query failed (attempt {}/{}): {}",
                        job_id,
                        attempt,
                        MAX_POLL_ATTEMPTS,
                        e
                    );
                }
            }
            if attempt < MAX_POLL_ATTEMPTS {
                tokio::time::sleep(window).await;
            }
        }
        None
    }

    fn spawn_cancel(&self, job_id: String, graceful: bool, token: Option<String>) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            if graceful {
                tokio::time::sleep(CANCEL_GRACE).await;
            }
            match client.cancel(&job_id, CANCEL_REASON, token.as_deref()).await {
                Ok(eval) => tracing::info!("cancelled job {} (evaluation {})", job_id, eval),
                Err(e) => tracing::error!("could not cancel job {}: {}", job_id, e),
            }
        })
    }
}

/// 列表中最后一条有输出的执行记录（只有空白的 stdout 不算）
fn last_with_output(executions: Vec<Execution>) -> Option<Execution> {
    executions.into_iter().rev().find(Execution::has_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use tokio::time::Instant;

    use crate::command::CommandKind;
    use crate::orchestrator::{PollScript, ScriptedOrchestrator};

    const WINDOW: u64 = 30;

    fn submission(graceful_stop: bool) -> JobSubmission {
        JobSubmission {
            payload: br#"{"Job":{}}"#.to_vec(),
            wait_secs: WINDOW,
            graceful_stop,
            kind: CommandKind::RunJobFile,
        }
    }

    fn windows(n: u64) -> Duration {
        Duration::from_secs(WINDOW * n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_poll() {
        let orch = Arc::new(
            ScriptedOrchestrator::new("j-1")
                .then_not_ready()
                .then_poll(PollScript::Executions(vec![Execution::new("e-0", "")]))
                .then_poll(PollScript::Executions(vec![Execution::new("e-3", "hotdog")])),
        );
        let dispatcher = JobDispatcher::new(orch.clone());

        let start = Instant::now();
        let outcome = dispatcher.dispatch(submission(false)).await;
        let elapsed = start.elapsed();

        assert_eq!(
            outcome,
            JobOutcome::Succeeded {
                job_id: "j-1".to_string(),
                execution_id: "e-3".to_string(),
                stdout: "hotdog".to_string(),
            }
        );
        assert_eq!(orch.poll_calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= windows(3) && elapsed < windows(4), "{elapsed:?}");
        assert_eq!(orch.cancel_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_picks_last_execution_with_output() {
        let orch = Arc::new(ScriptedOrchestrator::new("j-1").then_poll(PollScript::Executions(vec![
            Execution::new("e-1", "first"),
            Execution::new("e-2", "second"),
            Execution::new("e-3", ""),
        ])));
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;
        match outcome {
            JobOutcome::Succeeded { execution_id, stdout, .. } => {
                assert_eq!(execution_id, "e-2");
                assert_eq!(stdout, "second");
            }
            other => panic!("Expected Succeeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_stdout_is_not_ready() {
        let orch = Arc::new(
            ScriptedOrchestrator::new("j-1")
                .then_poll(PollScript::Executions(vec![Execution::new("e-1", "\n")]))
                .then_poll(PollScript::Executions(vec![
                    Execution::new("e-1", "\n"),
                    Execution::new("e-2", "cat\n"),
                    Execution::new("e-3", "  \n"),
                ])),
        );
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;
        match outcome {
            JobOutcome::Succeeded { execution_id, .. } => assert_eq!(execution_id, "e-2"),
            other => panic!("Expected Succeeded, got {other:?}"),
        }
        assert_eq!(orch.poll_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_do_not_abort() {
        let orch = Arc::new(
            ScriptedOrchestrator::new("j-1")
                .then_poll(PollScript::Transport)
                .then_poll(PollScript::Status(500))
                .then_poll(PollScript::Executions(vec![Execution::new("e-1", "ok")])),
        );
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;
        assert!(outcome.is_success());
        assert_eq!(orch.poll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_result_after_five_attempts_cancels_once() {
        let orch = Arc::new(ScriptedOrchestrator::new("j-9"));
        let dispatcher = JobDispatcher::new(orch.clone());

        let start = Instant::now();
        let (outcome, cleanup) = dispatcher.dispatch_with_cleanup(submission(false)).await;
        let elapsed = start.elapsed();

        assert_eq!(
            outcome,
            JobOutcome::NoResultYet {
                job_id: "j-9".to_string()
            }
        );
        assert_eq!(orch.poll_calls.load(Ordering::SeqCst), MAX_POLL_ATTEMPTS);
        assert!(elapsed >= windows(5) && elapsed < windows(6), "{elapsed:?}");

        cleanup.expect("cleanup task").await.unwrap();
        assert_eq!(orch.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.cancel_reasons(), vec![CANCEL_REASON.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_cancel_waits_grace_period() {
        let orch = Arc::new(ScriptedOrchestrator::new("j-9"));
        let (_, cleanup) = JobDispatcher::new(orch.clone())
            .dispatch_with_cleanup(submission(true))
            .await;

        let before = Instant::now();
        cleanup.expect("cleanup task").await.unwrap();
        assert!(before.elapsed() >= CANCEL_GRACE);
        assert_eq!(orch.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_failure_is_swallowed() {
        let orch = Arc::new(ScriptedOrchestrator::new("j-9").cancel_fails());
        let (outcome, cleanup) = JobDispatcher::new(orch.clone())
            .dispatch_with_cleanup(submission(false))
            .await;
        cleanup.expect("cleanup task").await.unwrap();
        assert!(matches!(outcome, JobOutcome::NoResultYet { .. }));
        assert_eq!(orch.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_skips_polling() {
        let orch = Arc::new(ScriptedOrchestrator::failing_submit(503));
        let start = Instant::now();
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;

        assert!(matches!(outcome, JobOutcome::SubmissionFailed { .. }));
        assert_eq!(orch.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.poll_calls.load(Ordering::SeqCst), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_job_id_is_submission_failure() {
        let orch = Arc::new(ScriptedOrchestrator::missing_job_id());
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;
        match outcome {
            JobOutcome::SubmissionFailed { reason } => assert!(reason.contains("JobID")),
            other => panic!("Expected SubmissionFailed, got {other:?}"),
        }
        assert_eq!(orch.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secure_token_is_reused() {
        let orch = Arc::new(
            ScriptedOrchestrator::new("j-1")
                .secure(false)
                .then_poll(PollScript::Executions(vec![Execution::new("e-1", "done")])),
        );
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;
        assert!(outcome.is_success());
        assert_eq!(orch.token_calls.load(Ordering::SeqCst), 1);
        assert!(orch
            .tokens_seen()
            .iter()
            .all(|t| t.as_deref() == Some("scripted-token")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_failure_is_submission_failure() {
        let orch = Arc::new(ScriptedOrchestrator::new("j-1").secure(true));
        let outcome = JobDispatcher::new(orch.clone()).dispatch(submission(false)).await;
        assert!(matches!(outcome, JobOutcome::SubmissionFailed { .. }));
        assert_eq!(orch.submit_calls.load(Ordering::SeqCst), 0);
    }
}
