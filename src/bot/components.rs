//! 预构建的 Bot 组件，多个账号共享
//!
//! 与配置一一对应：识别器、模板、分发器、回复、账本、存储、短链、任务池。

use std::sync::Arc;

use crate::command::CommandRecognizer;
use crate::config::AppConfig;
use crate::core::{BotError, TaskPool};
use crate::dispatch::{JobDispatcher, WaitPolicy};
use crate::integrations::{ObjectStore, Shortener};
use crate::ledger::{FileLedger, RespondedLedger};
use crate::orchestrator::JobTemplateBuilder;
use crate::reply::ResponseComposer;

pub struct BotComponents {
    pub recognizer: CommandRecognizer,
    pub templates: JobTemplateBuilder,
    pub dispatcher: JobDispatcher,
    pub composer: ResponseComposer,
    pub ledger: Arc<dyn RespondedLedger>,
    /// 未配置时长输出直接截断内联
    pub storage: Option<ObjectStore>,
    pub shortener: Option<Shortener>,
    pub pool: TaskPool,
    /// 下载任务文件用
    pub http: reqwest::Client,
    /// stdout 超过该字符数时上传
    pub inline_limit: usize,
}

/// 从配置创建组件；编排器配置缺失是启动期致命错误
pub fn create_bot_components(cfg: &AppConfig) -> Result<BotComponents, BotError> {
    let orchestrator = cfg.orchestrator.validate()?;
    tracing::info!("Using orchestrator at {}", orchestrator.base_url());

    let storage = ObjectStore::from_config(&cfg.storage);
    if storage.is_none() {
        tracing::info!("Object storage not configured, long results will be truncated inline");
    }
    let shortener = Shortener::from_config(&cfg.shortener);
    if shortener.is_none() {
        tracing::info!("No GANCHO_KEY configured, result links will not be shortened");
    }

    Ok(BotComponents {
        recognizer: CommandRecognizer::new(&cfg.recognizer)?,
        templates: JobTemplateBuilder::new(WaitPolicy::from_section(&cfg.orchestrator))?,
        dispatcher: JobDispatcher::from_config(orchestrator)?,
        composer: ResponseComposer::new(),
        ledger: Arc::new(FileLedger::new(&cfg.ledger.path)),
        storage,
        shortener,
        pool: TaskPool::new(cfg.tasks.max_concurrent),
        http: reqwest::Client::new(),
        inline_limit: cfg.storage.inline_limit,
    })
}

#[cfg(test)]
impl BotComponents {
    /// 测试用：脚本化编排器 + 给定账本，其余组件取默认值
    pub(crate) fn for_tests(
        orchestrator: Arc<crate::orchestrator::ScriptedOrchestrator>,
        ledger: Arc<dyn RespondedLedger>,
    ) -> Self {
        Self {
            recognizer: CommandRecognizer::new(&Default::default()).expect("default patterns compile"),
            templates: JobTemplateBuilder::new(WaitPolicy::new(30)).expect("built-in templates parse"),
            dispatcher: JobDispatcher::new(orchestrator),
            composer: ResponseComposer::new(),
            ledger,
            storage: None,
            shortener: None,
            pool: TaskPool::new(2),
            http: reqwest::Client::new(),
            inline_limit: 200,
        }
    }
}
