//! 单个机器人账号的通知轮询循环
//!
//! 每个账号一个 AccountRunner：登录 → 每隔 poll_interval 拉取通知 → 过滤 → 识别指令
//! → 在任务池中并发处理。轮询本身不会被单条 mention 的处理阻塞。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::bot::{handle_mention, BotComponents, SocialClient};
use crate::command::{Command, Mention};
use crate::core::BotError;
use crate::integrations::bluesky::{to_mention, BlueskyClient, Notification};

/// 会触发处理的通知类型
const HANDLED_REASONS: [&str; 3] = ["mention", "reply", "quote"];

/// 轮询出错后的最长退避
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// 机器人账号：在 SocialClient 之上增加登录与拉取通知
#[async_trait]
pub trait NotificationSource: SocialClient {
    fn handle(&self) -> &str;

    async fn login(&self) -> Result<(), BotError>;

    async fn list_notifications(&self) -> Result<Vec<Notification>, BotError>;
}

#[async_trait]
impl NotificationSource for BlueskyClient {
    fn handle(&self) -> &str {
        BlueskyClient::handle(self)
    }

    async fn login(&self) -> Result<(), BotError> {
        BlueskyClient::login(self).await.map(|_| ())
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, BotError> {
        BlueskyClient::list_notifications(self).await
    }
}

pub struct AccountRunner<C> {
    client: Arc<C>,
    components: Arc<BotComponents>,
    /// 早于该时间创建的帖子一律忽略
    start_time: DateTime<Utc>,
    /// 处理中或本进程已回复的 mention；回复失败时移除以便下次重试
    claimed: Arc<Mutex<HashSet<String>>>,
    poll_interval: Duration,
}

impl<C: NotificationSource + 'static> AccountRunner<C> {
    pub fn new(client: Arc<C>, components: Arc<BotComponents>, poll_interval: Duration) -> Self {
        Self {
            client,
            components,
            start_time: Utc::now(),
            claimed: Arc::new(Mutex::new(HashSet::new())),
            poll_interval,
        }
    }

    pub fn handle(&self) -> &str {
        self.client.handle()
    }

    /// 运行直到 shutdown 被取消；已派发的处理任务不受影响
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Starting notification loop for @{}", self.handle());
        let mut backoff = self.poll_interval;

        loop {
            let wait = self.tick(&mut backoff).await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("Notification loop for @{} stopped", self.handle());
    }

    /// 轮询一次并返回下次轮询前的等待时间；出错时退避，400/401 时重新登录
    async fn tick(&self, backoff: &mut Duration) -> Duration {
        match self.poll_once().await {
            Ok(spawned) => {
                if spawned > 0 {
                    tracing::info!("@{}: dispatched {} new mention(s)", self.handle(), spawned);
                }
                *backoff = self.poll_interval;
                self.poll_interval
            }
            Err(e) => {
                tracing::warn!("@{}: polling notifications failed: {}", self.handle(), e);
                if is_auth_failure(&e) {
                    if let Err(e) = self.client.login().await {
                        tracing::error!("@{}: re-login failed: {}", self.handle(), e);
                    }
                }
                *backoff = next_backoff(*backoff);
                *backoff
            }
        }
    }

    /// 拉取一次通知并派发符合条件的 mention，返回派发数量
    pub async fn poll_once(&self) -> Result<usize, BotError> {
        let notifications = self.client.list_notifications().await?;
        if notifications.is_empty() {
            return Ok(0);
        }
        let responded = self.responded().await?;
        let mut spawned = 0;

        for n in &notifications {
            if !is_eligible(n, self.start_time, self.handle()) {
                continue;
            }
            let mention = to_mention(n);
            if responded.contains(&mention.id) {
                continue;
            }
            let command = self.components.recognizer.classify(&mention.text, self.handle());
            if command.is_none() {
                tracing::debug!("Ignoring {}: no command recognized", mention.id);
                continue;
            }
            if !claim(&self.claimed, &mention.id) {
                continue;
            }

            let client = Arc::clone(&self.client);
            let components = Arc::clone(&self.components);
            let claimed = Arc::clone(&self.claimed);
            let label = format!("{} for {}", command.kind, mention.id);
            self.components.pool.spawn(&label, async move {
                if !process(&components, client.as_ref(), &mention, &command).await {
                    release(&claimed, &mention.id);
                }
            });
            spawned += 1;
        }
        Ok(spawned)
    }

    /// 账本快照（每次轮询读一次，放到阻塞线程池）
    async fn responded(&self) -> Result<HashSet<String>, BotError> {
        let ledger = Arc::clone(&self.components.ledger);
        tokio::task::spawn_blocking(move || ledger.snapshot())
            .await
            .map_err(|e| BotError::Ledger(std::io::Error::other(e)))?
    }
}

/// 处理一条 mention，回复并记账成功时返回 true
async fn process(components: &BotComponents, social: &dyn SocialClient, mention: &Mention, command: &Command) -> bool {
    match handle_mention(components, social, mention, command).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to answer {}: {}", mention.id, e);
            false
        }
    }
}

/// 连续出错时等待翻倍，上限 MAX_BACKOFF
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// 是否需要处理该通知（不含去重）
///
/// - 类型为 mention / reply / quote
/// - 作者不是机器人自己
/// - 创建时间晚于启动时间
/// - reply 通知必须在正文中显式 @ 机器人
pub fn is_eligible(n: &Notification, start_time: DateTime<Utc>, own_handle: &str) -> bool {
    if !HANDLED_REASONS.contains(&n.reason.as_str()) {
        return false;
    }
    if n.author.handle.eq_ignore_ascii_case(own_handle) {
        return false;
    }
    let created = DateTime::parse_from_rfc3339(&n.record.created_at)
        .ok()
        .map(|t| t.with_timezone(&Utc));
    if !created.is_some_and(|t| t > start_time) {
        return false;
    }
    if n.reason == "reply" {
        let tag = format!("@{}", own_handle.to_lowercase());
        return n.record.text.to_lowercase().contains(&tag);
    }
    true
}

fn is_auth_failure(e: &BotError) -> bool {
    matches!(e, BotError::Status { status: 400 | 401, .. } | BotError::Auth(_))
}

/// 标记为已认领；已被认领时返回 false
fn claim(claimed: &Mutex<HashSet<String>>, id: &str) -> bool {
    claimed
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .insert(id.to_string())
}

fn release(claimed: &Mutex<HashSet<String>>, id: &str) {
    claimed
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .remove(id);
}
