//! 单条 mention 的处理：准备输入 → 构建任务 → 分发 → 上传长输出 → 组织回复 → 发送 → 记账
//!
//! 任何一步失败都会落到某种 JobOutcome，最终总会给用户一条回复（发送本身失败除外）。

use async_trait::async_trait;

use crate::bot::BotComponents;
use crate::command::{Command, CommandKind, ImageRef, Mention};
use crate::core::BotError;
use crate::dispatch::JobOutcome;
use crate::integrations::{storage::result_key, BlueskyClient};
use crate::orchestrator::{fetch_job_file, TemplateInputs};
use crate::reply::ReplyContext;

/// 处理 mention 时需要的社交网络能力
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// 某个帖子（父帖 / 引用帖）上的图片
    async fn post_images(&self, uri: &str) -> Result<Vec<ImageRef>, BotError>;

    /// 回复 mention，返回回复帖子的 id
    async fn reply(&self, mention: &Mention, text: &str) -> Result<String, BotError>;
}

#[async_trait]
impl SocialClient for BlueskyClient {
    async fn post_images(&self, uri: &str) -> Result<Vec<ImageRef>, BotError> {
        self.get_post_images(uri).await
    }

    async fn reply(&self, mention: &Mention, text: &str) -> Result<String, BotError> {
        BlueskyClient::reply(self, mention, text).await
    }
}

/// 处理一条已识别的 mention，返回回复帖子的 id
pub async fn handle_mention(
    components: &BotComponents,
    social: &dyn SocialClient,
    mention: &Mention,
    command: &Command,
) -> Result<String, BotError> {
    tracing::info!(
        "Handling {} from @{} ({})",
        command.kind,
        mention.author_handle,
        mention.id
    );

    let outcome = match run_command(components, social, mention, command).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Could not prepare {} for {}: {}", command.kind, mention.id, e);
            JobOutcome::SubmissionFailed {
                reason: e.to_string(),
            }
        }
    };

    let mut ctx = ReplyContext::new(command.kind, mention.author_handle.clone());
    if let JobOutcome::Succeeded { job_id, stdout, .. } = &outcome {
        if stdout.trim().chars().count() > components.inline_limit {
            ctx.output_link = publish_output(components, job_id, stdout).await;
        }
    }

    let text = components.composer.compose(&outcome, &ctx);
    let reply_id = social.reply(mention, &text).await?;
    tracing::info!("Replied to {} with {}", mention.id, reply_id);

    components.ledger.record(&mention.id)?;
    components.ledger.record(&reply_id)?;
    Ok(reply_id)
}

/// 准备输入并分发；准备阶段的错误由调用方转为 SubmissionFailed
async fn run_command(
    components: &BotComponents,
    social: &dyn SocialClient,
    mention: &Mention,
    command: &Command,
) -> Result<JobOutcome, BotError> {
    let image = if command.kind.needs_image() {
        resolve_image(social, mention).await
    } else {
        None
    };

    let job_file = match (command.kind, command.params.url.as_deref()) {
        (CommandKind::RunJobFile, Some(url)) => Some(fetch_job_file(&components.http, url).await?),
        _ => None,
    };

    let inputs = TemplateInputs {
        image_url: image.as_ref().map(|i| i.url.as_str()),
        job_file: job_file.as_deref(),
    };
    let submission = components.templates.build(command, &inputs)?;
    Ok(components.dispatcher.dispatch(submission).await)
}

/// mention 自带图片优先，其次父帖、引用帖
async fn resolve_image(social: &dyn SocialClient, mention: &Mention) -> Option<ImageRef> {
    if let Some(img) = mention.images.first() {
        return Some(img.clone());
    }
    for uri in [mention.parent_uri.as_deref(), mention.quoted_uri.as_deref()]
        .into_iter()
        .flatten()
    {
        match social.post_images(uri).await {
            Ok(images) => {
                if let Some(img) = images.into_iter().next() {
                    return Some(img);
                }
            }
            Err(e) => tracing::warn!("Could not load images from {}: {}", uri, e),
        }
    }
    None
}

/// 上传输出并尽量缩短链接；任一步失败时回退为内联
async fn publish_output(components: &BotComponents, job_id: &str, stdout: &str) -> Option<String> {
    let storage = components.storage.as_ref()?;
    let url = match storage
        .upload(&result_key(job_id), stdout.as_bytes().to_vec(), "text/plain; charset=utf-8")
        .await
    {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Could not upload output of job {}: {}", job_id, e);
            return None;
        }
    };
    match &components.shortener {
        Some(shortener) => match shortener.shorten(&url).await {
            Ok(short) => Some(short),
            Err(e) => {
                tracing::warn!("Could not shorten {}: {}", url, e);
                Some(url)
            }
        },
        None => Some(url),
    }
}
