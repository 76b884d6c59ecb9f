//! 回复文本：JobOutcome → 发给用户的一条帖子
//!
//! 纯函数，总是返回字符串；所有回复截断到 Bluesky 单帖上限（300 字符）。

use crate::command::CommandKind;
use crate::dispatch::JobOutcome;

/// Bluesky 单帖字符上限
pub const POST_LIMIT: usize = 300;

const ELLIPSIS: char = '…';

/// 调用方提供的上下文
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub kind: CommandKind,
    pub author_handle: String,
    /// 输出已上传并缩短时的链接；有则不内联 stdout
    pub output_link: Option<String>,
}

impl ReplyContext {
    pub fn new(kind: CommandKind, author_handle: impl Into<String>) -> Self {
        Self {
            kind,
            author_handle: author_handle.into(),
            output_link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.output_link = Some(link.into());
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseComposer;

impl ResponseComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, outcome: &JobOutcome, ctx: &ReplyContext) -> String {
        match outcome {
            JobOutcome::Succeeded {
                job_id,
                execution_id,
                stdout,
            } => self.success(job_id, execution_id, stdout.trim(), ctx),
            JobOutcome::NoResultYet { job_id } => clamp(
                &format!(
                    "Your job is still running and has no results yet. \
                     Use this ID to check on it later: {job_id}"
                ),
                POST_LIMIT,
            ),
            JobOutcome::SubmissionFailed { .. } => clamp(
                &format!(
                    "Sorry @{}, your job could not run. Probable causes:\n\
                     - not enough capacity on the network\n\
                     - no node matched the job's node selector\n\
                     - the job configuration is not allowed\n\
                     - an unexpected internal error",
                    ctx.author_handle
                ),
                POST_LIMIT,
            ),
        }
    }

    fn success(&self, job_id: &str, execution_id: &str, stdout: &str, ctx: &ReplyContext) -> String {
        let ids = format!("(job {job_id}, execution {execution_id})");

        if let Some(link) = &ctx.output_link {
            let head = match ctx.kind {
                CommandKind::GenerateAltText => format!("Alt text for this image {ids}: "),
                _ => format!("Job {job_id} finished (execution {execution_id}). Results: "),
            };
            return link_reply(&head, link);
        }

        let prefix = match ctx.kind {
            CommandKind::RunJobFile | CommandKind::CommunityJob | CommandKind::None => {
                let prefix = format!("Job {job_id} finished (execution {execution_id}).\n");
                let room = POST_LIMIT.saturating_sub(prefix.chars().count());
                return format!("{prefix}{}", clamp(stdout, room));
            }
            CommandKind::GenerateAltText => "",
            CommandKind::DetectHotdog => "🌭 ",
            CommandKind::ClassifyImage => "I think this is: ",
            CommandKind::DetectArbitraryClass => "Result: ",
        };
        let suffix = format!(" {ids}");
        let room = POST_LIMIT.saturating_sub(prefix.chars().count() + suffix.chars().count());
        format!("{prefix}{}{suffix}", clamp(stdout, room))
    }
}

/// 链接保持完整，只截断前面的固定文字
fn link_reply(head: &str, link: &str) -> String {
    let fixed = head.chars().count();
    let link_len = link.chars().count();
    if fixed + link_len <= POST_LIMIT {
        return format!("{head}{link}");
    }
    let room = POST_LIMIT.saturating_sub(link_len + 1);
    if room == 0 {
        return link.to_string();
    }
    format!("{} {link}", clamp(head.trim_end(), room))
}

/// 按字符截断，超出时以 … 结尾
pub fn clamp(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(limit - 1).collect();
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded(stdout: &str) -> JobOutcome {
        JobOutcome::Succeeded {
            job_id: "j-1".to_string(),
            execution_id: "e-1".to_string(),
            stdout: stdout.to_string(),
        }
    }

    #[test]
    fn test_run_job_inlines_output() {
        let ctx = ReplyContext::new(CommandKind::RunJobFile, "alice.bsky.social");
        let text = ResponseComposer::new().compose(&succeeded("hello world\n"), &ctx);
        assert_eq!(text, "Job j-1 finished (execution e-1).\nhello world");
    }

    #[test]
    fn test_link_replaces_output() {
        let ctx = ReplyContext::new(CommandKind::RunJobFile, "alice").with_link("https://go.cod.dev/abc");
        let text = ResponseComposer::new().compose(&succeeded(&"x".repeat(5000)), &ctx);
        assert!(text.contains("https://go.cod.dev/abc"));
        assert!(text.contains("j-1"));
        assert!(!text.contains("xxx"));
    }

    #[test]
    fn test_long_link_is_never_cut() {
        let link = format!("https://results.example.org/{}", "k".repeat(250));
        for kind in [CommandKind::RunJobFile, CommandKind::GenerateAltText] {
            let ctx = ReplyContext::new(kind, "alice").with_link(link.clone());
            let text = ResponseComposer::new().compose(&succeeded("ignored"), &ctx);
            assert!(text.ends_with(&link), "{kind}");
            assert!(text.chars().count() <= POST_LIMIT, "{kind}");
        }
    }

    #[test]
    fn test_alt_text_link_has_ids() {
        let ctx = ReplyContext::new(CommandKind::GenerateAltText, "alice").with_link("https://go.cod.dev/abc");
        let text = ResponseComposer::new().compose(&succeeded("ignored"), &ctx);
        assert_eq!(text, "Alt text for this image (job j-1, execution e-1): https://go.cod.dev/abc");
    }

    #[test]
    fn test_long_output_is_truncated() {
        let ctx = ReplyContext::new(CommandKind::RunJobFile, "alice");
        let text = ResponseComposer::new().compose(&succeeded(&"y".repeat(1000)), &ctx);
        assert_eq!(text.chars().count(), POST_LIMIT);
        assert!(text.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_alt_text_is_plain() {
        let ctx = ReplyContext::new(CommandKind::GenerateAltText, "alice");
        let text = ResponseComposer::new().compose(&succeeded("A dog on a beach.\n"), &ctx);
        assert_eq!(text, "A dog on a beach. (job j-1, execution e-1)");
    }

    #[test]
    fn test_hotdog_verdict() {
        let ctx = ReplyContext::new(CommandKind::DetectHotdog, "alice");
        let text = ResponseComposer::new().compose(&succeeded("not hotdog"), &ctx);
        assert_eq!(text, "🌭 not hotdog (job j-1, execution e-1)");
    }

    #[test]
    fn test_every_verdict_carries_ids() {
        let outcome = JobOutcome::Succeeded {
            job_id: "j-77".to_string(),
            execution_id: "e-88".to_string(),
            stdout: "hotdog".to_string(),
        };
        for kind in [
            CommandKind::DetectHotdog,
            CommandKind::ClassifyImage,
            CommandKind::DetectArbitraryClass,
            CommandKind::GenerateAltText,
            CommandKind::RunJobFile,
            CommandKind::CommunityJob,
        ] {
            let text = ResponseComposer::new().compose(&outcome, &ReplyContext::new(kind, "alice"));
            assert!(text.contains("j-77"), "{kind}: {text}");
            assert!(text.contains("e-88"), "{kind}: {text}");
        }
    }

    #[test]
    fn test_long_verdict_keeps_ids() {
        let ctx = ReplyContext::new(CommandKind::ClassifyImage, "alice");
        let text = ResponseComposer::new().compose(&succeeded(&"z".repeat(1000)), &ctx);
        assert_eq!(text.chars().count(), POST_LIMIT);
        assert!(text.ends_with("… (job j-1, execution e-1)"));
    }

    #[test]
    fn test_no_result_mentions_job_id() {
        let ctx = ReplyContext::new(CommandKind::RunJobFile, "alice");
        let outcome = JobOutcome::NoResultYet {
            job_id: "j-42".to_string(),
        };
        let text = ResponseComposer::new().compose(&outcome, &ctx);
        assert!(text.contains("no results yet"));
        assert!(text.ends_with("j-42"));
    }

    #[test]
    fn test_submission_failed_lists_causes() {
        let ctx = ReplyContext::new(CommandKind::ClassifyImage, "alice.bsky.social");
        let outcome = JobOutcome::SubmissionFailed {
            reason: "HTTP 500: boom".to_string(),
        };
        let text = ResponseComposer::new().compose(&outcome, &ctx);
        assert!(text.starts_with("Sorry @alice.bsky.social"));
        assert!(text.contains("capacity"));
        assert!(text.contains("node selector"));
        assert!(text.contains("not allowed"));
        assert!(text.contains("internal error"));
        assert!(text.chars().count() <= POST_LIMIT);
    }

    #[test]
    fn test_clamp_counts_chars() {
        assert_eq!(clamp("héllo", 5), "héllo");
        assert_eq!(clamp("héllo", 3), "hé…");
        assert_eq!(clamp("abc", 0), "");
    }
}
