//! 指令识别：把一条 mention 文本归类为 Command
//!
//! 规则（均以 `@handle` 开头）按固定顺序全部评估，**最后一个匹配的规则生效**：
//! 1. `@handle job run <url>` → RunJobFile（url 取第 4 个空白分隔的词，这里不校验 URL 格式）
//! 2. `@handle classify ...` → ClassifyImage
//! 3. `@handle hotdog`（可带结尾标点）→ DetectHotdog
//! 4. `@handle <word>?` → DetectArbitraryClass
//!
//! 账号级覆盖优先于以上规则：机器人自己的 handle 匹配 alt-text 账号模式时一律返回 GenerateAltText，
//! 匹配 community 账号模式时一律返回 CommunityJob。
//!
//! 因此 `@bot hotdog?` 同时命中规则 3 和 4，结果是 DetectArbitraryClass{class_name = "hotdog"}。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::command::{Command, CommandKind, CommandParams};
use crate::config::RecognizerSection;
use crate::core::BotError;

/// 某个机器人 handle 对应的四条规则
#[derive(Debug)]
struct HandleRules {
    job_run: Regex,
    classify: Regex,
    hotdog: Regex,
    arbitrary_class: Regex,
}

impl HandleRules {
    fn compile(handle: &str) -> Result<Self, regex::Error> {
        let h = regex::escape(handle);
        Ok(Self {
            job_run: Regex::new(&format!(r"(?i)^@{h}\s+job\s+run\s+\S+"))?,
            classify: Regex::new(&format!(r"(?is)^@{h}\s+classify\b(.*)$"))?,
            hotdog: Regex::new(&format!(r"(?i)^@{h}\s+hotdog[[:punct:]]*$"))?,
            arbitrary_class: Regex::new(&format!(r"(?i)^@{h}\s+(\w+)\?$"))?,
        })
    }
}

/// 指令识别器：结果只取决于输入；按 handle 缓存已编译的规则
#[derive(Debug)]
pub struct CommandRecognizer {
    alt_text_account: Regex,
    community_account: Regex,
    rules: RwLock<HashMap<String, Arc<HandleRules>>>,
}

impl CommandRecognizer {
    /// 编译账号级覆盖规则；模式非法时返回配置错误
    pub fn new(cfg: &RecognizerSection) -> Result<Self, BotError> {
        let compile = |name: &str, pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| BotError::Config(format!("recognizer.{name} is not a valid regex: {e}")))
        };
        Ok(Self {
            alt_text_account: compile("alt_text_account_pattern", &cfg.alt_text_account_pattern)?,
            community_account: compile("community_account_pattern", &cfg.community_account_pattern)?,
            rules: RwLock::new(HashMap::new()),
        })
    }

    /// 识别 mention；无匹配时返回 CommandKind::None
    pub fn classify(&self, text: &str, bot_handle: &str) -> Command {
        let text = text.trim();
        let handle = bot_handle.trim().trim_start_matches('@');

        if let Some(cmd) = self.account_override(text, handle) {
            return cmd;
        }

        let rules = match self.rules_for(handle) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("Could not compile command rules for @{}: {}", handle, e);
                return Command::none();
            }
        };
        let mut result = Command::none();

        // 规则 1
        if rules.job_run.is_match(text) {
            let parts: Vec<&str> = text.split_whitespace().collect();
            if parts.len() >= 4 {
                result = Command {
                    kind: CommandKind::RunJobFile,
                    params: CommandParams {
                        url: Some(parts[3].to_string()),
                        text: Some(text.to_string()),
                        ..Default::default()
                    },
                };
            }
        }

        // 规则 2
        if let Some(caps) = rules.classify.captures(text) {
            let rest = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            result = Command {
                kind: CommandKind::ClassifyImage,
                params: CommandParams {
                    text: (!rest.is_empty()).then(|| rest.to_string()),
                    ..Default::default()
                },
            };
        }

        // 规则 3
        if rules.hotdog.is_match(text) {
            result = Command::new(CommandKind::DetectHotdog);
        }

        // 规则 4
        if let Some(caps) = rules.arbitrary_class.captures(text) {
            result = Command {
                kind: CommandKind::DetectArbitraryClass,
                params: CommandParams {
                    class_name: caps.get(1).map(|m| m.as_str().to_string()),
                    ..Default::default()
                },
            };
        }

        result
    }

    /// 取出或编译该 handle 的规则
    fn rules_for(&self, handle: &str) -> Result<Arc<HandleRules>, regex::Error> {
        if let Some(rules) = self
            .rules
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(handle)
        {
            return Ok(Arc::clone(rules));
        }
        let compiled = Arc::new(HandleRules::compile(handle)?);
        self.rules
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(handle.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    #[cfg(test)]
    fn cached_handles(&self) -> usize {
        self.rules.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn account_override(&self, text: &str, handle: &str) -> Option<Command> {
        if self.alt_text_account.is_match(handle) {
            return Some(Command {
                kind: CommandKind::GenerateAltText,
                params: CommandParams {
                    text: Some(text.to_string()),
                    ..Default::default()
                },
            });
        }
        if self.community_account.is_match(handle) {
            let body = strip_leading_mention(text, handle);
            return Some(Command {
                kind: CommandKind::CommunityJob,
                params: CommandParams {
                    text: Some(body),
                    ..Default::default()
                },
            });
        }
        None
    }
}

/// 去掉开头的 `@handle`
fn strip_leading_mention(text: &str, handle: &str) -> String {
    let mention = format!("@{handle}");
    match text.get(..mention.len()) {
        Some(head) if head.eq_ignore_ascii_case(&mention) => text[mention.len()..].trim().to_string(),
        _ => text.to_string(),
    }
}
