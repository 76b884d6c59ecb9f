//! 指令数据模型：Mention（入站消息）、Command（识别结果）

use chrono::{DateTime, Utc};

/// 帖子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostType {
    #[default]
    Standalone,
    Reply,
    Quote,
}

/// 帖子中附带的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub alt: Option<String>,
}

/// 一条指向机器人的 mention，收到后不再修改
#[derive(Debug, Clone, Default)]
pub struct Mention {
    /// 帖子 URI，用于去重与回复线程
    pub id: String,
    pub cid: String,
    pub author_handle: String,
    pub author_did: String,
    pub text: String,
    pub post_type: PostType,
    pub created_at: Option<DateTime<Utc>>,
    pub images: Vec<ImageRef>,
    /// 所回复的帖子（用于取图）
    pub parent_uri: Option<String>,
    /// 线程根（回复时沿用）
    pub root: Option<PostRef>,
    /// 引用的帖子（用于取图）
    pub quoted_uri: Option<String>,
}

/// uri + cid，回复时需要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

/// 指令类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    RunJobFile,
    ClassifyImage,
    DetectHotdog,
    DetectArbitraryClass,
    GenerateAltText,
    CommunityJob,
    None,
}

impl CommandKind {
    /// 稳定的 snake_case 名称，也是等待时间覆盖配置的键
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::RunJobFile => "run_job",
            CommandKind::ClassifyImage => "classify",
            CommandKind::DetectHotdog => "hotdog",
            CommandKind::DetectArbitraryClass => "arbitrary_class",
            CommandKind::GenerateAltText => "alt_text",
            CommandKind::CommunityJob => "community",
            CommandKind::None => "none",
        }
    }

    /// 是否需要一张图片作为输入
    pub fn needs_image(&self) -> bool {
        matches!(
            self,
            CommandKind::ClassifyImage
                | CommandKind::DetectHotdog
                | CommandKind::DetectArbitraryClass
                | CommandKind::GenerateAltText
        )
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 参数：哪些字段有值取决于指令类型
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParams {
    pub url: Option<String>,
    pub class_name: Option<String>,
    pub text: Option<String>,
}

/// 识别结果：一个类型 + 参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub params: CommandParams,
}

impl Command {
    pub fn none() -> Self {
        Self::new(CommandKind::None)
    }

    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            params: CommandParams::default(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == CommandKind::None
    }
}
