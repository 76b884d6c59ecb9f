//! 回复层：把分发结果组织成回复文本

pub mod composer;

pub use composer::{clamp, ReplyContext, ResponseComposer, POST_LIMIT};
