//! 指令层：Mention / Command 数据模型与指令识别

pub mod recognizer;
pub mod types;

pub use recognizer::CommandRecognizer;
pub use types::{Command, CommandKind, CommandParams, ImageRef, Mention, PostRef, PostType};
