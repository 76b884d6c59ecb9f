//! 已回复账本：mention id 与回复 id 的只追加集合，用于去重
//!
//! 文件格式为每行一个 id。每次 record 以追加模式打开文件并一次 write_all 写入整行，
//! 多个任务并发追加时不需要加锁；扫描时读到 EOF，忽略末尾尚未写完的半行。
//! 需要换成嵌入式 KV 存储时只需实现 RespondedLedger。

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::core::BotError;

pub trait RespondedLedger: Send + Sync {
    fn contains(&self, id: &str) -> Result<bool, BotError>;

    fn record(&self, id: &str) -> Result<(), BotError>;

    /// 当前全部 id
    fn snapshot(&self) -> Result<HashSet<String>, BotError>;
}

/// 行分隔的文本文件
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取完整的行；文件不存在时为空
    fn read_lines(&self) -> Result<Vec<String>, BotError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines: Vec<&str> = data.split('\n').collect();
        // 最后一段没有换行符：要么为空，要么是正在写入的半行
        lines.pop();
        Ok(lines
            .into_iter()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl RespondedLedger for FileLedger {
    fn contains(&self, id: &str) -> Result<bool, BotError> {
        Ok(self.read_lines()?.iter().any(|line| line == id))
    }

    fn record(&self, id: &str) -> Result<(), BotError> {
        if id.is_empty() || id.contains('\n') {
            return Err(BotError::Ledger(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid ledger id {id:?}"),
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{id}\n").as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn snapshot(&self) -> Result<HashSet<String>, BotError> {
        Ok(self.read_lines()?.into_iter().collect())
    }
}

/// 内存实现（测试 / 不需要持久化时）
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    ids: RwLock<HashSet<String>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RespondedLedger for InMemoryLedger {
    fn contains(&self, id: &str) -> Result<bool, BotError> {
        Ok(self
            .ids
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(id))
    }

    fn record(&self, id: &str) -> Result<(), BotError> {
        self.ids
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id.to_string());
        Ok(())
    }

    fn snapshot(&self) -> Result<HashSet<String>, BotError> {
        Ok(self.ids.read().unwrap_or_else(|p| p.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = FileLedger::new(dir.path().join("responded_to.txt"));
        assert!(!ledger.contains("at://x").unwrap());
        assert!(ledger.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_record_and_contains() {
        let dir = TempDir::new().unwrap();
        let ledger = FileLedger::new(dir.path().join("nested/responded_to.txt"));
        ledger.record("at://did:plc:a/app.bsky.feed.post/1").unwrap();
        ledger.record("at://did:plc:a/app.bsky.feed.post/2").unwrap();
        assert!(ledger.contains("at://did:plc:a/app.bsky.feed.post/1").unwrap());
        assert!(!ledger.contains("at://did:plc:a/app.bsky.feed.post/3").unwrap());
        assert_eq!(ledger.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn test_partial_trailing_line_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("responded_to.txt");
        std::fs::write(&path, "one\ntwo\nthr").unwrap();
        let ledger = FileLedger::new(&path);
        let ids = ledger.snapshot().unwrap();
        assert_eq!(ids, HashSet::from(["one".to_string(), "two".to_string()]));
        assert!(!ledger.contains("thr").unwrap());
    }

    #[test]
    fn test_rejects_newline_ids() {
        let dir = TempDir::new().unwrap();
        let ledger = FileLedger::new(dir.path().join("l.txt"));
        assert!(ledger.record("a\nb").is_err());
        assert!(ledger.record("").is_err());
    }

    #[test]
    fn test_concurrent_appends_are_all_present() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(FileLedger::new(dir.path().join("responded_to.txt")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        ledger
                            .record(&format!("at://did:plc:thread{t}/app.bsky.feed.post/{i}"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let ids = ledger.snapshot().unwrap();
        assert_eq!(ids.len(), 400);
        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw.lines().count(), 400);
        assert!(raw
            .lines()
            .all(|l| l.starts_with("at://did:plc:thread") && l.contains("/app.bsky.feed.post/")));
    }

    #[test]
    fn test_in_memory_ledger() {
        let ledger = InMemoryLedger::new();
        ledger.record("x").unwrap();
        assert!(ledger.contains("x").unwrap());
        assert!(!ledger.contains("y").unwrap());
    }
}
