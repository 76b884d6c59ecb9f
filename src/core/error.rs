//! Bot 错误类型
//!
//! 除启动期的配置错误外，分发路径上的错误都会被 JobDispatcher 转换成 JobOutcome，不会向上抛出。

use thiserror::Error;

/// 外部调用（Bluesky / Bacalhau / 存储 / 短链）与本地账本可能出现的错误
#[derive(Error, Debug)]
pub enum BotError {
    /// 缺少 host、密钥等，启动时即失败
    #[error("Config error: {0}")]
    Config(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] std::io::Error),
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BotError::Decode(e.to_string())
        } else {
            BotError::Transport(e.to_string())
        }
    }
}

impl BotError {
    /// 非 2xx 响应：读取响应体作为错误详情
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        BotError::Status { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = BotError::Status {
            status: 503,
            body: "no capacity".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: no capacity");
    }

    #[test]
    fn test_io_error_becomes_ledger_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BotError = io.into();
        assert!(matches!(err, BotError::Ledger(_)));
    }
}
