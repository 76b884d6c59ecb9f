//! Gancho 短链服务
//!
//! POST `{"url": ...}` 到 endpoint，Authorization 头为 key；响应中的 identifier 拼成 `{endpoint}/{identifier}`。

use reqwest::{Client, StatusCode};

use crate::config::ShortenerSection;
use crate::core::BotError;

pub struct Shortener {
    client: Client,
    endpoint: String,
    key: String,
}

impl Shortener {
    /// 没有 key 时返回 None（不缩短）
    pub fn from_config(cfg: &ShortenerSection) -> Option<Self> {
        let key = cfg.key.clone().filter(|k| !k.trim().is_empty())?;
        Some(Self {
            client: Client::new(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            key,
        })
    }

    pub async fn shorten(&self, target_url: &str) -> Result<String, BotError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.key)
            .json(&serde_json::json!({ "url": target_url }))
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(BotError::from_response(resp).await);
        }
        let body: serde_json::Value = resp.json().await?;
        let identifier = body["identifier"]
            .as_str()
            .ok_or(BotError::MissingField("identifier"))?;
        Ok(short_url(&self.endpoint, identifier))
    }
}

fn short_url(endpoint: &str, identifier: &str) -> String {
    format!("{}/{}", endpoint, identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_key() {
        assert!(Shortener::from_config(&ShortenerSection::default()).is_none());
        let cfg = ShortenerSection {
            key: Some("k".to_string()),
            ..Default::default()
        };
        let s = Shortener::from_config(&cfg).unwrap();
        assert_eq!(s.endpoint, "https://go.cod.dev");
    }

    #[test]
    fn test_short_url() {
        assert_eq!(short_url("https://go.cod.dev", "x7Yz"), "https://go.cod.dev/x7Yz");
    }
}
