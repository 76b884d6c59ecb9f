//! 对象存储：把较长的任务输出上传后以链接形式回复
//!
//! HTTP PUT `{endpoint}/{bucket}/{key}`，可选 Bearer token；公开地址为 `{public_base_url}/{key}`。

use reqwest::Client;

use crate::config::StorageSection;
use crate::core::BotError;

pub struct ObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    public_base_url: String,
    token: Option<String>,
}

impl ObjectStore {
    /// 未配置 endpoint 时返回 None（不上传）
    pub fn from_config(cfg: &StorageSection) -> Option<Self> {
        let endpoint = cfg.endpoint.as_deref()?.trim_end_matches('/').to_string();
        let public_base_url = cfg
            .public_base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("{}/{}", endpoint, cfg.bucket));
        Some(Self {
            client: Client::new(),
            endpoint,
            bucket: cfg.bucket.clone(),
            public_base_url,
            token: cfg.token.clone(),
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// 上传并返回公开地址
    pub async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, BotError> {
        let mut req = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(BotError::from_response(resp).await);
        }
        let url = self.public_url(key);
        tracing::info!("Uploaded {} to {}", key, url);
        Ok(url)
    }
}

/// 任务输出的对象 key：results/{job_id}/{uuid}.txt
pub fn result_key(job_id: &str) -> String {
    format!("results/{}/{}.txt", job_id, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_endpoint() {
        assert!(ObjectStore::from_config(&StorageSection::default()).is_none());
    }

    #[test]
    fn test_urls() {
        let cfg = StorageSection {
            endpoint: Some("https://storage.example.org/".to_string()),
            public_base_url: Some("https://results.example.org".to_string()),
            ..Default::default()
        };
        let store = ObjectStore::from_config(&cfg).unwrap();
        assert_eq!(
            store.object_url("results/j-1/a.txt"),
            "https://storage.example.org/bbb-results/results/j-1/a.txt"
        );
        assert_eq!(store.public_url("results/j-1/a.txt"), "https://results.example.org/results/j-1/a.txt");
    }

    #[test]
    fn test_public_url_defaults_to_bucket_path() {
        let cfg = StorageSection {
            endpoint: Some("https://storage.example.org".to_string()),
            ..Default::default()
        };
        let store = ObjectStore::from_config(&cfg).unwrap();
        assert_eq!(store.public_url("k"), "https://storage.example.org/bbb-results/k");
    }

    #[test]
    fn test_result_key_shape() {
        let key = result_key("j-7");
        assert!(key.starts_with("results/j-7/"));
        assert!(key.ends_with(".txt"));
    }
}
