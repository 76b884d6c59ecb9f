//! 用户链接的任务文件：下载与解析
//!
//! URL 在识别阶段不做校验，到这里下载时才检查（仅 http / https）。

use reqwest::Client;
use serde_json::Value;

use crate::core::BotError;

/// 下载任务文件；非 200 视为失败
pub async fn fetch_job_file(client: &Client, raw_url: &str) -> Result<String, BotError> {
    let url = url::Url::parse(raw_url)
        .map_err(|e| BotError::Template(format!("invalid job file URL {raw_url:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BotError::Template(format!(
            "job file URL must be http or https, got {}",
            url.scheme()
        )));
    }

    tracing::info!("Getting job file from URL: {}", url);
    let resp = client.get(url).send().await?;
    if resp.status() != reqwest::StatusCode::OK {
        return Err(BotError::from_response(resp).await);
    }
    Ok(resp.text().await?)
}

/// 解析 YAML 或 JSON 任务文件；顶层若有 `Job` 包装则取其内容
pub fn parse_job_file(raw: &str) -> Result<Value, BotError> {
    let value: Value = serde_yaml::from_str(raw)
        .map_err(|e| BotError::Template(format!("job file is not valid YAML or JSON: {e}")))?;
    let job = match value {
        Value::Object(mut map) if map.contains_key("Job") => map.remove("Job").unwrap_or(Value::Null),
        other => other,
    };
    if !job.is_object() {
        return Err(BotError::Template("job file must describe a single job object".to_string()));
    }
    Ok(job)
}
