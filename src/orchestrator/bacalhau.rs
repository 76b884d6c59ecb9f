//! Bacalhau v1 REST 客户端
//!
//! - PUT    /api/v1/orchestrator/jobs                     提交，返回 JobID
//! - GET    /api/v1/orchestrator/jobs/{id}/executions     执行记录（Items[].ID / Items[].RunOutput.Stdout）
//! - DELETE /api/v1/orchestrator/jobs/{id}?reason=...     取消，返回 EvaluationID
//! - POST   {auth_path}                                   secure 模式下用共享密钥换 token

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::OrchestratorConfig;
use crate::core::BotError;
use crate::orchestrator::{Execution, OrchestratorClient};

pub struct HttpOrchestrator {
    client: Client,
    cfg: OrchestratorConfig,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "JobID", default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecutionsResponse {
    #[serde(rename = "Items", default)]
    items: Option<Vec<ExecutionItem>>,
}

#[derive(Debug, Deserialize)]
struct ExecutionItem {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "RunOutput", default)]
    run_output: Option<RunOutput>,
}

#[derive(Debug, Deserialize)]
struct RunOutput {
    #[serde(rename = "Stdout", default)]
    stdout: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(rename = "EvaluationID", default)]
    evaluation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "Token", default)]
    token: Option<String>,
}

impl HttpOrchestrator {
    pub fn new(cfg: OrchestratorConfig) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| BotError::Config(format!("could not build HTTP client: {e}")))?;
        Ok(Self { client, cfg })
    }

    fn jobs_url(&self) -> String {
        format!("{}/api/v1/orchestrator/jobs", self.cfg.base_url())
    }

    fn with_token(req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

#[async_trait]
impl OrchestratorClient for HttpOrchestrator {
    async fn submit(&self, payload: &[u8], token: Option<&str>) -> Result<String, BotError> {
        let req = self
            .client
            .put(self.jobs_url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec());
        let resp = Self::with_token(req, token).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::from_response(resp).await);
        }
        let body: SubmitResponse = resp.json().await?;
        body.job_id
            .filter(|id| !id.is_empty())
            .ok_or(BotError::MissingField("JobID"))
    }

    async fn list_executions(
        &self,
        job_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<Execution>, BotError> {
        let url = format!("{}/{}/executions", self.jobs_url(), job_id);
        let resp = Self::with_token(self.client.get(url), token).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::from_response(resp).await);
        }
        let body: ExecutionsResponse = resp.json().await?;
        Ok(body
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| Execution {
                id: item.id,
                stdout: item.run_output.and_then(|o| o.stdout).unwrap_or_default(),
            })
            .collect())
    }

    async fn cancel(
        &self,
        job_id: &str,
        reason: &str,
        token: Option<&str>,
    ) -> Result<String, BotError> {
        let url = format!("{}/{}", self.jobs_url(), job_id);
        let req = self.client.delete(url).query(&[("reason", reason)]);
        let resp = Self::with_token(req, token).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::from_response(resp).await);
        }
        let body: CancelResponse = resp.json().await?;
        body.evaluation_id.ok_or(BotError::MissingField("EvaluationID"))
    }

    async fn auth_token(&self) -> Result<String, BotError> {
        let secret = self
            .cfg
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Auth("no api key configured".to_string()))?;
        let url = format!("{}{}", self.cfg.base_url(), self.cfg.auth_path);
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "secret": secret }))
            .send()
            .await
            .map_err(|e| BotError::Auth(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(BotError::Auth(format!("token exchange returned HTTP {status}")));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Auth(e.to_string()))?;
        body.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::Auth("no token in auth response".to_string()))
    }

    fn requires_auth(&self) -> bool {
        self.cfg.secure
    }
}
