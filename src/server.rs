//! HTTP 服务：健康检查与任务结果页
//!
//! - GET /health → "OK"
//! - GET /results/{job_id} → 该任务所有执行记录及其 stdout（HTML）

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use crate::core::BotError;
use crate::orchestrator::{Execution, OrchestratorClient};

#[derive(Clone)]
pub struct ServerState {
    pub orchestrator: Arc<dyn OrchestratorClient>,
}

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/results/:job_id", get(job_result))
        .with_state(state)
}

/// 绑定端口并运行，直到 shutdown 被取消
pub async fn serve(
    state: ServerState,
    port: u16,
    shutdown: tokio_util::sync::CancellationToken,
) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Result server listening on http://{}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn job_result(State(state): State<ServerState>, Path(job_id): Path<String>) -> Response {
    match executions(state.orchestrator.as_ref(), &job_id).await {
        Ok(items) if items.iter().any(Execution::has_output) => {
            Html(render_page(&job_id, &items)).into_response()
        }
        Ok(_) => (StatusCode::NOT_FOUND, Html(render_pending(&job_id))).into_response(),
        Err(e) => {
            tracing::warn!("Could not load results for {}: {}", job_id, e);
            (StatusCode::BAD_GATEWAY, "Could not reach the orchestrator").into_response()
        }
    }
}

async fn executions(client: &dyn OrchestratorClient, job_id: &str) -> Result<Vec<Execution>, BotError> {
    let token = if client.requires_auth() {
        Some(client.auth_token().await?)
    } else {
        None
    };
    client.list_executions(job_id, token.as_deref()).await
}

fn render_page(job_id: &str, executions: &[Execution]) -> String {
    let mut body = String::new();
    for exec in executions {
        body.push_str(&format!(
            "<h2>Execution {}</h2><pre>{}</pre>",
            escape_html(&exec.id),
            escape_html(exec.stdout.trim_end())
        ));
    }
    wrap(job_id, &body)
}

fn render_pending(job_id: &str) -> String {
    wrap(job_id, "<p>No results yet. Try again in a minute.</p>")
}

fn wrap(job_id: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Job {id}</title></head>\
         <body><h1>Job {id}</h1>{body}</body></html>",
        id = escape_html(job_id),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
