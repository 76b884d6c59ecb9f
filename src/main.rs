//! BBB - Bacalhau Bluesky Bot
//!
//! 入口：初始化日志、加载配置、构建共享组件，为每个账号启动通知循环，
//! 并在 feature `web` 下启动健康检查 / 结果页服务。Ctrl+C 或 SIGTERM 时停止轮询。
//!
//! 启动: cargo run -- [config.toml]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bbb::bot::{create_bot_components, AccountRunner};
use bbb::config::load_config;
use bbb::integrations::BlueskyClient;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bbb::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;

    if cfg.bluesky.accounts.is_empty() {
        anyhow::bail!("No Bluesky accounts configured (set [[bluesky.accounts]] or BLUESKY_USER / BLUESKY_PASS)");
    }

    let components = Arc::new(create_bot_components(&cfg).context("Failed to build bot components")?);
    let shutdown = CancellationToken::new();
    let poll_interval = Duration::from_secs(cfg.bluesky.poll_interval_secs.max(1));

    let mut tasks = Vec::new();
    for account in &cfg.bluesky.accounts {
        let client = Arc::new(BlueskyClient::new(&cfg.bluesky.api_base, &account.handle, &account.password));
        client
            .login()
            .await
            .with_context(|| format!("Failed to log in as {}", account.handle))?;
        let runner = AccountRunner::new(client, Arc::clone(&components), poll_interval);
        tasks.push(tokio::spawn(runner.run(shutdown.clone())));
    }

    #[cfg(feature = "web")]
    {
        let state = bbb::server::ServerState {
            orchestrator: components.dispatcher.client(),
        };
        let port = cfg.server.port;
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = bbb::server::serve(state, port, token).await {
                tracing::error!("Result server failed: {}", e);
            }
        }));
    }

    wait_for_signal().await;
    tracing::info!("Shutting down, in-flight jobs will not be awaited");
    shutdown.cancel();

    for result in futures_util::future::join_all(tasks).await {
        if let Err(e) = result {
            tracing::warn!("Task ended abnormally: {}", e);
        }
    }
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
