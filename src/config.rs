//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BBB__*` 覆盖（双下划线表示嵌套，如 `BBB__ORCHESTRATOR__HOST=localhost`）。
//! 最后对单账号部署兼容旧的扁平变量：BLUESKY_USER / BLUESKY_PASS / BACALHAU_HOST / BACALHAU_PORT /
//! BACALHAU_API_KEY / GANCHO_ENDPOINT / GANCHO_KEY。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::BotError;

/// Bacalhau 默认 API 端口
pub const DEFAULT_ORCHESTRATOR_PORT: u16 = 1234;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bluesky: BlueskySection,
    pub orchestrator: OrchestratorSection,
    pub recognizer: RecognizerSection,
    pub storage: StorageSection,
    pub shortener: ShortenerSection,
    pub ledger: LedgerSection,
    pub server: ServerSection,
    pub tasks: TasksSection,
}

/// [bluesky] 段：API 地址、轮询间隔、机器人账号
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlueskySection {
    pub api_base: String,
    pub poll_interval_secs: u64,
    pub accounts: Vec<AccountSection>,
}

impl Default for BlueskySection {
    fn default() -> Self {
        Self {
            api_base: "https://bsky.social/xrpc".to_string(),
            poll_interval_secs: 10,
            accounts: Vec::new(),
        }
    }
}

/// [[bluesky.accounts]]：handle + 应用密码
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSection {
    pub handle: String,
    pub password: String,
}

/// [orchestrator] 段：Bacalhau 地址、安全模式、等待窗口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub host: Option<String>,
    /// 未设置时使用 1234
    pub port: Option<u16>,
    /// true 时走 https 并用 api_key 换取 Bearer token
    pub secure: bool,
    pub api_key: Option<String>,
    pub auth_path: String,
    /// 首次查询结果前的等待秒数（轮询间隔相同）
    pub wait_secs: u64,
    /// 按指令名覆盖等待秒数，如 alt_text = 10
    pub wait_overrides: HashMap<String, u64>,
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            secure: false,
            api_key: None,
            auth_path: "/api/v1/auth/shared_secret".to_string(),
            wait_secs: 30,
            wait_overrides: HashMap::from([
                ("alt_text".to_string(), 10),
                ("community".to_string(), 20),
            ]),
            request_timeout_secs: 30,
        }
    }
}

/// [recognizer] 段：账号级覆盖规则（正则匹配机器人自己的 handle）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognizerSection {
    pub alt_text_account_pattern: String,
    pub community_account_pattern: String,
}

impl Default for RecognizerSection {
    fn default() -> Self {
        Self {
            alt_text_account_pattern: "(?i)^alt-?text".to_string(),
            community_account_pattern: "(?i)^community".to_string(),
        }
    }
}

/// [storage] 段：对象存储；未设置 endpoint 时不上传，结果直接内联
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub public_base_url: Option<String>,
    pub token: Option<String>,
    /// stdout 不超过该字符数时直接写进回复
    pub inline_limit: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: "bbb-results".to_string(),
            public_base_url: None,
            token: None,
            inline_limit: 200,
        }
    }
}

/// [shortener] 段：Gancho 短链服务；没有 key 时不缩短
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShortenerSection {
    pub endpoint: String,
    pub key: Option<String>,
}

impl Default for ShortenerSection {
    fn default() -> Self {
        Self {
            endpoint: "https://go.cod.dev".to_string(),
            key: None,
        }
    }
}

/// [ledger] 段：已回复记录文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub path: PathBuf,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("responded_to.txt"),
        }
    }
}

/// [server] 段：健康检查与结果页端口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// [tasks] 段：同时处理的 mention 上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    pub max_concurrent: usize,
}

impl Default for TasksSection {
    fn default() -> Self {
        Self { max_concurrent: 16 }
    }
}

/// 校验后的 Bacalhau 连接配置，由 JobDispatcher / HttpOrchestrator 的构造函数接收
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub api_key: Option<String>,
    pub auth_path: String,
    pub request_timeout: Duration,
}

impl OrchestratorConfig {
    /// scheme://host:port
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl OrchestratorSection {
    /// host 必填；secure 模式下 api_key 必填；端口缺省为 1234
    pub fn validate(&self) -> Result<OrchestratorConfig, BotError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BotError::Config("orchestrator.host is not set".to_string()))?;

        let api_key = self.api_key.clone().filter(|k| !k.trim().is_empty());
        if self.secure && api_key.is_none() {
            return Err(BotError::Config(
                "orchestrator.api_key is required when orchestrator.secure = true".to_string(),
            ));
        }

        Ok(OrchestratorConfig {
            host: host.to_string(),
            port: self.port.unwrap_or(DEFAULT_ORCHESTRATOR_PORT),
            secure: self.secure,
            api_key,
            auth_path: self.auth_path.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        })
    }
}

/// 从 config 目录加载配置，环境变量 BBB__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 BBB__*（双下划线表示嵌套键）
/// 4. 补上旧版扁平环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BBB")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    apply_legacy_env(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// 旧版扁平变量只填补空缺，不覆盖 TOML / BBB__* 中已有的值
pub fn apply_legacy_env(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if cfg.bluesky.accounts.is_empty() {
        if let (Some(handle), Some(password)) = (get("BLUESKY_USER"), get("BLUESKY_PASS")) {
            cfg.bluesky.accounts.push(AccountSection { handle, password });
        }
    }

    let orch = &mut cfg.orchestrator;
    if orch.host.is_none() {
        orch.host = get("BACALHAU_HOST");
    }
    if orch.port.is_none() {
        orch.port = get("BACALHAU_PORT").and_then(|p| p.trim().parse().ok());
    }
    if orch.api_key.is_none() {
        orch.api_key = get("BACALHAU_API_KEY");
    }

    if cfg.shortener.endpoint == ShortenerSection::default().endpoint {
        if let Some(endpoint) = get("GANCHO_ENDPOINT") {
            cfg.shortener.endpoint = endpoint;
        }
    }
    if cfg.shortener.key.is_none() {
        cfg.shortener.key = get("GANCHO_KEY");
    }
}
