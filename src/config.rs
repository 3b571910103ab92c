use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// 默认的 Consul HTTP 地址
pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub consul: ConsulConfig,
    pub instancer: InstancerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Consul 客户端配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsulConfig {
    #[serde(default = "default_consul_address")]
    pub address: String,
    pub token: Option<String>,
    pub datacenter: Option<String>,
    /// 阻塞查询的最长等待时间（秒）
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    /// 首次失败后的退避基数（毫秒）
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// 退避上限（毫秒）
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// 允许的最大连续失败次数，未设置时无限重试
    pub max_failures: Option<usize>,
    /// 单次请求超时（秒），未设置时为 wait_secs 加上 Consul 的抖动余量
    pub request_timeout_secs: Option<u64>,
}

fn default_consul_address() -> String {
    DEFAULT_CONSUL_ADDRESS.to_string()
}

fn default_wait_secs() -> u64 {
    300
}

fn default_retry_base_ms() -> u64 {
    5_000
}

fn default_retry_max_ms() -> u64 {
    180_000
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: default_consul_address(),
            token: None,
            datacenter: None,
            wait_secs: default_wait_secs(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            max_failures: None,
            request_timeout_secs: None,
        }
    }
}

impl ConsulConfig {
    /// 从环境变量创建配置（`CONSUL_HTTP_ADDR`、`CONSUL_HTTP_TOKEN`）
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// 使用环境变量覆盖地址和令牌
    pub fn apply_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("CONSUL_HTTP_ADDR") {
            let addr = addr.trim();
            if !addr.is_empty() {
                self.address = normalize_address(addr);
            }
        }
        if let Ok(token) = std::env::var("CONSUL_HTTP_TOKEN") {
            let token = token.trim();
            if !token.is_empty() {
                self.token = Some(token.to_string());
            }
        }
        self
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Consul 会在 wait 上叠加最多 wait/16 的随机抖动，超时需要留出余量
    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.wait() + self.wait() / 16 + Duration::from_secs(5),
        }
    }
}

/// 补全缺失的协议前缀（`CONSUL_HTTP_ADDR` 常以 `host:port` 形式给出）
pub fn normalize_address(addr: &str) -> String {
    let addr = addr.trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

/// 订阅意外终止时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// 终止进程，避免继续使用过期的实例列表
    #[default]
    Abort,
    /// 标记为已终止，之后的读取返回 `InstancerError::Terminated`
    MarkTerminated,
}

/// 实例跟踪器配置
///
/// `service`、`tag`、`passing_only`、`allow_stale` 共同构成服务标识，创建后不可变
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InstancerConfig {
    /// 要跟踪的服务名（必填）
    pub service: String,
    /// 仅考虑带有该标签的实例
    #[serde(default)]
    pub tag: Option<String>,
    /// 仅考虑健康检查通过的实例，绝大多数情况下应为 true
    #[serde(default)]
    pub passing_only: bool,
    /// 允许任意 Consul server 响应查询，否则所有查询都发往 leader
    #[serde(default)]
    pub allow_stale: bool,
    #[serde(default)]
    pub on_termination: TerminationPolicy,
    /// 日志 span，未提供时使用 `instancer` span
    #[serde(skip)]
    pub logger: Option<tracing::Span>,
}

impl InstancerConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_passing_only(mut self, passing_only: bool) -> Self {
        self.passing_only = passing_only;
        self
    }

    pub fn with_allow_stale(mut self, allow_stale: bool) -> Self {
        self.allow_stale = allow_stale;
        self
    }

    pub fn with_termination_policy(mut self, policy: TerminationPolicy) -> Self {
        self.on_termination = policy;
        self
    }

    pub fn with_logger(mut self, span: tracing::Span) -> Self {
        self.logger = Some(span);
        self
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` 指令，`RUST_LOG` 优先
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}
