//! Consul 注册中心订阅
//!
//! 基于 `/v1/health/service/<name>` 的阻塞查询实现 watch：
//! 携带上一次的 `X-Consul-Index` 发起请求，Consul 在实例视图变化或 wait 超时后返回。
//! 索引未变化时不投递；索引回退时重置为 0 并投递。

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConsulConfig;
use crate::discovery::{
    ChangeHandler, RegistryFeed, Subscription, WatchEvent, WatchParams, endpoints_from_payload,
};
use crate::error::{InstancerError, Result};
use crate::retry::{ExponentialBackoffPolicy, RetryPolicy};

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Consul HTTP 客户端
#[derive(Clone)]
pub struct ConsulClient {
    http_client: HttpClient,
    config: Arc<ConsulConfig>,
    retry: Arc<dyn RetryPolicy>,
}

impl ConsulClient {
    /// 创建新的 Consul 客户端
    pub fn new(config: ConsulConfig) -> Result<Self> {
        reqwest::Url::parse(&config.address).map_err(|e| {
            InstancerError::Config(format!("invalid consul address {}: {}", config.address, e))
        })?;

        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()?;

        let retry = Arc::new(ExponentialBackoffPolicy::new(
            config.max_failures,
            Duration::from_millis(config.retry_base_ms),
            Duration::from_millis(config.retry_max_ms),
        ));

        Ok(Self {
            http_client,
            config: Arc::new(config),
            retry,
        })
    }

    /// 替换订阅使用的重试策略
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = policy;
        self
    }

    pub fn address(&self) -> &str {
        self.config.address.trim_end_matches('/')
    }

    /// 执行一次阻塞查询
    ///
    /// `index` 为 0 时立即返回当前视图；返回新的索引和原始响应体
    pub async fn health_service(
        &self,
        params: &WatchParams,
        index: u64,
    ) -> Result<(u64, serde_json::Value)> {
        let url = format!("{}/v1/health/service/{}", self.address(), params.service);

        let mut query: Vec<(&str, String)> = vec![
            ("index", index.to_string()),
            ("wait", format!("{}s", self.config.wait_secs)),
        ];
        if params.passing_only {
            query.push(("passing", "true".to_string()));
        }
        for tag in &params.tags {
            query.push(("tag", tag.clone()));
        }
        if params.allow_stale {
            query.push(("stale", String::new()));
        }
        if let Some(dc) = params.datacenter.as_ref().or(self.config.datacenter.as_ref()) {
            query.push(("dc", dc.clone()));
        }

        let mut request = self.http_client.get(&url).query(&query);
        if let Some(token) = params.token.as_ref().or(self.config.token.as_ref()) {
            request = request.header(TOKEN_HEADER, token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InstancerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let new_index = resp
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| InstancerError::Watch(format!("missing {} header", INDEX_HEADER)))?;

        let body = resp.bytes().await?;
        let payload: serde_json::Value = serde_json::from_slice(&body)?;
        Ok((new_index, payload))
    }

    /// 查询一次当前实例端点（不阻塞等待变化）
    pub async fn endpoints(&self, params: &WatchParams) -> Result<Vec<String>> {
        let (_, payload) = self.health_service(params, 0).await?;
        endpoints_from_payload(&payload)
    }
}

impl RegistryFeed for ConsulClient {
    fn subscribe(&self, params: &WatchParams) -> Result<Arc<dyn Subscription>> {
        Ok(Arc::new(ConsulSubscription {
            client: self.clone(),
            params: params.clone(),
            cancel: CancellationToken::new(),
        }))
    }
}

/// Consul 服务 watch
pub struct ConsulSubscription {
    client: ConsulClient,
    params: WatchParams,
    cancel: CancellationToken,
}

#[async_trait]
impl Subscription for ConsulSubscription {
    async fn run(&self, on_change: ChangeHandler<'_>) -> Result<()> {
        let service = self.params.service.as_str();
        info!(
            service,
            address = self.client.address(),
            tags = ?self.params.tags,
            passing_only = self.params.passing_only,
            stale = self.params.allow_stale,
            "Consul watch started"
        );

        let mut last_index: Option<u64> = None;
        let mut failures = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let wait_index = last_index.unwrap_or(0);
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = self.client.health_service(&self.params, wait_index) => result,
            };

            match result {
                Ok((index, payload)) => {
                    failures = 0;
                    // Consul 要求索引至少为 1
                    let index = index.max(1);

                    if last_index == Some(index) {
                        debug!(service, index, "Consul index unchanged");
                        continue;
                    }

                    let next = match last_index {
                        Some(prev) if index < prev => {
                            info!(service, prev, index, "Consul index went backwards, resetting");
                            0
                        }
                        _ => index,
                    };
                    last_index = Some(next);

                    if self.cancel.is_cancelled() {
                        return Ok(());
                    }
                    on_change(WatchEvent { index, payload });
                }
                Err(err) => {
                    failures += 1;
                    if !self.client.retry.should_retry(failures, &err) {
                        error!(
                            service,
                            error = %err,
                            failures,
                            max_failures = ?self.client.retry.max_attempts(),
                            "Consul watch failed, giving up"
                        );
                        return Err(err);
                    }

                    let backoff = self.client.retry.backoff_duration(failures);
                    warn!(
                        service,
                        error = %err,
                        failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "Consul watch query failed, retrying"
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
