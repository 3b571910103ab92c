//! 注册中心订阅抽象
//!
//! 订阅（`Subscription`）是一个长期运行的 watch：注册中心中匹配实例的视图每发生一次变化，
//! 就调用一次回调。回调收到的负载是不透明的 JSON，由调用方自行校验形状。
//! 提供 Consul 阻塞查询实现和一个可编程驱动的 `ManualFeed`。

pub mod consul;
pub mod entry;
pub mod manual;
pub mod params;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

pub use consul::{ConsulClient, ConsulSubscription};
pub use entry::{AgentService, HealthCheck, Node, ServiceEntry, endpoints_from_payload};
pub use manual::{ManualFeed, ManualSubscription};
pub use params::WatchParams;

/// 一次变更投递
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    /// 注册中心索引（Consul 的 `X-Consul-Index`）
    pub index: u64,
    /// 原始负载，正常情况下是服务实例描述数组
    pub payload: serde_json::Value,
}

/// 变更回调
///
/// 同一订阅的回调串行调用，不会并发
pub type ChangeHandler<'a> = &'a (dyn Fn(WatchEvent) + Send + Sync);

/// 注册中心订阅
#[async_trait]
pub trait Subscription: Send + Sync {
    /// 运行订阅直到停止
    ///
    /// 调用 `stop` 后返回 `Ok(())`；无法恢复的失败返回 `Err`
    async fn run(&self, on_change: ChangeHandler<'_>) -> Result<()>;

    /// 请求停止，可重复调用
    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// 已连接的注册中心客户端
pub trait RegistryFeed: Send + Sync {
    /// 为给定参数创建订阅（不启动）
    fn subscribe(&self, params: &WatchParams) -> Result<Arc<dyn Subscription>>;
}
