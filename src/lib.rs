//! Flare Instancer
//!
//! 客户端服务实例跟踪：订阅 Consul 中某个服务的健康实例，维护本地缓存的端点列表，
//! 提供线程安全的轮询选择，并向监听器推送实例变化。

pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod instancer;
pub mod logging;
pub mod retry;

// Re-exports
pub use config::{Config, ConsulConfig, InstancerConfig, LogConfig, LogFormat, TerminationPolicy};
pub use discovery::{
    ConsulClient, ManualFeed, RegistryFeed, ServiceEntry, Subscription, WatchEvent, WatchParams,
};
pub use error::{InstancerError, Result};
pub use health::FeedStatus;
pub use instancer::{InstanceListener, Instancer, Selector};
pub use retry::{ExponentialBackoffPolicy, FixedRetryPolicy, RetryPolicy};
