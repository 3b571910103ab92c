//! 重试策略模块
//!
//! 注册中心订阅在阻塞查询失败时使用这里的策略决定是否重试以及退避多久

pub mod exponential;
pub mod fixed;

pub use exponential::ExponentialBackoffPolicy;
pub use fixed::FixedRetryPolicy;

use crate::error::InstancerError;
use std::time::Duration;

/// 重试策略 trait
///
/// `attempt` 为连续失败次数（从 1 开始），成功一次后调用方会将其归零
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, attempt: usize, error: &InstancerError) -> bool;
    fn backoff_duration(&self, attempt: usize) -> Duration;
    /// 最大连续失败次数，`None` 表示无限重试
    fn max_attempts(&self) -> Option<usize>;
}

/// 检查连续失败次数是否仍在上限之内
pub(crate) fn within_limit(max_attempts: Option<usize>, attempt: usize) -> bool {
    max_attempts.is_none_or(|max| attempt <= max)
}
