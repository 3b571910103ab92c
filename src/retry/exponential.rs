use super::{RetryPolicy, within_limit};
use crate::error::InstancerError;
use std::time::Duration;

/// 指数退避重试策略
pub struct ExponentialBackoffPolicy {
    max_attempts: Option<usize>,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: Option<usize>, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn should_retry(&self, attempt: usize, error: &InstancerError) -> bool {
        if !within_limit(self.max_attempts, attempt) {
            return false;
        }

        // 只对可重试的错误进行重试
        error.is_transient()
    }

    fn backoff_duration(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10) as u32;
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(1 << exponent);
        let delay = Duration::from_millis(delay_ms);
        delay.min(self.max_delay)
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}
