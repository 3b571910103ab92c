use super::{RetryPolicy, within_limit};
use crate::error::InstancerError;
use std::time::Duration;

/// 固定延迟重试策略
pub struct FixedRetryPolicy {
    max_attempts: Option<usize>,
    delay: Duration,
}

impl FixedRetryPolicy {
    pub fn new(max_attempts: Option<usize>, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl RetryPolicy for FixedRetryPolicy {
    fn should_retry(&self, attempt: usize, error: &InstancerError) -> bool {
        if !within_limit(self.max_attempts, attempt) {
            return false;
        }

        error.is_transient()
    }

    fn backoff_duration(&self, _attempt: usize) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}
