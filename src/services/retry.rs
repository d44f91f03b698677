//! 重试策略 - 业务能力层
//!
//! 只作用于单次外部调用，从不包住整条流水线

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// 有界重试 + 指数退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次重试前的等待
    pub base_delay: Duration,
    /// 单次等待上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// 执行 `op`，错误满足 `is_retryable` 时退避后重试
    ///
    /// 不可重试的错误或重试耗尽时返回最后一次的错误
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} 失败 (尝试 {}/{}): {}，{:?} 后重试...",
                        label, attempt, max_attempts, err, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(40), policy.max_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(500));

        let result: Result<u32, TestError> = policy
            .run(
                "test",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(TestError::Transient)
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |e| matches!(e, TestError::Transient),
            )
            .await;

        assert_eq!(assert_ok!(result), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        let result: Result<(), TestError> = policy
            .run(
                "test",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Transient) }
                },
                |e| matches!(e, TestError::Transient),
            )
            .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), TestError> = policy
            .run(
                "test",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Permanent) }
                },
                |e| matches!(e, TestError::Transient),
            )
            .await;

        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
