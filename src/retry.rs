//! 重连调度
//!
//! 策略决定第 N 次失败后的等待时间；`RetryTimer` 是一次性的可取消定时器，
//! 每个连接同一时间最多只有一个。

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 重连策略
pub trait RetryPolicy: Send + Sync + std::fmt::Debug + 'static {
    /// `retry_count` 为本次失败之后的计数（从 1 开始），返回 `None` 表示放弃重连
    fn next_delay(&self, retry_count: u32) -> Option<Duration>;
}

/// 固定间隔，默认无限重试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, max_retries: None }
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RETRY_INTERVAL)
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, retry_count: u32) -> Option<Duration> {
        match self.max_retries {
            Some(max) if retry_count > max => None,
            _ => Some(self.delay),
        }
    }
}

/// 指数退避
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_retries: Option<u32>,
}

impl ExponentialBackoff {
    /// 倍数必须是正的有限值，否则按 1.0 处理
    pub fn new(initial: Duration, max: Duration, multiplier: f64, max_retries: Option<u32>) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier
        } else {
            tracing::warn!("⚠️ 无效的退避倍数 {}，改用 1.0", multiplier);
            1.0
        };

        Self {
            initial,
            max,
            multiplier,
            max_retries,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, retry_count: u32) -> Option<Duration> {
        if let Some(max) = self.max_retries {
            if retry_count > max {
                return None;
            }
        }

        let exponent = retry_count.saturating_sub(1).min(64) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return Some(self.max);
        }
        Some(Duration::try_from_secs_f64(secs).unwrap_or(self.max))
    }
}

/// 一次性重连定时器
///
/// 被取消或被丢弃后回调不会执行。回调执行前仍可能已被取消，因此接收方还要
/// 再核对一次 `generation`。
#[derive(Debug)]
pub struct RetryTimer {
    generation: u64,
    delay: Duration,
    token: CancellationToken,
}

impl RetryTimer {
    /// 启动定时器，`delay` 后调用 `on_fire`
    pub fn arm<F>(generation: u64, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !child.is_cancelled() {
                        on_fire();
                    }
                }
            }
        });

        Self {
            generation,
            delay,
            token,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
