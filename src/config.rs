//! 配置系统
//!
//! 进程级参数放在 `FactoryConfig`，单个连接的目标地址、分帧策略和事件处理器
//! 放在 `ConnectionConfig`。

use std::sync::Arc;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::dispatch::{ConnectionAccess, EventHandlers};
use crate::event::{ConnectionEvent, EventKind, ParsedFrame};
use crate::error::TransportError;
use crate::framing::FrameDelimiter;
use crate::retry::{ExponentialBackoff, FixedDelay, RetryPolicy};

/// 默认接收缓冲区上限：1 MiB
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;
/// 默认重连间隔：5000 ms
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5000);

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {value}\nReason: {reason}\nSuggestion: {suggestion}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
        suggestion: String,
    },

    #[error("Invalid port {port}: {reason}\nSuggestion: Use a port between 1 and 65535")]
    InvalidPort {
        port: u32,
        reason: String,
    },

    #[error("Missing required field '{field}'\nSuggestion: {suggestion}")]
    MissingRequiredField {
        field: String,
        suggestion: String,
    },
}

/// 缓冲区溢出后的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 断开传输并按失败处理，进入重连流程
    #[default]
    Reconnect,
    /// 等同于手动 `disconnect`，不再自动重连
    Disconnect,
}

/// 重连配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 重试间隔
    pub retry_interval: Duration,
    /// 最大重试次数，`None` 表示无限重试
    pub max_retries: Option<u32>,
    /// 指数退避系数，`<= 1.0` 时为固定间隔
    pub backoff_multiplier: f64,
    /// 最大重试间隔
    pub max_retry_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: None,
            backoff_multiplier: 1.0,
            max_retry_interval: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_retry_interval = max_interval;
        self
    }

    /// 根据配置生成重连策略
    pub fn build_policy(&self) -> Arc<dyn RetryPolicy> {
        if self.backoff_multiplier > 1.0 {
            Arc::new(ExponentialBackoff::new(
                self.retry_interval,
                self.max_retry_interval,
                self.backoff_multiplier,
                self.max_retries,
            ))
        } else {
            Arc::new(FixedDelay::new(self.retry_interval).with_max_retries(self.max_retries))
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "retry_interval".to_string(),
                value: "0".to_string(),
                reason: "a zero delay turns an unreachable host into a busy loop".to_string(),
                suggestion: "use at least a few milliseconds".to_string(),
            });
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "must be a positive finite number".to_string(),
                suggestion: "use 1.0 for a fixed delay".to_string(),
            });
        }

        if self.max_retry_interval < self.retry_interval {
            return Err(ConfigError::InvalidValue {
                field: "max_retry_interval".to_string(),
                value: format!("{:?}", self.max_retry_interval),
                reason: "must not be shorter than retry_interval".to_string(),
                suggestion: "raise max_retry_interval".to_string(),
            });
        }

        Ok(())
    }
}

/// 管理器级配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// 每个连接接收缓冲区的最大字节数
    pub max_buffer_size: usize,
    /// 重连配置
    pub retry: RetryConfig,
    /// 缓冲区溢出策略
    pub overflow_policy: OverflowPolicy,
    /// 连接超时时间
    pub connect_timeout: Option<Duration>,
    /// 空闲超时时间（无读写活动）
    pub idle_timeout: Option<Duration>,
    /// 写缓冲区预算（字节），超出部分不会被接受
    pub write_buffer_size: usize,
    /// TCP_NODELAY选项
    pub nodelay: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            retry: RetryConfig::default(),
            overflow_policy: OverflowPolicy::default(),
            connect_timeout: Some(Duration::from_secs(10)),
            idle_timeout: None,
            write_buffer_size: 256 * 1024,
            nodelay: true,
        }
    }
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置缓冲区上限
    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// 设置重连配置
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 设置固定重连间隔
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry.retry_interval = interval;
        if self.retry.max_retry_interval < interval {
            self.retry.max_retry_interval = interval;
        }
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_buffer_size".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
                suggestion: "set a positive value".to_string(),
            });
        }

        if self.write_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "write_buffer_size".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
                suggestion: "set a positive value".to_string(),
            });
        }

        for (field, timeout) in [("connect_timeout", self.connect_timeout), ("idle_timeout", self.idle_timeout)] {
            if timeout == Some(Duration::ZERO) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "a zero timeout fires immediately".to_string(),
                    suggestion: "use None to disable the timeout".to_string(),
                });
            }
        }

        self.retry.validate()
    }
}

/// 连接目标（可序列化部分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// 逻辑名称，在同一个管理器内唯一
    pub name: String,
    /// 目标主机
    pub hostname: String,
    /// 目标端口
    pub port: u16,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            port,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingRequiredField {
                field: "name".to_string(),
                suggestion: "give every connection a unique name".to_string(),
            });
        }

        if self.hostname.is_empty() {
            return Err(ConfigError::MissingRequiredField {
                field: "hostname".to_string(),
                suggestion: "set the target host, e.g. \"localhost\"".to_string(),
            });
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort {
                port: 0,
                reason: "port 0 cannot be a connect target".to_string(),
            });
        }

        Ok(())
    }

    /// `host:port` 形式的目标地址
    pub fn target(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// 单个连接的完整配置
///
/// 注册后不可变，由管理器持有直到注销。
#[derive(Clone)]
pub struct ConnectionConfig {
    pub endpoint: EndpointConfig,
    pub delimiter: Arc<dyn FrameDelimiter>,
    pub handlers: EventHandlers,
}

impl ConnectionConfig {
    pub fn new<D>(name: impl Into<String>, hostname: impl Into<String>, port: u16, delimiter: D) -> Self
    where
        D: FrameDelimiter,
    {
        Self::from_endpoint(EndpointConfig::new(name, hostname, port), delimiter)
    }

    pub fn from_endpoint<D: FrameDelimiter>(endpoint: EndpointConfig, delimiter: D) -> Self {
        Self {
            endpoint,
            delimiter: Arc::new(delimiter),
            handlers: EventHandlers::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    /// 注册某类事件的处理器，同一事件重复注册时后者覆盖前者
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&ConnectionAccess, &ConnectionEvent) + Send + Sync + 'static,
    {
        self.handlers.set(kind, handler);
        self
    }

    pub fn on_connected<F>(self, handler: F) -> Self
    where
        F: Fn(&ConnectionAccess) + Send + Sync + 'static,
    {
        self.on(EventKind::Connected, move |access, _| handler(access))
    }

    pub fn on_receive<F>(self, handler: F) -> Self
    where
        F: Fn(&ConnectionAccess, &ParsedFrame) + Send + Sync + 'static,
    {
        self.on(EventKind::Receive, move |access, event| {
            if let ConnectionEvent::Receive(frame) = event {
                handler(access, frame);
            }
        })
    }

    pub fn on_error<F>(self, handler: F) -> Self
    where
        F: Fn(&ConnectionAccess, &TransportError) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, move |access, event| {
            if let ConnectionEvent::Error(error) = event {
                handler(access, error);
            }
        })
    }

    pub fn on_disconnected<F>(self, handler: F) -> Self
    where
        F: Fn(&ConnectionAccess, Option<&TransportError>) + Send + Sync + 'static,
    {
        self.on(EventKind::Disconnected, move |access, event| {
            if let ConnectionEvent::Disconnected(error) = event {
                handler(access, error.as_ref());
            }
        })
    }

    pub fn on_retry_scheduled<F>(self, handler: F) -> Self
    where
        F: Fn(&ConnectionAccess, Duration, u32) + Send + Sync + 'static,
    {
        self.on(EventKind::RetryScheduled, move |access, event| {
            if let ConnectionEvent::RetryScheduled { delay, retry_count } = event {
                handler(access, *delay, *retry_count);
            }
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint.validate()
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("delimiter", &self.delimiter.name())
            .field("handlers", &self.handlers)
            .finish()
    }
}
