use std::time::Duration;
use serde::Serialize;

/// 传输结束原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    /// 对端正常关闭（收到 EOF）
    Normal,
    /// 空闲超时
    Timeout,
    /// 传输错误
    Error(String),
    /// 被本地强制关闭
    Forced,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Normal => write!(f, "closed by peer"),
            CloseReason::Timeout => write!(f, "idle timeout"),
            CloseReason::Error(reason) => write!(f, "error: {}", reason),
            CloseReason::Forced => write!(f, "forced"),
        }
    }
}

/// 统一传输错误类型
///
/// 所有错误都通过事件回调交给调用方，`connect`/`disconnect` 从不返回错误，
/// `write` 只返回布尔值。
#[derive(Debug, thiserror::Error, Clone, PartialEq, Serialize)]
pub enum TransportError {
    /// 连接失败或连接中途出错
    #[error("Connection error: {reason} (retryable: {retryable})")]
    Connection {
        reason: String,
        retryable: bool,
    },

    /// 超时（空闲超时或连接超时）
    #[error("Operation '{operation}' timeout after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// 资源超限（接收缓冲区溢出）
    #[error("Resource '{resource}' exceeded: current {current}, limit {limit}")]
    Resource {
        resource: String,
        current: usize,
        limit: usize,
    },

    /// 写入失败
    #[error("Write error: {reason}")]
    Write {
        reason: String,
    },

    /// 传输被关闭
    #[error("Stream closed: {reason}")]
    Closed {
        reason: CloseReason,
    },

    /// 配置相关错误
    #[error("Configuration error in field '{field}': {reason}")]
    Configuration {
        field: String,
        reason: String,
    },

    /// 分帧策略执行失败（自定义策略 panic）
    #[error("Framing error in '{strategy}': {reason}")]
    Framing {
        strategy: String,
        reason: String,
    },

    /// 管理器已销毁
    #[error("Factory has been shut down")]
    Shutdown,
}

impl TransportError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection { retryable, .. } => *retryable,
            TransportError::Timeout { .. } => true,
            TransportError::Resource { .. } => true,
            TransportError::Closed { .. } => true,
            // 写入失败由调用方决定是否重发
            TransportError::Write { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Framing { .. } => false,
            TransportError::Shutdown => false,
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> &'static str {
        match self {
            TransportError::Connection { .. } => "CONNECTION_ERROR",
            TransportError::Timeout { .. } => "TIMEOUT_ERROR",
            TransportError::Resource { .. } => "RESOURCE_ERROR",
            TransportError::Write { .. } => "WRITE_ERROR",
            TransportError::Closed { .. } => "CLOSED",
            TransportError::Configuration { .. } => "CONFIG_ERROR",
            TransportError::Framing { .. } => "FRAMING_ERROR",
            TransportError::Shutdown => "SHUTDOWN",
        }
    }

    /// 是否为缓冲区溢出
    pub fn is_buffer_overflow(&self) -> bool {
        matches!(self, TransportError::Resource { resource, .. } if resource == RECEIVE_BUFFER)
    }

    /// 添加连接名上下文
    pub fn with_connection(mut self, name: &str) -> Self {
        match &mut self {
            TransportError::Connection { reason, .. } | TransportError::Write { reason } => {
                if !reason.contains("connection:") {
                    *reason = format!("{} (connection: {})", reason, name);
                }
            }
            _ => {}
        }
        self
    }
}

pub(crate) const RECEIVE_BUFFER: &str = "receive_buffer";

/// 便利构造函数
impl TransportError {
    /// 创建连接错误
    pub fn connection_error(reason: impl Into<String>, retryable: bool) -> Self {
        Self::Connection {
            reason: reason.into(),
            retryable,
        }
    }

    /// 创建超时错误
    pub fn timeout_error(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// 创建缓冲区溢出错误
    pub fn buffer_overflow(current: usize, limit: usize) -> Self {
        Self::Resource {
            resource: RECEIVE_BUFFER.to_string(),
            current,
            limit,
        }
    }

    /// 创建写入错误
    pub fn write_error(reason: impl Into<String>) -> Self {
        Self::Write {
            reason: reason.into(),
        }
    }

    /// 创建关闭错误
    pub fn closed(reason: CloseReason) -> Self {
        Self::Closed { reason }
    }

    /// 创建分帧错误
    pub fn framing_error(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Framing {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// 创建配置错误
    pub fn config_error(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 从标准IO错误转换
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        let retryable = matches!(
            error.kind(),
            std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::AddrNotAvailable
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::NotFound
                | std::io::ErrorKind::UnexpectedEof
        );

        TransportError::Connection {
            reason: format!("IO error: {}", error),
            retryable,
        }
    }
}

impl From<crate::config::ConfigError> for TransportError {
    fn from(error: crate::config::ConfigError) -> Self {
        match error {
            crate::config::ConfigError::InvalidValue { field, reason, .. } => {
                TransportError::Configuration { field, reason }
            }
            other => TransportError::Configuration {
                field: "config".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
