use std::time::Duration;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::framing::{DecodedFrame, FrameValue};

/// 事件种类
///
/// 每个 (连接名, 事件种类) 最多对应一个处理器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Connecting,
    Connected,
    Error,
    Disconnected,
    Drain,
    RetryScheduled,
    Receive,
    End,
    Timeout,
    Transmit,
    ConnectionClosed,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Connecting,
        EventKind::Connected,
        EventKind::Error,
        EventKind::Disconnected,
        EventKind::Drain,
        EventKind::RetryScheduled,
        EventKind::Receive,
        EventKind::End,
        EventKind::Timeout,
        EventKind::Transmit,
        EventKind::ConnectionClosed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connecting => "connecting",
            EventKind::Connected => "connected",
            EventKind::Error => "error",
            EventKind::Disconnected => "disconnected",
            EventKind::Drain => "drain",
            EventKind::RetryScheduled => "retryScheduled",
            EventKind::Receive => "receive",
            EventKind::End => "end",
            EventKind::Timeout => "timeout",
            EventKind::Transmit => "transmit",
            EventKind::ConnectionClosed => "connectionClosed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条解码完成的消息
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    /// 解码后的值
    pub data: FrameValue,
    /// 原始字节
    pub raw: Bytes,
    /// 产生时间
    pub timestamp: DateTime<Utc>,
    /// 所属连接
    pub connection: String,
}

impl ParsedFrame {
    pub fn new(connection: &str, frame: DecodedFrame) -> Self {
        Self {
            data: frame.value,
            raw: frame.raw,
            timestamp: Utc::now(),
            connection: connection.to_string(),
        }
    }
}

/// 连接事件，每个变体携带各自的负载
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    Error(TransportError),
    /// 连接断开，`None` 表示没有错误
    Disconnected(Option<TransportError>),
    /// 写缓冲区已清空
    Drain,
    RetryScheduled { delay: Duration, retry_count: u32 },
    Receive(ParsedFrame),
    /// 对端关闭写方向
    End,
    Timeout,
    Transmit { bytes_written: usize },
    ConnectionClosed,
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::Connecting => EventKind::Connecting,
            ConnectionEvent::Connected => EventKind::Connected,
            ConnectionEvent::Error(_) => EventKind::Error,
            ConnectionEvent::Disconnected(_) => EventKind::Disconnected,
            ConnectionEvent::Drain => EventKind::Drain,
            ConnectionEvent::RetryScheduled { .. } => EventKind::RetryScheduled,
            ConnectionEvent::Receive(_) => EventKind::Receive,
            ConnectionEvent::End => EventKind::End,
            ConnectionEvent::Timeout => EventKind::Timeout,
            ConnectionEvent::Transmit { .. } => EventKind::Transmit,
            ConnectionEvent::ConnectionClosed => EventKind::ConnectionClosed,
        }
    }

    /// 判断是否为生命周期事件
    pub fn is_lifecycle_event(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::Connecting
                | ConnectionEvent::Connected
                | ConnectionEvent::Disconnected(_)
                | ConnectionEvent::End
                | ConnectionEvent::Timeout
                | ConnectionEvent::ConnectionClosed
        )
    }

    /// 判断是否为错误事件
    pub fn is_error_event(&self) -> bool {
        matches!(self, ConnectionEvent::Error(_))
    }
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionEvent::Error(error) => write!(f, "error {}", error),
            ConnectionEvent::Disconnected(Some(error)) => write!(f, "disconnected {}", error),
            ConnectionEvent::RetryScheduled { delay, retry_count } => {
                write!(f, "retryScheduled in {:?} (attempt {})", delay, retry_count)
            }
            ConnectionEvent::Receive(frame) => write!(f, "receive {} bytes", frame.raw.len()),
            ConnectionEvent::Transmit { bytes_written } => write!(f, "transmit {} bytes", bytes_written),
            other => f.write_str(other.kind().as_str()),
        }
    }
}
