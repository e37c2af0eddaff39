//! 传输层抽象
//!
//! 管理器本身不实现网络 IO，只依赖一个"传输能力"：给定主机和端口建立双工
//! 字节流，并通过 `SignalSink` 回报生命周期信号。
//!
//! 实现者需要遵守的约定：
//! - 连接成功时先发送 `Opened`，之后才能发送其他信号；
//! - 每条传输最多发送一个终止信号：`Ended`、`TimedOut` 或 `Closed`；
//! - `Errored` 不是终止信号，随后必须跟一个 `Closed(Some(..))`；
//! - 调用 `TransportHandle::end` 之后不再需要发送任何信号。

pub mod tcp;

use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::error::TransportError;

pub use tcp::{TcpOptions, TokioTcpConnector};

/// 已建立连接的句柄
pub trait TransportHandle: Send + Sync + std::fmt::Debug + 'static {
    /// 写入数据，返回实际接受的字节数（可能小于 `data.len()`）
    fn write(&self, data: Bytes) -> Result<usize, TransportError>;

    /// 优雅关闭写方向并结束传输
    fn end(&self);

    /// 对端地址描述
    fn peer(&self) -> String;
}

/// 传输回报的生命周期信号
#[derive(Debug, Clone)]
pub enum TransportSignal {
    /// 连接已建立
    Opened(Arc<dyn TransportHandle>),
    /// 连接建立失败
    ConnectFailed(TransportError),
    /// 收到数据
    Data(Bytes),
    /// 写缓冲区已清空
    Drained,
    /// 对端关闭（EOF）
    Ended,
    /// 传输出错（随后会有 `Closed`）
    Errored(TransportError),
    /// 空闲超时
    TimedOut,
    /// 传输已关闭
    Closed(Option<TransportError>),
}

impl TransportSignal {
    /// 是否为终止信号
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportSignal::ConnectFailed(_)
                | TransportSignal::Ended
                | TransportSignal::TimedOut
                | TransportSignal::Closed(_)
        )
    }
}

/// 带有来源标记的信号
#[derive(Debug)]
pub struct SignalEnvelope {
    pub name: Arc<str>,
    /// 连接代数，过期代数的信号会被丢弃
    pub epoch: u64,
    pub signal: TransportSignal,
}

/// 信号发送端，每次连接尝试一个
#[derive(Debug, Clone)]
pub struct SignalSink {
    name: Arc<str>,
    epoch: u64,
    tx: mpsc::UnboundedSender<SignalEnvelope>,
}

impl SignalSink {
    pub fn new(name: Arc<str>, epoch: u64, tx: mpsc::UnboundedSender<SignalEnvelope>) -> Self {
        Self { name, epoch, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 发送信号，接收方已关闭时返回 `false`
    pub fn send(&self, signal: TransportSignal) -> bool {
        let envelope = SignalEnvelope {
            name: self.name.clone(),
            epoch: self.epoch,
            signal,
        };
        self.tx.send(envelope).is_ok()
    }

    pub fn opened(&self, handle: Arc<dyn TransportHandle>) -> bool {
        self.send(TransportSignal::Opened(handle))
    }

    pub fn connect_failed(&self, error: TransportError) -> bool {
        self.send(TransportSignal::ConnectFailed(error))
    }

    pub fn data(&self, data: Bytes) -> bool {
        self.send(TransportSignal::Data(data))
    }

    pub fn drained(&self) -> bool {
        self.send(TransportSignal::Drained)
    }

    pub fn ended(&self) -> bool {
        self.send(TransportSignal::Ended)
    }

    pub fn errored(&self, error: TransportError) -> bool {
        self.send(TransportSignal::Errored(error))
    }

    pub fn timed_out(&self) -> bool {
        self.send(TransportSignal::TimedOut)
    }

    pub fn closed(&self, error: Option<TransportError>) -> bool {
        self.send(TransportSignal::Closed(error))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 传输能力：建立到 (host, port) 的连接
///
/// 成功时实现者必须已经通过 `sink.opened(..)` 交出句柄；失败时返回错误，
/// 由调用方转成 `ConnectFailed`。
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &EndpointConfig, sink: SignalSink) -> Result<(), TransportError>;
}
