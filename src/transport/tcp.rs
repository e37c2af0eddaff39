use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{EndpointConfig, FactoryConfig};
use crate::error::TransportError;
use super::{Connector, SignalSink, TransportHandle};

/// TCP 传输选项
#[derive(Debug, Clone)]
pub struct TcpOptions {
    /// TCP_NODELAY选项
    pub nodelay: bool,
    /// 空闲超时（无读写活动）
    pub idle_timeout: Option<Duration>,
    /// 写缓冲区预算
    pub write_buffer_size: usize,
    /// 单次读取的缓冲区大小
    pub read_buffer_size: usize,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            idle_timeout: None,
            write_buffer_size: 256 * 1024,
            read_buffer_size: 8192,
        }
    }
}

impl From<&FactoryConfig> for TcpOptions {
    fn from(config: &FactoryConfig) -> Self {
        Self {
            nodelay: config.nodelay,
            idle_timeout: config.idle_timeout,
            write_buffer_size: config.write_buffer_size,
            ..Self::default()
        }
    }
}

/// 基于 tokio 的 TCP 连接器
#[derive(Debug, Clone, Default)]
pub struct TokioTcpConnector {
    options: TcpOptions,
}

impl TokioTcpConnector {
    pub fn new(options: TcpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TcpOptions {
        &self.options
    }
}

#[async_trait]
impl Connector for TokioTcpConnector {
    async fn connect(&self, endpoint: &EndpointConfig, sink: SignalSink) -> Result<(), TransportError> {
        tracing::debug!("🔌 TCP客户端连接到: {} ({})", endpoint.target(), endpoint.name);

        let stream = TcpStream::connect((endpoint.hostname.as_str(), endpoint.port)).await?;
        stream.set_nodelay(self.options.nodelay)?;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| endpoint.target());

        tracing::debug!("✅ TCP连接建立成功: {} -> {}", endpoint.name, peer);

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let budget = Arc::new(WriteBudget::new(self.options.write_buffer_size));
        let shutdown = CancellationToken::new();

        let handle = Arc::new(TcpHandle {
            peer,
            write_tx,
            budget: budget.clone(),
            shutdown: shutdown.clone(),
        });

        if !sink.opened(handle) {
            return Err(TransportError::Shutdown);
        }

        tokio::spawn(run_io_loop(stream, sink, write_rx, budget, shutdown, self.options.clone()));
        Ok(())
    }
}

/// 写缓冲区预算
///
/// 只有管理器任务会增加 `pending`，只有 IO 任务会减少。
#[derive(Debug)]
struct WriteBudget {
    pending: AtomicUsize,
    limit: usize,
    backpressured: AtomicBool,
}

impl WriteBudget {
    fn new(limit: usize) -> Self {
        Self {
            pending: AtomicUsize::new(0),
            limit,
            backpressured: AtomicBool::new(false),
        }
    }

    /// 申请写入 `wanted` 字节，返回可以接受的字节数
    fn reserve(&self, wanted: usize) -> usize {
        let pending = self.pending.load(Ordering::Acquire);
        let accepted = wanted.min(self.limit.saturating_sub(pending));
        if accepted < wanted {
            self.backpressured.store(true, Ordering::Release);
        }
        if accepted > 0 {
            self.pending.fetch_add(accepted, Ordering::AcqRel);
        }
        accepted
    }

    /// 释放已经写出的字节，返回剩余待写字节数
    fn release(&self, written: usize) -> usize {
        self.pending.fetch_sub(written, Ordering::AcqRel) - written
    }

    fn take_backpressure(&self) -> bool {
        self.backpressured.swap(false, Ordering::AcqRel)
    }
}

/// TCP 连接句柄
#[derive(Debug)]
pub struct TcpHandle {
    peer: String,
    write_tx: mpsc::UnboundedSender<Bytes>,
    budget: Arc<WriteBudget>,
    shutdown: CancellationToken,
}

impl TransportHandle for TcpHandle {
    fn write(&self, data: Bytes) -> Result<usize, TransportError> {
        if self.shutdown.is_cancelled() || self.write_tx.is_closed() {
            return Err(TransportError::write_error("transport is closed"));
        }

        let accepted = self.budget.reserve(data.len());
        if accepted == 0 {
            return Ok(0);
        }

        if self.write_tx.send(data.slice(..accepted)).is_err() {
            self.budget.release(accepted);
            return Err(TransportError::write_error("transport is closed"));
        }

        Ok(accepted)
    }

    fn end(&self) {
        self.shutdown.cancel();
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

/// 基于 tokio::select! 的读写循环
async fn run_io_loop(
    stream: TcpStream,
    sink: SignalSink,
    mut write_rx: mpsc::UnboundedReceiver<Bytes>,
    budget: Arc<WriteBudget>,
    shutdown: CancellationToken,
    options: TcpOptions,
) {
    let name = sink.name().to_string();
    tracing::debug!("🚀 TCP事件循环启动 ({})", name);

    let (mut read_half, mut write_half) = stream.into_split();
    let mut read_buffer = BytesMut::with_capacity(options.read_buffer_size);

    let idle_timeout = options.idle_timeout;
    let idle = tokio::time::sleep(idle_timeout.unwrap_or(Duration::from_secs(3600)));
    tokio::pin!(idle);

    loop {
        if read_buffer.capacity() < options.read_buffer_size {
            read_buffer.reserve(options.read_buffer_size);
        }

        tokio::select! {
            // 🛑 本地主动关闭：不发送信号
            _ = shutdown.cancelled() => {
                while let Ok(data) = write_rx.try_recv() {
                    if write_half.write_all(&data).await.is_err() {
                        break;
                    }
                }
                let _ = write_half.shutdown().await;
                tracing::debug!("🔌 主动关闭TCP连接 ({})", name);
                break;
            }

            // 📥 接收数据
            result = read_half.read_buf(&mut read_buffer) => {
                match result {
                    Ok(0) => {
                        tracing::debug!("📥 对端关闭TCP连接 ({})", name);
                        sink.ended();
                        break;
                    }
                    Ok(n) => {
                        tracing::trace!("📥 TCP接收 {} bytes ({})", n, name);
                        if let Some(timeout) = idle_timeout {
                            idle.as_mut().reset(Instant::now() + timeout);
                        }
                        sink.data(read_buffer.split().freeze());
                    }
                    Err(e) => {
                        tracing::warn!("📥 TCP读取错误 ({}): {}", name, e);
                        let error = TransportError::from(e);
                        sink.errored(error.clone());
                        sink.closed(Some(error));
                        break;
                    }
                }
            }

            // 📤 发送数据
            data = write_rx.recv() => {
                let Some(data) = data else {
                    // 句柄已被释放
                    break;
                };
                match write_half.write_all(&data).await {
                    Ok(()) => {
                        tracing::trace!("📤 TCP发送 {} bytes ({})", data.len(), name);
                        if let Some(timeout) = idle_timeout {
                            idle.as_mut().reset(Instant::now() + timeout);
                        }
                        if budget.release(data.len()) == 0 && budget.take_backpressure() {
                            sink.drained();
                        }
                    }
                    Err(e) => {
                        tracing::warn!("📤 TCP发送错误 ({}): {}", name, e);
                        let error = TransportError::from(e);
                        sink.errored(error.clone());
                        sink.closed(Some(error));
                        break;
                    }
                }
            }

            // ⏰ 空闲超时
            _ = &mut idle, if idle_timeout.is_some() => {
                tracing::debug!("⏰ TCP空闲超时 ({})", name);
                sink.timed_out();
                break;
            }
        }
    }

    tracing::debug!("✅ TCP事件循环已结束 ({})", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SignalEnvelope, TransportSignal};
    use tokio::net::TcpListener;

    async fn next_signal(rx: &mut mpsc::UnboundedReceiver<SignalEnvelope>) -> TransportSignal {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("signal timeout")
            .expect("channel closed")
            .signal
    }

    #[test]
    fn test_write_budget() {
        let budget = WriteBudget::new(10);
        assert_eq!(budget.reserve(4), 4);
        assert_eq!(budget.reserve(10), 6);
        assert_eq!(budget.reserve(1), 0);
        assert_eq!(budget.release(4), 6);
        assert_eq!(budget.release(6), 0);
        assert!(budget.take_backpressure());
        assert!(!budget.take_backpressure());
    }

    #[tokio::test]
    async fn test_connect_exchange_and_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(Arc::from("echo"), 1, tx);
        let connector = TokioTcpConnector::default();
        let endpoint = EndpointConfig::new("echo", "127.0.0.1", port);

        let (connect_result, accepted) = tokio::join!(connector.connect(&endpoint, sink), listener.accept());
        connect_result.unwrap();
        let (mut server, _) = accepted.unwrap();

        let handle = match next_signal(&mut rx).await {
            TransportSignal::Opened(handle) => handle,
            other => panic!("expected Opened, got {:?}", other),
        };

        assert_eq!(handle.write(Bytes::from_static(b"ping")).unwrap(), 4);
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        match next_signal(&mut rx).await {
            TransportSignal::Data(data) => assert_eq!(data.as_ref(), b"pong"),
            other => panic!("expected Data, got {:?}", other),
        }

        drop(server);
        assert!(matches!(next_signal(&mut rx).await, TransportSignal::Ended));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // 绑定后立即释放，得到一个大概率无人监听的端口
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(Arc::from("nobody"), 1, tx);
        let endpoint = EndpointConfig::new("nobody", "127.0.0.1", port);

        let err = TokioTcpConnector::default().connect(&endpoint, sink).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_idle_timeout_and_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(Arc::from("idle"), 1, tx);
        let connector = TokioTcpConnector::new(TcpOptions {
            idle_timeout: Some(Duration::from_millis(50)),
            ..TcpOptions::default()
        });
        let endpoint = EndpointConfig::new("idle", "127.0.0.1", port);

        let (connect_result, accepted) = tokio::join!(connector.connect(&endpoint, sink), listener.accept());
        connect_result.unwrap();
        let _server = accepted.unwrap();

        let handle = match next_signal(&mut rx).await {
            TransportSignal::Opened(handle) => handle,
            other => panic!("expected Opened, got {:?}", other),
        };
        assert!(matches!(next_signal(&mut rx).await, TransportSignal::TimedOut));

        handle.end();
        assert!(handle.write(Bytes::from_static(b"late")).is_err());
    }
}
