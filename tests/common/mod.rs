//! 测试用的脚本化传输
//!
//! `MockConnector` 按脚本决定每次连接成功还是失败，并保留每次成功连接的
//! `SignalSink`，测试可以借此注入数据、EOF、超时或错误。

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tcpmux::{
    ConnectionConfig, ConnectionEvent, Connector, EventKind, EndpointConfig, SignalSink, TransportError, TransportHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Option<Outcome>>,
    attempts: AtomicUsize,
    sinks: Mutex<Vec<SignalSink>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// 每次连接都成功
    pub fn accepting() -> Self {
        Self::with_fallback(Outcome::Accept)
    }

    /// 每次连接都被拒绝
    pub fn refusing() -> Self {
        Self::with_fallback(Outcome::Refuse)
    }

    /// 先按脚本执行，脚本用完后使用 `fallback`
    pub fn scripted(script: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Self {
        let connector = Self::with_fallback(fallback);
        connector.state.script.lock().extend(script);
        connector
    }

    fn with_fallback(outcome: Outcome) -> Self {
        let connector = Self::default();
        *connector.state.fallback.lock() = Some(outcome);
        connector
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn last_sink(&self) -> SignalSink {
        self.state.sinks.lock().last().cloned().expect("no successful connect")
    }

    pub fn last_handle(&self) -> Arc<MockHandle> {
        self.state.handles.lock().last().cloned().expect("no successful connect")
    }

    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.state.handles.lock().clone()
    }

    pub fn inject(&self, data: &[u8]) {
        assert!(self.last_sink().data(Bytes::copy_from_slice(data)));
    }

    /// 注入到第 `index` 次成功连接（按连接顺序）
    pub fn inject_into(&self, index: usize, data: &[u8]) {
        let sink = self.state.sinks.lock()[index].clone();
        assert!(sink.data(Bytes::copy_from_slice(data)));
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &EndpointConfig, sink: SignalSink) -> Result<(), TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .state
            .script
            .lock()
            .pop_front()
            .or(*self.state.fallback.lock())
            .unwrap_or(Outcome::Refuse);

        match outcome {
            Outcome::Refuse => Err(TransportError::connection_error(
                format!("connection refused: {}", endpoint.target()),
                true,
            )),
            Outcome::Accept => {
                let handle = Arc::new(MockHandle::new(endpoint.target()));
                self.state.handles.lock().push(handle.clone());
                self.state.sinks.lock().push(sink.clone());
                sink.opened(handle);
                Ok(())
            }
        }
    }
}

/// 记录写入的传输句柄
#[derive(Debug)]
pub struct MockHandle {
    peer: String,
    writes: Mutex<Vec<Bytes>>,
    write_calls: AtomicUsize,
    accept_limit: Mutex<Option<usize>>,
    broken: AtomicBool,
    ended: AtomicBool,
}

impl MockHandle {
    fn new(peer: String) -> Self {
        Self {
            peer,
            writes: Mutex::new(Vec::new()),
            write_calls: AtomicUsize::new(0),
            accept_limit: Mutex::new(None),
            broken: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    /// 限制单次写入接受的字节数，`Some(0)` 表示写缓冲区已满
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        *self.accept_limit.lock() = limit;
    }

    pub fn break_pipe(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.writes.lock().clone()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl TransportHandle for MockHandle {
    fn write(&self, data: Bytes) -> Result<usize, TransportError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::write_error("broken pipe"));
        }

        let accepted = match *self.accept_limit.lock() {
            Some(limit) => limit.min(data.len()),
            None => data.len(),
        };
        if accepted > 0 {
            self.writes.lock().push(data.slice(..accepted));
        }
        Ok(accepted)
    }

    fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

/// 事件记录器
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ConnectionEvent>>>,
}

impl EventLog {
    pub fn record(&self, event: &ConnectionEvent) {
        self.events.lock().push(event.clone());
    }

    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().clone()
    }

    /// 事件名序列，例如 `["connecting", "connected"]`
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .map(|event| event.kind().as_str())
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// 为连接的每种事件都挂上记录器
pub fn recorded(mut config: ConnectionConfig, log: &EventLog) -> ConnectionConfig {
    for kind in EventKind::ALL {
        let log = log.clone();
        config = config.on(kind, move |_, event| log.record(event));
    }
    config
}

/// 让管理器任务和它派生的连接任务处理完所有已就绪的工作
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub const RETRY: Duration = Duration::from_millis(5000);
