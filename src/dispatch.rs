//! 事件分发
//!
//! 每个事件只交给 (连接名, 事件种类) 对应的唯一处理器，不做广播。处理器
//! 同时拿到一个限定在该连接上的能力对象 `ConnectionAccess`。

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::command::FactoryCommand;
use crate::event::{ConnectionEvent, EventKind};
use crate::state::ConnectionState;
use crate::transport::TransportHandle;

/// 事件处理器
pub type EventHandler = Arc<dyn Fn(&ConnectionAccess, &ConnectionEvent) + Send + Sync>;

/// 单连接的处理器表
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: HashMap<EventKind, EventHandler>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置处理器，覆盖同类旧处理器
    pub fn set<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&ConnectionAccess, &ConnectionEvent) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn remove(&mut self, kind: EventKind) -> bool {
        self.handlers.remove(&kind).is_some()
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 分发一个事件
    ///
    /// 处理器 panic 会被捕获并记录，不会打断管理器的内部流程。
    pub fn dispatch(&self, access: &ConnectionAccess, event: &ConnectionEvent) {
        tracing::debug!("TCP: {} {}", access.name(), event);

        let Some(handler) = self.handlers.get(&event.kind()) else {
            return;
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(access, event))) {
            tracing::error!(
                "❌ 事件处理器 panic: 连接 {} 事件 {} - {}",
                access.name(),
                event.kind(),
                panic_message(&panic)
            );
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_set().entries(kinds).finish()
    }
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 传给处理器的能力对象
///
/// 写入、连接、断开、清空缓冲区等操作会排进管理器的命令队列，在当前处理器
/// 返回之后按调用顺序执行。`state` 是分发时刻的快照。
#[derive(Clone)]
pub struct ConnectionAccess {
    name: Arc<str>,
    state: ConnectionState,
    transport: Option<Arc<dyn TransportHandle>>,
    commands: mpsc::UnboundedSender<FactoryCommand>,
}

impl ConnectionAccess {
    pub(crate) fn new(
        name: Arc<str>,
        state: ConnectionState,
        transport: Option<Arc<dyn TransportHandle>>,
        commands: mpsc::UnboundedSender<FactoryCommand>,
    ) -> Self {
        Self {
            name,
            state,
            transport,
            commands,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// 底层传输句柄（未连接时为 `None`）
    pub fn transport(&self) -> Option<&Arc<dyn TransportHandle>> {
        self.transport.as_ref()
    }

    /// 写入数据
    ///
    /// 写入请求立即入队；返回的 future 只用于观察结果，丢弃它不会取消写入。
    pub fn write(&self, data: impl Into<Bytes>) -> impl Future<Output = bool> + Send + 'static {
        let (response_tx, response_rx) = oneshot::channel();
        let queued = self
            .commands
            .send(FactoryCommand::Write {
                name: self.name.to_string(),
                data: data.into(),
                response_tx,
            })
            .is_ok();

        async move { queued && response_rx.await.unwrap_or(false) }
    }

    pub fn connect(&self) {
        let _ = self.commands.send(FactoryCommand::Connect {
            name: self.name.to_string(),
            response_tx: None,
        });
    }

    pub fn disconnect(&self) {
        let _ = self.commands.send(FactoryCommand::Disconnect {
            name: self.name.to_string(),
            response_tx: None,
        });
    }

    pub fn clear_buffer(&self) {
        let _ = self.commands.send(FactoryCommand::ClearBuffer {
            name: self.name.to_string(),
            response_tx: None,
        });
    }
}

impl std::fmt::Debug for ConnectionAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAccess")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .finish()
    }
}
