use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    buffer::FrameBuffer,
    command::FactoryCommand,
    config::{ConnectionConfig, FactoryConfig, OverflowPolicy},
    dispatch::ConnectionAccess,
    error::{CloseReason, TransportError},
    event::{ConnectionEvent, ParsedFrame},
    retry::{RetryPolicy, RetryTimer},
    state::ConnectionState,
    transport::{Connector, SignalEnvelope, SignalSink, TransportHandle, TransportSignal},
};

/// 单个命名连接的全部资源
struct ConnectionEntry {
    name: Arc<str>,
    config: ConnectionConfig,
    state: ConnectionState,
    buffer: FrameBuffer,
    transport: Option<Arc<dyn TransportHandle>>,
    connect_task: Option<JoinHandle<()>>,
    retry_timer: Option<RetryTimer>,
    /// 当前传输的代数，旧代数的信号一律丢弃
    epoch: u64,
}

impl ConnectionEntry {
    fn new(config: ConnectionConfig, max_buffer_size: usize) -> Self {
        Self {
            name: Arc::from(config.name()),
            config,
            state: ConnectionState::new(),
            buffer: FrameBuffer::new(max_buffer_size),
            transport: None,
            connect_task: None,
            retry_timer: None,
            epoch: 0,
        }
    }

    /// 释放传输和进行中的连接尝试，返回是否确实释放了什么
    fn release_transport(&mut self, epoch: u64) -> bool {
        self.epoch = epoch;
        let mut released = false;
        if let Some(task) = self.connect_task.take() {
            task.abort();
            released = true;
        }
        if let Some(transport) = self.transport.take() {
            transport.end();
            released = true;
        }
        released
    }
}

/// 连接管理器的核心任务
///
/// 连接表只在这个任务里读写：调用方命令、传输信号和定时器回调都经由通道
/// 串行到达，因此不需要任何锁。
pub(crate) struct FactoryActor {
    config: FactoryConfig,
    retry_policy: Arc<dyn RetryPolicy>,
    connector: Arc<dyn Connector>,
    connections: HashMap<String, ConnectionEntry>,
    command_tx: mpsc::UnboundedSender<FactoryCommand>,
    command_rx: mpsc::UnboundedReceiver<FactoryCommand>,
    signal_tx: mpsc::UnboundedSender<SignalEnvelope>,
    signal_rx: mpsc::UnboundedReceiver<SignalEnvelope>,
    /// 连接代数与定时器代数共用的计数器
    generation: u64,
}

impl FactoryActor {
    pub(crate) fn new(
        config: FactoryConfig,
        retry_policy: Arc<dyn RetryPolicy>,
        connector: Arc<dyn Connector>,
        command_tx: mpsc::UnboundedSender<FactoryCommand>,
        command_rx: mpsc::UnboundedReceiver<FactoryCommand>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            config,
            retry_policy,
            connector,
            connections: HashMap::new(),
            command_tx,
            command_rx,
            signal_tx,
            signal_rx,
            generation: 0,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// 主循环
    pub(crate) async fn run(mut self) {
        tracing::info!("TcpFactory started with {} connection(s)", self.connections.len());

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        None => {
                            tracing::info!("TcpFactory command channel closed");
                            break;
                        }
                    }
                }

                Some(envelope) = self.signal_rx.recv() => {
                    self.handle_signal(envelope);
                }
            }
        }

        self.shutdown();
        tracing::info!("TcpFactory stopped");
    }

    /// 处理一条命令，返回 `false` 表示管理器应当停止
    fn handle_command(&mut self, command: FactoryCommand) -> bool {
        tracing::trace!("TcpFactory command: {:?}", command);

        match command {
            FactoryCommand::Register { config, response_tx } => {
                let _ = response_tx.send(self.register(config));
            }
            FactoryCommand::Unregister { name, response_tx } => {
                let _ = response_tx.send(self.unregister(&name));
            }
            FactoryCommand::Connect { name, response_tx } => {
                self.connect(&name);
                if let Some(tx) = response_tx {
                    let _ = tx.send(());
                }
            }
            FactoryCommand::ConnectAll { response_tx } => {
                for name in self.sorted_names() {
                    self.connect(&name);
                }
                let _ = response_tx.send(());
            }
            FactoryCommand::Disconnect { name, response_tx } => {
                self.disconnect(&name);
                if let Some(tx) = response_tx {
                    let _ = tx.send(());
                }
            }
            FactoryCommand::Write { name, data, response_tx } => {
                let _ = response_tx.send(self.write(&name, data));
            }
            FactoryCommand::ClearBuffer { name, response_tx } => {
                if let Some(entry) = self.connections.get_mut(&name) {
                    entry.buffer.clear();
                }
                if let Some(tx) = response_tx {
                    let _ = tx.send(());
                }
            }
            FactoryCommand::GetState { name, response_tx } => {
                let state = self.connections.get(&name).map(|entry| entry.state.clone());
                let _ = response_tx.send(state);
            }
            FactoryCommand::GetStates { response_tx } => {
                let states = self
                    .connections
                    .iter()
                    .map(|(name, entry)| (name.clone(), entry.state.clone()))
                    .collect();
                let _ = response_tx.send(states);
            }
            FactoryCommand::RetryFired { name, generation } => {
                self.handle_retry_fired(&name, generation);
            }
            FactoryCommand::Destroy { response_tx } => {
                self.destroy_all();
                if let Some(tx) = response_tx {
                    let _ = tx.send(());
                }
                return false;
            }
        }
        true
    }

    fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }

    /// 注册连接，重名时拒绝且保留原有连接
    pub(crate) fn register(&mut self, config: ConnectionConfig) -> Result<(), TransportError> {
        config.validate()?;

        let name = config.name().to_string();
        if self.connections.contains_key(&name) {
            return Err(TransportError::config_error(
                "name",
                format!("connection '{}' is already registered", name),
            ));
        }

        tracing::info!(
            "✅ 注册连接 {} -> {} ({})",
            name,
            config.endpoint.target(),
            config.delimiter.name()
        );
        self.connections
            .insert(name, ConnectionEntry::new(config, self.config.max_buffer_size));
        Ok(())
    }

    fn unregister(&mut self, name: &str) -> bool {
        if !self.connections.contains_key(name) {
            return false;
        }
        self.disconnect(name);
        self.connections.remove(name);
        tracing::info!("注销连接 {}", name);
        true
    }

    /// 分发事件给该连接的处理器
    fn emit(&self, name: &str, event: ConnectionEvent) {
        let Some(entry) = self.connections.get(name) else {
            return;
        };

        let access = ConnectionAccess::new(
            entry.name.clone(),
            entry.state.clone(),
            entry.transport.clone(),
            self.command_tx.clone(),
        );
        entry.config.handlers.dispatch(&access, &event);
    }

    fn connect(&mut self, name: &str) {
        let epoch = self.next_generation();
        let Some(entry) = self.connections.get_mut(name) else {
            tracing::warn!("connect: 未注册的连接 {}", name);
            return;
        };

        if entry.state.is_connecting || entry.state.is_connected {
            tracing::debug!("connect: {} 已在连接中或已连接", name);
            return;
        }

        // 手动 connect 会顶替尚未到期的重连
        entry.retry_timer = None;
        entry.state.mark_connecting();
        entry.epoch = epoch;

        let sink = SignalSink::new(entry.name.clone(), epoch, self.signal_tx.clone());
        let connector = self.connector.clone();
        let endpoint = entry.config.endpoint.clone();
        let connect_timeout = self.config.connect_timeout;

        entry.connect_task = Some(tokio::spawn(async move {
            let attempt = connector.connect(&endpoint, sink.clone());
            let result = match connect_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::timeout_error("connect", timeout)),
                },
                None => attempt.await,
            };

            if let Err(error) = result {
                sink.connect_failed(error);
            }
        }));

        tracing::debug!("🔌 {} 正在连接 {}", name, entry.config.endpoint.target());
        self.emit(name, ConnectionEvent::Connecting);
    }

    /// 手动断开；唯一不会触发自动重连的路径
    fn disconnect(&mut self, name: &str) {
        let epoch = self.next_generation();
        let Some(entry) = self.connections.get_mut(name) else {
            tracing::warn!("disconnect: 未注册的连接 {}", name);
            return;
        };

        let had_timer = entry.retry_timer.take().is_some();
        let released = entry.release_transport(epoch);
        let was_active = had_timer || released || !entry.state.is_idle();

        entry.buffer.clear();
        entry.state.mark_disconnected();

        if !was_active {
            tracing::debug!("disconnect: {} 已处于断开状态", name);
            return;
        }

        tracing::info!("🔗 {} 已手动断开", name);
        self.emit(name, ConnectionEvent::ConnectionClosed);
    }

    fn write(&mut self, name: &str, data: Bytes) -> bool {
        let Some(entry) = self.connections.get_mut(name) else {
            return false;
        };

        if !entry.state.is_connected {
            return false;
        }
        let Some(transport) = entry.transport.clone() else {
            return false;
        };

        let len = data.len();
        match transport.write(data) {
            Ok(0) => {
                tracing::debug!("📤 {} 写缓冲区已满，拒绝 {} bytes", name, len);
                false
            }
            Ok(written) => {
                entry.state.record_sent(written);
                tracing::trace!("📤 {} 写入 {}/{} bytes", name, written, len);
                self.emit(name, ConnectionEvent::Transmit { bytes_written: written });
                true
            }
            Err(error) => {
                tracing::warn!("📤 {} 写入失败: {}", name, error);
                self.emit(name, ConnectionEvent::Error(error.with_connection(name)));
                false
            }
        }
    }

    fn handle_signal(&mut self, envelope: SignalEnvelope) {
        let SignalEnvelope { name, epoch, signal } = envelope;

        let current = self.connections.get(&*name).map(|entry| entry.epoch);
        if current != Some(epoch) {
            tracing::trace!("丢弃过期信号: {} #{} {:?}", name, epoch, signal);
            if let TransportSignal::Opened(handle) = signal {
                handle.end();
            }
            return;
        }

        match signal {
            TransportSignal::Opened(handle) => self.handle_open(&name, handle),
            TransportSignal::ConnectFailed(error) => self.handle_connect_error(&name, error),
            TransportSignal::Data(data) => self.handle_data(&name, data),
            TransportSignal::Drained => self.emit(&name, ConnectionEvent::Drain),
            TransportSignal::Ended => {
                self.emit(&name, ConnectionEvent::End);
                self.fail_connection(&name, TransportError::closed(CloseReason::Normal));
            }
            TransportSignal::Errored(error) => self.handle_error(&name, error),
            TransportSignal::TimedOut => {
                self.emit(&name, ConnectionEvent::Timeout);
                let idle = self.config.idle_timeout.unwrap_or_default();
                self.fail_connection(&name, TransportError::timeout_error("idle", idle));
            }
            TransportSignal::Closed(Some(error)) => self.fail_connection(&name, error),
            TransportSignal::Closed(None) => self.handle_clean_close(&name),
        }
    }

    fn handle_open(&mut self, name: &str, handle: Arc<dyn TransportHandle>) {
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        tracing::info!("✅ {} 已连接 {}", name, handle.peer());
        entry.connect_task = None;
        entry.transport = Some(handle);
        entry.retry_timer = None;
        entry.state.mark_connected();

        self.emit(name, ConnectionEvent::Connected);
    }

    fn handle_connect_error(&mut self, name: &str, error: TransportError) {
        let epoch = self.next_generation();
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        let error = error.with_connection(name);
        tracing::warn!("❌ {} 连接失败: {}", name, error);
        entry.release_transport(epoch);
        entry.state.mark_failed(error.clone());

        self.emit(name, ConnectionEvent::Error(error));
        self.schedule_retry(name);
    }

    fn handle_error(&mut self, name: &str, error: TransportError) {
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        let error = error.with_connection(name);
        tracing::warn!("🚨 {} 传输错误: {}", name, error);
        entry.state.last_error = Some(error.clone());
        self.emit(name, ConnectionEvent::Error(error));
    }

    fn handle_data(&mut self, name: &str, data: Bytes) {
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        entry.state.record_received(data.len());

        if let Err(overflow) = entry.buffer.append(&data) {
            tracing::warn!("⚠️ {} 接收缓冲区溢出: {}", name, overflow);
            entry.state.last_error = Some(overflow.clone());
            self.emit(name, ConnectionEvent::Error(overflow.clone()));
            match self.config.overflow_policy {
                OverflowPolicy::Reconnect => self.fail_connection(name, overflow),
                OverflowPolicy::Disconnect => self.disconnect(name),
            }
            return;
        }

        let frames = match entry.buffer.extract(entry.config.delimiter.as_ref()) {
            Ok(frames) => frames,
            Err(error) => {
                tracing::error!("❌ {} 分帧策略 panic，已清空接收缓冲区: {}", name, error);
                entry.state.last_error = Some(error.clone());
                self.emit(name, ConnectionEvent::Error(error));
                return;
            }
        };
        if !frames.is_empty() {
            tracing::debug!("📥 {} 解析出 {} 帧，剩余 {} bytes", name, frames.len(), entry.buffer.len());
        }

        for frame in frames {
            self.emit(name, ConnectionEvent::Receive(ParsedFrame::new(name, frame)));
        }
    }

    /// 已建立（或建立中）的连接因失败而断开：通知后进入重连
    fn fail_connection(&mut self, name: &str, error: TransportError) {
        let epoch = self.next_generation();
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        entry.release_transport(epoch);
        entry.buffer.clear();
        entry.state.mark_failed(error.clone());
        tracing::warn!("❌ {} 连接断开: {}", name, error);

        self.emit(name, ConnectionEvent::Disconnected(Some(error)));
        self.schedule_retry(name);
    }

    /// 传输无错误关闭：保持空闲，不重连
    fn handle_clean_close(&mut self, name: &str) {
        let epoch = self.next_generation();
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        entry.release_transport(epoch);
        entry.buffer.clear();
        entry.state.is_connected = false;
        entry.state.is_connecting = false;
        tracing::info!("🔗 {} 传输已关闭", name);

        self.emit(name, ConnectionEvent::Disconnected(None));
    }

    fn schedule_retry(&mut self, name: &str) {
        let generation = self.next_generation();
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        let retry_count = entry.state.retry_count + 1;
        let Some(delay) = self.retry_policy.next_delay(retry_count) else {
            tracing::warn!("⛔ {} 已达到最大重试次数 ({})，停止重连", name, entry.state.retry_count);
            entry.retry_timer = None;
            return;
        };

        entry.state.retry_count = retry_count;
        entry.retry_timer = None;
        tracing::info!("🔄 {} 将在 {:?} 后重连 (第 {} 次)", name, delay, retry_count);

        self.emit(name, ConnectionEvent::RetryScheduled { delay, retry_count });

        // 处理器可能已经注销了该连接
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };
        let command_tx = self.command_tx.clone();
        let timer_name = name.to_string();
        entry.retry_timer = Some(RetryTimer::arm(generation, delay, move || {
            let _ = command_tx.send(FactoryCommand::RetryFired {
                name: timer_name,
                generation,
            });
        }));
    }

    fn handle_retry_fired(&mut self, name: &str, generation: u64) {
        let Some(entry) = self.connections.get_mut(name) else {
            return;
        };

        if entry.retry_timer.as_ref().map(RetryTimer::generation) != Some(generation) {
            tracing::trace!("忽略已取消的重连定时器: {} #{}", name, generation);
            return;
        }

        entry.retry_timer = None;
        tracing::debug!("🔄 {} 重连定时器到期", name);
        self.connect(name);
    }

    /// 断开全部连接
    fn destroy_all(&mut self) {
        tracing::info!("🛑 销毁 TcpFactory，断开 {} 个连接", self.connections.len());
        for name in self.sorted_names() {
            self.disconnect(&name);
        }
    }

    /// 释放剩余资源，不再触发事件
    fn shutdown(&mut self) {
        for entry in self.connections.values_mut() {
            entry.retry_timer = None;
            entry.release_transport(u64::MAX);
            entry.buffer.clear();
            entry.state.mark_disconnected();
        }
    }
}
