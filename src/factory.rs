//! 连接管理器的对外接口
//!
//! `TcpFactory` 只是一个命令发送端，可以随意克隆；真正的连接表由后台的
//! `FactoryActor` 任务独占。最后一个句柄被丢弃时管理器自动销毁。

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{
    actor::FactoryActor,
    command::FactoryCommand,
    config::{ConnectionConfig, FactoryConfig},
    error::TransportError,
    retry::RetryPolicy,
    state::ConnectionState,
    transport::{Connector, TcpOptions, TokioTcpConnector},
};

/// 所有句柄共享的销毁守卫
struct ShutdownGuard {
    command_tx: mpsc::UnboundedSender<FactoryCommand>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.command_tx.send(FactoryCommand::Destroy { response_tx: None });
    }
}

/// 多连接 TCP 客户端管理器
#[derive(Clone)]
pub struct TcpFactory {
    command_tx: mpsc::UnboundedSender<FactoryCommand>,
    _guard: Arc<ShutdownGuard>,
}

impl TcpFactory {
    pub fn builder() -> TcpFactoryBuilder {
        TcpFactoryBuilder::new()
    }

    /// 使用默认传输和配置中的重连策略创建管理器
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn new(config: FactoryConfig) -> Result<Self, TransportError> {
        Self::builder().config(config).build()
    }

    /// 注册连接，同名连接已存在时返回配置错误
    pub async fn register(&self, config: ConnectionConfig) -> Result<(), TransportError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(FactoryCommand::Register { config, response_tx })?;
        response_rx.await.map_err(|_| TransportError::Shutdown)?
    }

    /// 断开并移除连接，返回连接是否存在
    pub async fn unregister(&self, name: &str) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(FactoryCommand::Unregister {
                name: name.to_string(),
                response_tx,
            })
            .is_err()
        {
            return false;
        }
        response_rx.await.unwrap_or(false)
    }

    /// 发起连接
    ///
    /// 只等待尝试被发起，结果通过 `connected` / `error` 事件报告。未注册的
    /// 名称会被忽略。
    pub async fn connect(&self, name: &str) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(FactoryCommand::Connect {
                name: name.to_string(),
                response_tx: Some(response_tx),
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// 连接所有已注册连接
    pub async fn start(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.send(FactoryCommand::ConnectAll { response_tx }).is_ok() {
            let _ = response_rx.await;
        }
    }

    /// 手动断开，取消待执行的重连；对已断开的连接是空操作
    pub async fn disconnect(&self, name: &str) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(FactoryCommand::Disconnect {
                name: name.to_string(),
                response_tx: Some(response_tx),
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// 写入数据，返回传输是否接受了数据
    ///
    /// 未连接时返回 `false` 且不会触碰传输。
    pub async fn write(&self, name: &str, data: impl Into<Bytes>) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(FactoryCommand::Write {
                name: name.to_string(),
                data: data.into(),
                response_tx,
            })
            .is_err()
        {
            return false;
        }
        response_rx.await.unwrap_or(false)
    }

    /// 丢弃接收缓冲区中尚未成帧的字节
    pub async fn clear_buffer(&self, name: &str) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(FactoryCommand::ClearBuffer {
                name: name.to_string(),
                response_tx: Some(response_tx),
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// 单个连接的状态快照
    pub async fn state(&self, name: &str) -> Option<ConnectionState> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(FactoryCommand::GetState {
            name: name.to_string(),
            response_tx,
        })
        .ok()?;
        response_rx.await.ok().flatten()
    }

    /// 所有连接的状态快照
    pub async fn states(&self) -> HashMap<String, ConnectionState> {
        let (response_tx, response_rx) = oneshot::channel();
        if self.send(FactoryCommand::GetStates { response_tx }).is_err() {
            return HashMap::new();
        }
        response_rx.await.unwrap_or_default()
    }

    /// 断开全部连接并停止管理器
    ///
    /// 之后所有操作都变成空操作。
    pub async fn destroy(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send(FactoryCommand::Destroy {
                response_tx: Some(response_tx),
            })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// 管理器任务是否仍在运行
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    fn send(&self, command: FactoryCommand) -> Result<(), TransportError> {
        self.command_tx.send(command).map_err(|_| TransportError::Shutdown)
    }
}

impl std::fmt::Debug for TcpFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpFactory")
            .field("running", &self.is_running())
            .finish()
    }
}

/// `TcpFactory` 构建器
pub struct TcpFactoryBuilder {
    config: FactoryConfig,
    connector: Option<Arc<dyn Connector>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    connections: Vec<ConnectionConfig>,
}

impl TcpFactoryBuilder {
    pub fn new() -> Self {
        Self {
            config: FactoryConfig::default(),
            connector: None,
            retry_policy: None,
            connections: Vec::new(),
        }
    }

    pub fn config(mut self, config: FactoryConfig) -> Self {
        self.config = config;
        self
    }

    /// 替换默认的 tokio TCP 传输
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// 替换由 `RetryConfig` 推导出的重连策略
    pub fn retry_policy<P: RetryPolicy>(mut self, policy: P) -> Self {
        self.retry_policy = Some(Arc::new(policy));
        self
    }

    /// 预注册一个连接
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.connections.push(config);
        self
    }

    /// 校验配置并启动管理器任务
    pub fn build(self) -> Result<TcpFactory, TransportError> {
        self.config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            TransportError::config_error("runtime", "TcpFactory must be built inside a tokio runtime")
        })?;

        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| self.config.retry.build_policy());
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TokioTcpConnector::new(TcpOptions::from(&self.config))));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let mut actor = FactoryActor::new(
            self.config,
            retry_policy,
            connector,
            command_tx.clone(),
            command_rx,
        );
        for connection in self.connections {
            actor.register(connection)?;
        }

        runtime.spawn(actor.run());

        Ok(TcpFactory {
            command_tx: command_tx.clone(),
            _guard: Arc::new(ShutdownGuard { command_tx }),
        })
    }
}

impl Default for TcpFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
