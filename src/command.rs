use std::collections::HashMap;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::state::ConnectionState;

/// 管理器命令
///
/// 所有对连接表的访问都通过命令交给管理器任务串行处理。`response_tx` 为
/// `None` 的命令来自事件处理器内部，不等待结果。
pub(crate) enum FactoryCommand {
    /// 注册连接
    Register {
        config: ConnectionConfig,
        response_tx: oneshot::Sender<Result<(), TransportError>>,
    },

    /// 注销连接（先断开）
    Unregister {
        name: String,
        response_tx: oneshot::Sender<bool>,
    },

    /// 发起连接
    Connect {
        name: String,
        response_tx: Option<oneshot::Sender<()>>,
    },

    /// 连接所有已注册连接
    ConnectAll {
        response_tx: oneshot::Sender<()>,
    },

    /// 手动断开
    Disconnect {
        name: String,
        response_tx: Option<oneshot::Sender<()>>,
    },

    /// 写入数据
    Write {
        name: String,
        data: Bytes,
        response_tx: oneshot::Sender<bool>,
    },

    /// 清空接收缓冲区
    ClearBuffer {
        name: String,
        response_tx: Option<oneshot::Sender<()>>,
    },

    /// 获取单个连接状态
    GetState {
        name: String,
        response_tx: oneshot::Sender<Option<ConnectionState>>,
    },

    /// 获取所有连接状态
    GetStates {
        response_tx: oneshot::Sender<HashMap<String, ConnectionState>>,
    },

    /// 重连定时器到期
    RetryFired {
        name: String,
        generation: u64,
    },

    /// 断开全部连接并停止管理器
    Destroy {
        response_tx: Option<oneshot::Sender<()>>,
    },
}

impl FactoryCommand {
    /// 命令名称（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            FactoryCommand::Register { .. } => "register",
            FactoryCommand::Unregister { .. } => "unregister",
            FactoryCommand::Connect { .. } => "connect",
            FactoryCommand::ConnectAll { .. } => "connect_all",
            FactoryCommand::Disconnect { .. } => "disconnect",
            FactoryCommand::Write { .. } => "write",
            FactoryCommand::ClearBuffer { .. } => "clear_buffer",
            FactoryCommand::GetState { .. } => "get_state",
            FactoryCommand::GetStates { .. } => "get_states",
            FactoryCommand::RetryFired { .. } => "retry_fired",
            FactoryCommand::Destroy { .. } => "destroy",
        }
    }
}

impl std::fmt::Debug for FactoryCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactoryCommand::Register { config, .. } => write!(f, "Register({})", config.name()),
            FactoryCommand::Unregister { name, .. }
            | FactoryCommand::Connect { name, .. }
            | FactoryCommand::Disconnect { name, .. }
            | FactoryCommand::ClearBuffer { name, .. }
            | FactoryCommand::GetState { name, .. } => write!(f, "{}({})", self.name(), name),
            FactoryCommand::Write { name, data, .. } => write!(f, "Write({}, {} bytes)", name, data.len()),
            FactoryCommand::RetryFired { name, generation } => write!(f, "RetryFired({}, #{})", name, generation),
            other => f.write_str(other.name()),
        }
    }
}
