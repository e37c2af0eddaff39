//! tcpmux - 多连接持久化 TCP 客户端管理器
//!
//! 一个进程同时维护多条命名的出站 TCP 连接：每条连接有自己的分帧策略和
//! 事件处理器，断线后按重连策略自动重连，接收到的字节流被切分成完整帧后
//! 逐帧交给处理器。
//!
//! ```no_run
//! use tcpmux::{ConnectionConfig, FactoryConfig, TcpFactory, CharacterDelimited};
//!
//! # async fn demo() -> tcpmux::Result<()> {
//! let factory = TcpFactory::new(FactoryConfig::default())?;
//! factory
//!     .register(
//!         ConnectionConfig::new("server1", "localhost", 8080, CharacterDelimited::lines())
//!             .on_receive(|_, frame| println!("{}", frame.data)),
//!     )
//!     .await?;
//! factory.start().await;
//! # Ok(())
//! # }
//! ```

// 核心任务
mod actor;
mod command;

// 连接管理
pub mod factory;
pub mod config;
pub mod state;
pub mod retry;

// 数据路径
pub mod buffer;
pub mod framing;
pub mod transport;

// 事件
pub mod event;
pub mod dispatch;
pub mod error;

// 重新导出核心类型
pub use factory::{TcpFactory, TcpFactoryBuilder};
pub use config::{
    ConfigError, ConnectionConfig, EndpointConfig, FactoryConfig, OverflowPolicy, RetryConfig,
    DEFAULT_MAX_BUFFER_SIZE, DEFAULT_RETRY_INTERVAL,
};
pub use error::{CloseReason, TransportError};
pub use event::{ConnectionEvent, EventKind, ParsedFrame};
pub use dispatch::{ConnectionAccess, EventHandler, EventHandlers};
pub use state::ConnectionState;
pub use buffer::{BufferStats, FrameBuffer};
pub use framing::{
    ByteDelimited, CharacterDelimited, DecodedFrame, Extraction, FixedSize, FrameDelimiter,
    FrameValue, JsonDocument, LengthPrefixed,
};
pub use retry::{ExponentialBackoff, FixedDelay, RetryPolicy};
pub use transport::{
    Connector, SignalSink, TcpOptions, TokioTcpConnector, TransportHandle, TransportSignal,
};

// 便捷的类型别名
pub type Result<T> = std::result::Result<T, TransportError>;
