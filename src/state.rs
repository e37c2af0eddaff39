use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TransportError;

/// 单连接状态
///
/// 只由管理器内部修改，对外只提供快照。`is_connected` 与 `is_connecting`
/// 不会同时为 `true`。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    /// 连续失败次数，连接成功后归零
    pub retry_count: u32,
    pub last_error: Option<TransportError>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既未连接也未在连接中
    pub fn is_idle(&self) -> bool {
        !self.is_connected && !self.is_connecting
    }

    pub(crate) fn mark_connecting(&mut self) {
        self.is_connected = false;
        self.is_connecting = true;
        self.last_error = None;
    }

    pub(crate) fn mark_connected(&mut self) {
        self.is_connected = true;
        self.is_connecting = false;
        self.retry_count = 0;
        self.last_error = None;
        self.last_connected_at = Some(Utc::now());
    }

    /// 因失败离开连接/连接中状态
    pub(crate) fn mark_failed(&mut self, error: TransportError) {
        self.is_connected = false;
        self.is_connecting = false;
        self.last_error = Some(error);
    }

    /// 手动断开：回到初始连接状态，保留字节计数与最近一次错误
    pub(crate) fn mark_disconnected(&mut self) {
        self.is_connected = false;
        self.is_connecting = false;
        self.retry_count = 0;
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.total_bytes_received += bytes as u64;
    }

    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.total_bytes_sent += bytes as u64;
    }
}
