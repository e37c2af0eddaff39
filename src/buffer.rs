use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::{Buf, BytesMut};

use crate::dispatch::panic_message;
use crate::error::TransportError;
use crate::framing::{DecodedFrame, FrameDelimiter};

/// 接收缓冲区统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferStats {
    /// 追加次数
    pub appends: u64,
    /// 追加的总字节数
    pub bytes_appended: u64,
    /// 提取出的帧数
    pub frames_extracted: u64,
    /// 溢出次数
    pub overflows: u64,
}

/// 单连接接收缓冲区
///
/// 保存尚未被分帧策略消费的字节，长度永远不超过 `limit`。
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
    limit: usize,
    stats: BufferStats,
}

impl FrameBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            limit,
            stats: BufferStats::default(),
        }
    }

    /// 追加新收到的字节
    ///
    /// 追加后超过上限时返回溢出错误，缓冲区保持原样，由调用方决定是否清空。
    pub fn append(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let next_len = self.buffer.len() + data.len();
        if next_len > self.limit {
            self.stats.overflows += 1;
            return Err(TransportError::buffer_overflow(next_len, self.limit));
        }

        self.buffer.extend_from_slice(data);
        self.stats.appends += 1;
        self.stats.bytes_appended += data.len() as u64;
        Ok(self.buffer.len())
    }

    /// 用分帧策略提取完整帧，并丢弃已消费的前缀
    ///
    /// 策略 panic 时清空缓冲区并返回分帧错误。
    pub fn extract(&mut self, delimiter: &dyn FrameDelimiter) -> Result<Vec<DecodedFrame>, TransportError> {
        let extraction = match catch_unwind(AssertUnwindSafe(|| delimiter.extract(&self.buffer))) {
            Ok(Some(extraction)) => extraction,
            Ok(None) => return Ok(Vec::new()),
            Err(panic) => {
                self.buffer.clear();
                return Err(TransportError::framing_error(delimiter.name(), panic_message(&panic)));
            }
        };

        let consumed = extraction.consumed.min(self.buffer.len());
        self.buffer.advance(consumed);
        self.stats.frames_extracted += extraction.frames.len() as u64;
        Ok(extraction.frames)
    }

    /// 清空缓冲区（保留容量）
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }
}
