//! 分帧策略
//!
//! 分帧策略是一个纯函数：给定当前累积的字节，返回零个或多个完整帧以及
//! 已消费的字节数；数据不足时返回 `None`。同样的输入必须得到同样的结果。

pub mod text;
pub mod binary;
pub mod json;

use bytes::Bytes;

pub use text::CharacterDelimited;
pub use binary::{ByteDelimited, FixedSize, LengthPrefixed};
pub use json::JsonDocument;

/// 解码后的帧内容
#[derive(Debug, Clone, PartialEq)]
pub enum FrameValue {
    /// UTF-8 文本（非法字节按替换字符处理）
    Text(String),
    /// 原始字节
    Bytes(Bytes),
    /// JSON 文档
    Json(serde_json::Value),
}

impl FrameValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FrameValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            FrameValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FrameValue::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameValue::Text(text) => write!(f, "{}", text),
            FrameValue::Bytes(bytes) => write!(f, "{:?}", bytes),
            FrameValue::Json(value) => write!(f, "{}", value),
        }
    }
}

/// 单个解码结果
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// 解码后的值
    pub value: FrameValue,
    /// 产生该值的原始字节
    pub raw: Bytes,
}

impl DecodedFrame {
    pub fn new(value: FrameValue, raw: impl Into<Bytes>) -> Self {
        Self { value, raw: raw.into() }
    }

    pub fn text(text: impl Into<String>, raw: &[u8]) -> Self {
        Self::new(FrameValue::Text(text.into()), Bytes::copy_from_slice(raw))
    }

    pub fn bytes(raw: &[u8]) -> Self {
        let raw = Bytes::copy_from_slice(raw);
        Self::new(FrameValue::Bytes(raw.clone()), raw)
    }
}

/// 一次提取的结果
///
/// `consumed` 是缓冲区头部可以丢弃的字节数，其后的字节留待下一批数据。
/// `frames` 可以为空：例如连续的分隔符只消费字节而不产生帧。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub frames: Vec<DecodedFrame>,
    pub consumed: usize,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: DecodedFrame, consumed_until: usize) {
        self.frames.push(frame);
        self.consumed = consumed_until;
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.consumed == 0
    }

    /// 没有任何进展时折叠为 `None`
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// 分帧策略抽象
///
/// 任何 `Fn(&[u8]) -> Option<Extraction>` 闭包都自动实现该 trait。
pub trait FrameDelimiter: Send + Sync + 'static {
    /// 从缓冲区中提取完整帧
    fn extract(&self, buffer: &[u8]) -> Option<Extraction>;

    /// 策略名称（用于日志）
    fn name(&self) -> &'static str {
        "custom"
    }
}

impl<F> FrameDelimiter for F
where
    F: Fn(&[u8]) -> Option<Extraction> + Send + Sync + 'static,
{
    fn extract(&self, buffer: &[u8]) -> Option<Extraction> {
        self(buffer)
    }
}

/// 在 `haystack[from..]` 中查找 `needle` 的起始位置
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    if needle.len() == 1 {
        return haystack[from..].iter().position(|b| *b == needle[0]).map(|i| i + from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}
