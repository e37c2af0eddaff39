use serde_json::Value;

use super::{DecodedFrame, Extraction, FrameDelimiter, FrameValue};

/// 自描述的 JSON 文档
///
/// 尝试把缓冲区解析为完整文档；解析失败视为数据尚未到齐（不是错误）。
/// 首尾相连的多个文档会依次产出。顶层建议使用对象或数组：裸数字在
/// 数据被截断时无法判断是否已经结束。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonDocument;

impl FrameDelimiter for JsonDocument {
    fn extract(&self, buffer: &[u8]) -> Option<Extraction> {
        let mut extraction = Extraction::new();
        let mut stream = serde_json::Deserializer::from_slice(buffer).into_iter::<Value>();

        loop {
            let start = extraction.consumed;
            match stream.next() {
                Some(Ok(value)) => {
                    let end = stream.byte_offset();
                    let raw = trim_ascii_whitespace(&buffer[start..end]);
                    extraction.push(DecodedFrame::new(FrameValue::Json(value), bytes::Bytes::copy_from_slice(raw)), end);
                }
                Some(Err(e)) => {
                    if !e.is_eof() {
                        tracing::trace!("JSON 文档暂不可解析: {}", e);
                    }
                    break;
                }
                None => break,
            }
        }

        if extraction.frames.is_empty() {
            return None;
        }
        Some(extraction)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}
