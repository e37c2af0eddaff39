use super::{DecodedFrame, Extraction, FrameDelimiter};

/// 长度头大小（4 字节，大端）
pub const LENGTH_HEADER_SIZE: usize = 4;

/// 按单字节分隔符切分，不做文本解码
///
/// 连续分隔符之间的空片段会被跳过（只消费，不产生帧）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteDelimited(pub u8);

impl FrameDelimiter for ByteDelimited {
    fn extract(&self, buffer: &[u8]) -> Option<Extraction> {
        let mut extraction = Extraction::new();
        let mut start = 0;

        for (i, byte) in buffer.iter().enumerate() {
            if *byte != self.0 {
                continue;
            }
            if i > start {
                extraction.frames.push(DecodedFrame::bytes(&buffer[start..i]));
            }
            start = i + 1;
            extraction.consumed = start;
        }

        extraction.into_option()
    }

    fn name(&self) -> &'static str {
        "byte_delimited"
    }
}

/// 4 字节大端长度前缀
///
/// 帧值只包含负载；`raw` 包含长度头和负载。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LengthPrefixed;

impl LengthPrefixed {
    /// 编码一个带长度头的帧
    pub fn encode(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(LENGTH_HEADER_SIZE + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

impl FrameDelimiter for LengthPrefixed {
    fn extract(&self, buffer: &[u8]) -> Option<Extraction> {
        let mut extraction = Extraction::new();
        let mut offset = 0;

        while buffer.len() - offset >= LENGTH_HEADER_SIZE {
            let header = &buffer[offset..offset + LENGTH_HEADER_SIZE];
            let payload_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let end = match (offset + LENGTH_HEADER_SIZE).checked_add(payload_len) {
                Some(end) if end <= buffer.len() => end,
                _ => break,
            };

            let raw = bytes::Bytes::copy_from_slice(&buffer[offset..end]);
            let payload = raw.slice(LENGTH_HEADER_SIZE..);
            extraction.push(DecodedFrame::new(super::FrameValue::Bytes(payload), raw), end);
            offset = end;
        }

        extraction.into_option()
    }

    fn name(&self) -> &'static str {
        "length_prefixed"
    }
}

/// 固定长度帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSize(pub usize);

impl FrameDelimiter for FixedSize {
    fn extract(&self, buffer: &[u8]) -> Option<Extraction> {
        if self.0 == 0 {
            return None;
        }

        let mut extraction = Extraction::new();
        for (i, chunk) in buffer.chunks_exact(self.0).enumerate() {
            extraction.push(DecodedFrame::bytes(chunk), (i + 1) * self.0);
        }

        extraction.into_option()
    }

    fn name(&self) -> &'static str {
        "fixed_size"
    }
}
