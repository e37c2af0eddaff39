use super::{find_subslice, DecodedFrame, Extraction, FrameDelimiter};

/// 按字符串分隔符切分
///
/// 返回所有完整片段（最后一个不完整片段留在缓冲区），空片段保留为空字符串。
/// 分隔符按字节匹配，因此多字节字符跨越两批数据不会影响结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterDelimited {
    delimiter: String,
}

impl CharacterDelimited {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self { delimiter: delimiter.into() }
    }

    /// 换行分隔
    pub fn lines() -> Self {
        Self::new("\n")
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

impl FrameDelimiter for CharacterDelimited {
    fn extract(&self, buffer: &[u8]) -> Option<Extraction> {
        let needle = self.delimiter.as_bytes();
        let mut extraction = Extraction::new();
        let mut start = 0;

        while let Some(pos) = find_subslice(buffer, needle, start) {
            let segment = &buffer[start..pos];
            let text = String::from_utf8_lossy(segment);
            start = pos + needle.len();
            extraction.push(DecodedFrame::text(text, segment), start);
        }

        extraction.into_option()
    }

    fn name(&self) -> &'static str {
        "character_delimited"
    }
}
