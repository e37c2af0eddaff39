//! 分帧结果只取决于字节流本身，与数据如何被切分成批次无关

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tcpmux::{
    ByteDelimited, CharacterDelimited, DecodedFrame, FixedSize, FrameBuffer, FrameDelimiter,
    FrameValue, JsonDocument, LengthPrefixed,
};

const LIMIT: usize = 64 * 1024;

/// 按给定批次喂入缓冲区，收集所有帧
fn feed(delimiter: &dyn FrameDelimiter, chunks: &[&[u8]]) -> Vec<DecodedFrame> {
    let mut buffer = FrameBuffer::new(LIMIT);
    let mut frames = Vec::new();
    for chunk in chunks {
        buffer.append(chunk).unwrap();
        frames.extend(buffer.extract(delimiter).unwrap());
    }
    frames
}

/// 随机切分
fn random_chunks<'a>(rng: &mut StdRng, stream: &'a [u8]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut rest = stream;
    while !rest.is_empty() {
        let take = rng.gen_range(1..=rest.len().min(7));
        let (head, tail) = rest.split_at(take);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

fn assert_chunking_invariant(delimiter: &dyn FrameDelimiter, stream: &[u8]) {
    let expected = feed(delimiter, &[stream]);
    assert!(!expected.is_empty(), "{} produced no frames", delimiter.name());

    let mut rng = StdRng::seed_from_u64(0x7c9_2e11);
    for round in 0..200 {
        let chunks = random_chunks(&mut rng, stream);
        assert_eq!(
            feed(delimiter, &chunks),
            expected,
            "{} diverged in round {} with {} chunks",
            delimiter.name(),
            round,
            chunks.len()
        );
    }

    let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
    assert_eq!(feed(delimiter, &bytewise), expected);
}

#[test]
fn test_character_delimited_is_chunk_independent() {
    let stream = "héllo\r\nwörld\r\n\r\nlast\r\npartial".as_bytes();
    let delimiter = CharacterDelimited::new("\r\n");
    assert_chunking_invariant(&delimiter, stream);

    let frames = feed(&delimiter, &[stream]);
    let texts: Vec<_> = frames.iter().filter_map(|f| f.value.as_text()).collect();
    assert_eq!(texts, ["héllo", "wörld", "", "last"]);
}

#[test]
fn test_byte_delimited_is_chunk_independent() {
    let stream = b"\x00\x00alpha\x00beta\x00\x00gamma\x00tail";
    assert_chunking_invariant(&ByteDelimited(0), stream);

    let frames = feed(&ByteDelimited(0), &[&stream[..]]);
    let raws: Vec<_> = frames.iter().map(|f| f.raw.clone()).collect();
    assert_eq!(
        raws,
        [
            Bytes::from_static(b"alpha"),
            Bytes::from_static(b"beta"),
            Bytes::from_static(b"gamma")
        ]
    );
}

#[test]
fn test_length_prefixed_is_chunk_independent() {
    let mut stream = Vec::new();
    for payload in [&b"first"[..], b"", b"a longer third payload", b"\x00\x01\x02"] {
        stream.extend_from_slice(&LengthPrefixed::encode(payload));
    }
    stream.extend_from_slice(&[0, 0, 0, 9, b'c', b'u', b't']);

    assert_chunking_invariant(&LengthPrefixed, &stream);
    assert_eq!(feed(&LengthPrefixed, &[&stream[..]]).len(), 4);
}

#[test]
fn test_length_prefixed_waits_for_full_payload() {
    let frames = feed(&LengthPrefixed, &[&[0, 0, 0, 5, b'h', b'e'], b"llo"]);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].value, FrameValue::Bytes(Bytes::from_static(b"hello")));
}

#[test]
fn test_fixed_size_is_chunk_independent() {
    let stream: Vec<u8> = (0u8..=100).collect();
    assert_chunking_invariant(&FixedSize(8), &stream);
    assert_eq!(feed(&FixedSize(8), &[&stream[..]]).len(), 12);
}

#[test]
fn test_json_documents_are_chunk_independent() {
    let stream = br#"{"id":1,"tags":["a","b"]} [1,2,{"nested":{"x":"}"}}]
        {"text":"line\nbreak","ok":true}{"trailing":"#;
    assert_chunking_invariant(&JsonDocument, stream);

    let frames = feed(&JsonDocument, &[&stream[..]]);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].value.as_json().unwrap()["id"], 1);
    assert_eq!(frames[2].value.as_json().unwrap()["ok"], true);
}

#[test]
fn test_closure_delimiter_is_chunk_independent() {
    // 以 ';' 结尾的记录，保留分隔符
    let semicolons = |buffer: &[u8]| {
        let mut extraction = tcpmux::Extraction::new();
        let mut start = 0;
        for (index, byte) in buffer.iter().enumerate() {
            if *byte == b';' {
                extraction.push(DecodedFrame::bytes(&buffer[start..=index]), index + 1);
                start = index + 1;
            }
        }
        extraction.into_option()
    };

    assert_chunking_invariant(&semicolons, b"a=1;b=2;;c=3;d");
}
