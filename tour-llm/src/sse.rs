use crate::error::{LlmError, Result};
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use futures_util::StreamExt;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Data(String),
    Other,
}

pub(crate) fn decode_sse<S>(bytes_stream: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    // Frames are split on raw bytes; a chunk may end inside a UTF-8 sequence.
    futures_util::stream::unfold(
        (bytes_stream, BytesMut::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some((idx, delim)) = find_frame_end(&buffer) {
                    let frame = buffer.split_to(idx + delim);
                    let parsed = frame_text(&frame[..idx]).map(parse_frame);
                    return Some((parsed, (stream, buffer)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        continue;
                    }
                    Some(Err(e)) => {
                        return Some((Err(LlmError::Http(e.to_string())), (stream, buffer)));
                    }
                    None => {
                        // Servers may close without a trailing blank line.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let frame = buffer.split();
                        let parsed = frame_text(&frame).map(parse_frame);
                        return Some((parsed, (stream, buffer)));
                    }
                }
            }
        },
    )
}

fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_bytes(buffer, b"\n\n").map(|i| (i, 2));
    let crlf = find_bytes(buffer, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn frame_text(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| LlmError::StreamParse(format!("sse frame is not valid utf-8: {e}")))
}

fn parse_frame(raw: &str) -> SseEvent {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if data_lines.is_empty() {
        return SseEvent::Other;
    }
    SseEvent::Data(data_lines.join("\n"))
}
