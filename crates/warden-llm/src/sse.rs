//! # SSE decoding
//!
//! Turns a chunked HTTP body into completion tokens:
//! - bytes are buffered until a full line is available
//! - `data:` payloads are extracted; comments, blank lines and `[DONE]` are
//!   skipped
//! - each payload is decoded as either an OpenAI-style chunk
//!   (`choices[0].delta.content`) or a flat `{"response": "..."}` chunk
//!
//! Body read errors and in-band `error` payloads end the stream with an `Err`.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::errors::CompletionError;

/// Split a byte stream into SSE `data:` payloads.
pub fn data_lines<S>(byte_stream: S) -> impl Stream<Item = Result<String, CompletionError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }
                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };
                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "completion stream read error");
                        return Some((Err(CompletionError::Http(e)), (stream, buffer, true)));
                    }
                    None => {
                        // Last line may lack a trailing newline.
                        let tail = std::str::from_utf8(&buffer).ok().and_then(extract_sse_data);
                        buffer.clear();
                        return tail.map(|data| (Ok(data), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Payload of a `data:` line, or `None` for comments, blanks and `[DONE]`.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one payload into a token.
///
/// `Ok(None)` means the chunk carried no text (role preamble, usage, finish
/// reason). Unparseable payloads are logged and skipped.
pub fn decode_token(data: &str) -> Result<Option<String>, CompletionError> {
    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "skipping unparseable completion chunk");
            return Ok(None);
        }
    };

    if let Some(error) = payload.error {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| error.to_string(), str::to_owned);
        return Err(CompletionError::Stream { message });
    }

    let token = payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .or(payload.response);
    Ok(token.filter(|t| !t.is_empty()))
}

/// Full pipeline: bytes → payloads → non-empty tokens.
pub fn token_stream<S>(byte_stream: S) -> impl Stream<Item = Result<String, CompletionError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    data_lines(byte_stream).filter_map(|line| match line {
        Ok(data) => decode_token(&data).transpose(),
        Err(e) => Some(Err(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))))
    }

    async fn collect<S: Stream<Item = Result<String, CompletionError>>>(s: S) -> Vec<String> {
        let mut s = std::pin::pin!(s);
        let mut out = Vec::new();
        while let Some(item) = s.next().await {
            out.push(item.unwrap());
        }
        out
    }

    // ── extract_sse_data ──

    #[test]
    fn extract_skips_noise() {
        assert_eq!(extract_sse_data("data: {\"a\":1}"), Some("{\"a\":1}".into()));
        assert_eq!(extract_sse_data("data:{}"), Some("{}".into()));
        assert_eq!(extract_sse_data(": keep-alive"), None);
        assert_eq!(extract_sse_data("data: [DONE]"), None);
        assert_eq!(extract_sse_data("event: ping"), None);
        assert_eq!(extract_sse_data(""), None);
    }

    // ── data_lines ──

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let s = bytes_stream(vec!["data: {\"x\"", ":1}\r\n\ndata: [DONE]\n\n"]);
        assert_eq!(collect(data_lines(s)).await, vec!["{\"x\":1}".to_string()]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let s = bytes_stream(vec!["data: {\"response\":\"hi\"}"]);
        assert_eq!(collect(data_lines(s)).await, vec!["{\"response\":\"hi\"}".to_string()]);
    }

    // ── decode_token ──

    #[test]
    fn decodes_openai_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"},"index":0}]}"#;
        assert_eq!(decode_token(data).unwrap(), Some("Hel".into()));
    }

    #[test]
    fn decodes_flat_response() {
        assert_eq!(decode_token(r#"{"response":"lo"}"#).unwrap(), Some("lo".into()));
    }

    #[test]
    fn empty_and_role_only_chunks_yield_nothing() {
        assert_eq!(decode_token(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), None);
        assert_eq!(decode_token(r#"{"response":""}"#).unwrap(), None);
        assert_eq!(decode_token("not json").unwrap(), None);
    }

    #[test]
    fn inband_error_is_surfaced() {
        let err = decode_token(r#"{"error":{"message":"model overloaded"}}"#).unwrap_err();
        assert!(err.to_string().contains("model overloaded"));
    }

    // ── token_stream ──

    #[tokio::test]
    async fn tokens_in_order() {
        let s = bytes_stream(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        assert_eq!(collect(token_stream(s)).await, vec!["Hel", "lo", " world"]);
    }
}
