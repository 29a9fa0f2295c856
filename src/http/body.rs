//! Bounded JSON body reader
//!
//! Turns an inbound HTTP request body into a parsed JSON value while never
//! holding more than the configured number of bytes in memory.

use std::{error::Error as StdError, io};

use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;
use http_body::Body;
use http_body_util::BodyExt;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::errors::{reason_data, RpcError};

pub const DEFAULT_MAX_BODY_BYTES: usize = 100_000;
pub const REQUIRED_METHOD: Method = Method::POST;
pub const REQUIRED_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    pub max_body_bytes: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("invalid http method: {0}")]
    MethodNotAllowed(Method),
    #[error("invalid content type: {0}")]
    UnsupportedContentType(String),
    #[error("entity too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: u64, limit: usize },
    #[error("request size {received} did not match content length {declared}")]
    LengthMismatch { declared: u64, received: usize },
    #[error("request aborted")]
    Aborted,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed json: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl BodyError {
    /// True for policy rejections made on the request head or on size,
    /// as opposed to failures to read or parse the body.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MethodNotAllowed(_)
                | Self::UnsupportedContentType(_)
                | Self::PayloadTooLarge { .. }
        )
    }
}

impl From<BodyError> for RpcError {
    fn from(err: BodyError) -> Self {
        RpcError::parse_error().with_data(reason_data(&err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Receiving,
    Rejected,
    Completed,
    Aborted,
}

/// Accumulates body chunks under a hard byte ceiling.
///
/// Leaving `Receiving` is a one-way latch: once rejected, aborted or completed
/// the reader refuses every further chunk and never yields a second outcome.
#[derive(Debug)]
pub struct BoundedBodyReader {
    limit: usize,
    declared: Option<u64>,
    buffer: Vec<u8>,
    state: ReadState,
}

impl BoundedBodyReader {
    /// Checks the request head and opens a reader, reading no body bytes.
    pub fn open(
        method: &Method,
        headers: &HeaderMap,
        limits: BodyLimits,
    ) -> Result<Self, BodyError> {
        if *method != REQUIRED_METHOD {
            return Err(BodyError::MethodNotAllowed(method.clone()));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !is_json_content_type(content_type) {
            return Err(BodyError::UnsupportedContentType(content_type.to_string()));
        }

        let declared = declared_length(headers);
        if let Some(size) = declared {
            if size > limits.max_body_bytes as u64 {
                return Err(BodyError::PayloadTooLarge {
                    size,
                    limit: limits.max_body_bytes,
                });
            }
        }

        let capacity = declared
            .map(|size| size as usize)
            .unwrap_or(0)
            .min(limits.max_body_bytes);

        Ok(Self {
            limit: limits.max_body_bytes,
            declared,
            buffer: Vec::with_capacity(capacity),
            state: ReadState::Receiving,
        })
    }

    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a chunk, failing before the buffer would grow past the limit.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), BodyError> {
        match self.state {
            ReadState::Receiving => {}
            ReadState::Aborted => return Err(BodyError::Aborted),
            ReadState::Rejected | ReadState::Completed => {
                return Err(BodyError::Transport("chunk after completion".to_string()))
            }
        }

        let size = self.buffer.len() + chunk.len();
        if size > self.limit {
            self.reject();
            return Err(BodyError::PayloadTooLarge {
                size: size as u64,
                limit: self.limit,
            });
        }

        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Records a transport failure and releases the buffer.
    pub fn fail(&mut self, err: BodyError) -> BodyError {
        self.state = if matches!(err, BodyError::Aborted) {
            ReadState::Aborted
        } else {
            ReadState::Rejected
        };
        self.buffer = Vec::new();
        err
    }

    /// Consumes the reader at end of stream and parses the accumulated bytes.
    pub fn finish(mut self) -> Result<Value, BodyError> {
        if self.state != ReadState::Receiving {
            return Err(BodyError::Transport("reader already completed".to_string()));
        }
        self.state = ReadState::Completed;

        if let Some(declared) = self.declared {
            if declared != self.buffer.len() as u64 {
                return Err(BodyError::LengthMismatch {
                    declared,
                    received: self.buffer.len(),
                });
            }
        }

        Ok(serde_json::from_slice(&self.buffer)?)
    }

    fn reject(&mut self) {
        self.state = ReadState::Rejected;
        self.buffer = Vec::new();
    }
}

/// Reads `body` to completion under `limits` and parses it as JSON.
///
/// The body is dropped on every exit path, releasing the underlying stream.
pub async fn read_json_body<B>(
    method: &Method,
    headers: &HeaderMap,
    body: B,
    limits: BodyLimits,
) -> Result<Value, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: StdError + Send + Sync + 'static,
{
    let mut reader = BoundedBodyReader::open(method, headers, limits)?;
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                let err = classify_transport_error(&err);
                debug!(error = %err, received = reader.received(), "body stream failed");
                return Err(reader.fail(err));
            }
        };

        // Trailers carry no payload.
        if let Ok(data) = frame.into_data() {
            reader.push_chunk(&data)?;
        }
    }

    reader.finish()
}

fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case(REQUIRED_CONTENT_TYPE))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn classify_transport_error(err: &(dyn StdError + 'static)) -> BodyError {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(hyper_err) = source.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                return BodyError::Aborted;
            }
        }
        if let Some(io_err) = source.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return BodyError::Aborted;
            }
        }
        current = source.source();
    }

    BodyError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::HeaderValue;

    use super::*;

    fn json_headers(length: Option<usize>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(length) = length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
        headers
    }

    fn limits(max_body_bytes: usize) -> BodyLimits {
        BodyLimits { max_body_bytes }
    }

    fn chunked(chunks: Vec<Result<&'static str, io::Error>>) -> Body {
        Body::from_stream(futures::stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(|text| Bytes::from_static(text.as_bytes()))),
        ))
    }

    #[tokio::test]
    async fn parses_chunked_body() {
        let body = chunked(vec![Ok(r#"{"jsonrpc":"2.0","#), Ok(r#""method":"add"}"#)]);
        let value = read_json_body(&Method::POST, &json_headers(None), body, limits(1024))
            .await
            .expect("body should parse");
        assert_eq!(value["method"], "add");
    }

    #[tokio::test]
    async fn rejects_non_post_before_reading() {
        let err = read_json_body(&Method::GET, &json_headers(None), Body::empty(), limits(1024))
            .await
            .expect_err("GET must be rejected");
        assert!(matches!(err, BodyError::MethodNotAllowed(_)));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn rejects_wrong_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let err = read_json_body(&Method::POST, &headers, Body::from("{}"), limits(1024))
            .await
            .expect_err("text/plain must be rejected");
        assert!(matches!(err, BodyError::UnsupportedContentType(_)));
    }

    #[tokio::test]
    async fn accepts_content_type_with_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        let value = read_json_body(&Method::POST, &headers, Body::from("[1,2]"), limits(1024))
            .await
            .expect("charset parameter is allowed");
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn rejects_declared_oversize_without_reading() {
        let err = read_json_body(
            &Method::POST,
            &json_headers(Some(2048)),
            chunked(vec![Err(io::Error::other("body must not be polled"))]),
            limits(1024),
        )
        .await
        .expect_err("declared oversize must be rejected");
        assert!(matches!(err, BodyError::PayloadTooLarge { size: 2048, .. }));
    }

    #[tokio::test]
    async fn stops_reading_once_stream_exceeds_limit() {
        let body = chunked(vec![
            Ok("[\"aaaaaaaa\","),
            Ok("\"bbbbbbbb\","),
            Err(io::Error::other("stream polled past the limit")),
        ]);
        let err = read_json_body(&Method::POST, &json_headers(None), body, limits(16))
            .await
            .expect_err("oversized stream must be rejected");
        assert!(matches!(err, BodyError::PayloadTooLarge { size: 23, limit: 16 }));
    }

    #[tokio::test]
    async fn client_disconnect_is_reported_as_abort() {
        let body = chunked(vec![
            Ok("{\"jsonrpc\":"),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        ]);
        let err = read_json_body(&Method::POST, &json_headers(None), body, limits(1024))
            .await
            .expect_err("reset must abort");
        assert!(matches!(err, BodyError::Aborted));
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn other_stream_failures_are_transport_errors() {
        let body = chunked(vec![Err(io::Error::other("tls alert"))]);
        let err = read_json_body(&Method::POST, &json_headers(None), body, limits(1024))
            .await
            .expect_err("stream error must fail");
        assert!(matches!(err, BodyError::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_failure() {
        let err = read_json_body(
            &Method::POST,
            &json_headers(None),
            Body::from("{nope"),
            limits(1024),
        )
        .await
        .expect_err("malformed json must fail");
        assert!(matches!(err, BodyError::Malformed(_)));
        assert!(!err.is_rejection());
    }

    #[test]
    fn length_mismatch_is_detected_at_end_of_stream() {
        let mut reader =
            BoundedBodyReader::open(&Method::POST, &json_headers(Some(10)), limits(1024))
                .expect("head is valid");
        reader.push_chunk(b"{}").expect("chunk fits");
        let err = reader.finish().expect_err("length differs from declaration");
        assert!(matches!(err, BodyError::LengthMismatch { declared: 10, received: 2 }));
    }

    #[test]
    fn rejected_reader_refuses_further_chunks() {
        let mut reader = BoundedBodyReader::open(&Method::POST, &json_headers(None), limits(4))
            .expect("head is valid");
        assert!(reader.push_chunk(b"12345").is_err());
        assert_eq!(reader.received(), 0);
        assert!(reader.push_chunk(b"1").is_err());
        assert!(reader.finish().is_err());
    }

    #[test]
    fn aborted_reader_keeps_reporting_abort() {
        let mut reader = BoundedBodyReader::open(&Method::POST, &json_headers(None), limits(64))
            .expect("head is valid");
        reader.push_chunk(b"{").expect("chunk fits");
        let _ = reader.fail(BodyError::Aborted);
        assert!(matches!(reader.push_chunk(b"}"), Err(BodyError::Aborted)));
        assert!(reader.finish().is_err());
    }

    #[test]
    fn body_errors_map_to_parse_error_with_reason() {
        let err = RpcError::from(BodyError::Aborted);
        assert_eq!(err.code(), -32700);
        assert_eq!(err.message, "Parse error");
        assert_eq!(err.data, Some(serde_json::json!({"reason": "request aborted"})));
    }
}
