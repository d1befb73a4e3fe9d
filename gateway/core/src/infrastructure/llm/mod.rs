// Copyright (c) 2026 Nexus TimeBank Contributors
// SPDX-License-Identifier: AGPL-3.0

// AI Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each provider adapter translates between our domain interface and an
// external chat API. The factory is the type switch that builds them.

pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use factory::{HttpProviderFactory, ProviderFactory, ProviderSettings};

use crate::domain::llm::LLMError;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;

impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LLMError::Timeout
        } else if err.is_decode() {
            LLMError::Provider(format!("Failed to parse response: {}", err))
        } else {
            LLMError::Network(err.to_string())
        }
    }
}

/// Turn a non-success response into the matching domain error
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, LLMError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let error_text = response.text().await.unwrap_or_default();
    Err(LLMError::from_status(status, error_text, model))
}

/// Bound a whole request and response. Streamed replies are only bounded by
/// the client's read timeout, so a long answer is not cut off mid-stream.
pub(crate) fn with_deadline(
    request: reqwest::RequestBuilder,
    timeout: Option<Duration>,
) -> reqwest::RequestBuilder {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}

pub(crate) fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}

struct LineState<S> {
    body: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

/// Split a chunked HTTP body into text lines. Chunk boundaries from the
/// server do not line up with line boundaries, so partial lines are held
/// until their newline arrives.
pub(crate) fn body_lines<S>(body: S) -> impl Stream<Item = Result<String, LLMError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let state = LineState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(&chunk);
                    while let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                        st.pending.push_back(decode_line(&line));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(LLMError::from(e)), st));
                }
                None => {
                    st.finished = true;
                    if !st.buffer.is_empty() {
                        let rest = std::mem::take(&mut st.buffer);
                        st.pending.push_back(decode_line(&rest));
                    }
                }
            }
        }
    })
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_body_lines_reassembles_split_chunks() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\"")),
            Ok(Bytes::from_static(b":1}\r\n\ndata: [DO")),
            Ok(Bytes::from_static(b"NE]")),
        ];
        let lines: Vec<String> = body_lines(stream::iter(chunks))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: [DONE]"]);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1/", "/api/chat"), "http://h:1/api/chat");
        assert_eq!(
            join_url("https://api.openai.com/v1", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
