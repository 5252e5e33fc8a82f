//! Chat backend abstraction and the streaming HTTP client.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::config::BackendConfig;
use crate::error::{ErrataError, Result};
use crate::message::WireMessage;

/// Incremental UTF-8 text chunks from the backend. Stream end signals
/// completion; an `Err` item signals a mid-stream transport failure.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Minimal abstraction around the streaming chat endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Submit the full desired context for this turn and open the
    /// response stream. An `Err` here means the turn failed before any
    /// content was produced.
    async fn stream_chat(&self, messages: &[WireMessage]) -> Result<ChunkStream>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str) -> ErrataError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ErrataError::Backend(format!("rate limit exceeded: {body}"));
    }
    ErrataError::Backend(format!("request failed with {status}: {body}"))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [WireMessage],
}

/// Streaming client for the notebook's chat endpoint. The request body is
/// the ordered history reduced to `{role, content}` objects; the response
/// body is plain incremental markdown.
#[derive(Clone)]
pub struct HttpChatBackend {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpChatBackend {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(60))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| ErrataError::Backend(format!("http client error: {err}")))?,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(cfg: &BackendConfig) -> Result<Self> {
        Self::with_timeout(&cfg.endpoint, Duration::from_secs(cfg.timeout_secs))
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn stream_chat(&self, messages: &[WireMessage]) -> Result<ChunkStream> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&ChatRequest { messages })
            .send()
            .await
            .map_err(|err| ErrataError::Backend(format!("request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body));
        }

        let stream = resp.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|err| ErrataError::Backend(format!("stream error: {err}")))
        });
        Ok(Box::pin(stream))
    }
}

/// Scripted outcome for one `stream_chat` call.
#[derive(Debug, Clone)]
pub enum StubTurn {
    /// Stream these chunks, then complete.
    Chunks(Vec<String>),
    /// Fail before producing any content.
    ConnectError(String),
    /// Stream these chunks, then fail mid-stream.
    Interrupted(Vec<String>, String),
}

impl StubTurn {
    pub fn chunks(parts: &[&str]) -> Self {
        StubTurn::Chunks(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// Deterministic backend for tests: plays back scripted turns in order
/// and records every submitted history.
pub struct StubBackend {
    turns: Mutex<VecDeque<StubTurn>>,
    requests: Mutex<Vec<Vec<WireMessage>>>,
}

impl StubBackend {
    pub fn new(turns: Vec<StubTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Histories submitted so far, in call order.
    pub fn requests(&self) -> Vec<Vec<WireMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for StubBackend {
    async fn stream_chat(&self, messages: &[WireMessage]) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StubTurn::Chunks(Vec::new()));

        match turn {
            StubTurn::ConnectError(reason) => Err(ErrataError::Backend(reason)),
            StubTurn::Chunks(chunks) => {
                let items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(tokio_stream::iter(items)))
            }
            StubTurn::Interrupted(chunks, reason) => {
                let mut items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
                items.push(Err(ErrataError::Backend(reason)));
                Ok(Box::pin(tokio_stream::iter(items)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Role};

    #[tokio::test]
    async fn stub_plays_turns_in_order_and_records_requests() {
        let backend = StubBackend::new(vec![
            StubTurn::chunks(&["4", "."]),
            StubTurn::ConnectError("boom".into()),
        ]);
        let history = vec![Message::system("ctx").to_wire(), Message::user("2+2?").to_wire()];

        let mut stream = backend.stream_chat(&history).await.unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "4.");

        let err = match backend.stream_chat(&history).await {
            Ok(_) => panic!("expected stream_chat to return an error"),
            Err(e) => e,
        };
        assert!(matches!(err, ErrataError::Backend(reason) if reason == "boom"));

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0][1].role, Role::User);
    }

    #[tokio::test]
    async fn exhausted_stub_completes_with_an_empty_stream() {
        let backend = StubBackend::new(Vec::new());
        let mut stream = backend.stream_chat(&[]).await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn rate_limits_get_their_own_wording() {
        let err = coalesce_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(
            err.to_string(),
            "chat backend error: rate limit exceeded: slow down"
        );

        let err = coalesce_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn http_backend_is_object_safe() {
        let client = HttpChatBackend::new("http://127.0.0.1:5000/chat-stream").unwrap();
        let _: Box<dyn ChatBackend> = Box::new(client);
    }
}
