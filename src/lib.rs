//! Client-side conversation core for an AI-assisted mistake notebook.
//!
//! The crate provides a small transcript runtime:
//! - A chat `Transcript` with cascade-delete, edit and regenerate semantics.
//! - A `ChatBackend` abstraction over the streaming chat endpoint.
//! - A `TranscriptEngine` that keeps the transcript and a `TranscriptView`
//!   consistent while responses stream in.

mod backend;
mod config;
mod engine;
mod error;
pub mod logging;
mod message;
mod render;
mod storage;
mod transcript;
mod view;

pub use backend::{ChatBackend, ChunkStream, HttpChatBackend, StubBackend, StubTurn};
pub use config::{AppConfig, BackendConfig, ChatConfig, StorageConfig};
pub use engine::TranscriptEngine;
pub use error::{ErrataError, Result};
pub use message::{Message, MessageId, Role, WireMessage};
pub use render::{PlainRenderer, Renderer};
#[cfg(feature = "persistence")]
pub use storage::SqlTranscriptStore;
pub use storage::{FileTranscriptStore, TranscriptStore};
pub use transcript::Transcript;
pub use view::{
    BrokenClipboard, Clipboard, CommandClipboard, MemoryClipboard, NullView, RecordingView,
    TranscriptView, ViewOp,
};
