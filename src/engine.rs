use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::backend::ChatBackend;
use crate::error::{ErrataError, Result};
use crate::message::{Message, MessageId, Role, WireMessage};
use crate::render::{PlainRenderer, Renderer};
use crate::transcript::Transcript;
use crate::view::{Clipboard, CommandClipboard, NullView, TranscriptView};

/// Markup shown in the assistant slot before the first chunk arrives.
const PENDING_MARKUP: &str = r#"<span class="blinking-cursor"></span>"#;

/// Drives the conversation: owns the transcript, runs streamed turns
/// against the chat backend, and keeps a `TranscriptView` consistent with
/// every mutation.
///
/// At most one stream is in flight at a time; mutating operations that
/// arrive while one is are rejected with [`ErrataError::Busy`] rather than
/// interleaved.
pub struct TranscriptEngine<B: ChatBackend> {
    backend: Arc<B>,
    renderer: Box<dyn Renderer>,
    view: Box<dyn TranscriptView>,
    clipboard: Box<dyn Clipboard>,
    transcript: Transcript,
    streaming: bool,
}

impl<B: ChatBackend> TranscriptEngine<B> {
    pub fn new(backend: Arc<B>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            renderer: Box::new(PlainRenderer),
            view: Box::new(NullView),
            clipboard: Box::new(CommandClipboard),
            transcript: Transcript::new(system_prompt),
            streaming: false,
        }
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_view(mut self, view: impl TranscriptView + 'static) -> Self {
        self.view = Box::new(view);
        self
    }

    pub fn with_clipboard(mut self, clipboard: impl Clipboard + 'static) -> Self {
        self.clipboard = Box::new(clipboard);
        self
    }

    /// Resume from a previously persisted transcript (history replay).
    /// The view is replayed to match, one append per visible message, so
    /// install the view and renderer before calling this.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        for message in transcript.messages().iter().skip(1) {
            let markup = match message.role {
                Role::Assistant => self.renderer.render(&message.content),
                _ => message.content.clone(),
            };
            self.view.append_message(message.id, message.role, &markup);
        }
        self.transcript = transcript;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.streaming {
            return Err(ErrataError::Busy);
        }
        Ok(())
    }

    /// Submit a new user turn and stream the reply. Input that is empty
    /// after trimming is silently dropped.
    pub async fn submit(&mut self, text: &str) -> Result<()> {
        self.ensure_idle()?;
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring empty submission");
            return Ok(());
        }

        let message = Message::user(text);
        self.view
            .append_message(message.id, Role::User, &message.content);
        self.transcript.push(message);

        let history = self.transcript.wire_history();
        self.stream_response(history).await;
        Ok(())
    }

    /// Remove the identified message and everything after it, in model
    /// and view. Unknown ids are ignored.
    pub fn delete_from(&mut self, id: MessageId) -> Result<()> {
        self.ensure_idle()?;
        if self.transcript.truncate_from(id) {
            self.view.remove_from(id);
        }
        Ok(())
    }

    /// Replace an assistant turn (and everything after it) with a freshly
    /// generated one, using the same preceding history. Ignored for
    /// unknown ids and non-assistant messages.
    pub async fn regenerate(&mut self, id: MessageId) -> Result<()> {
        self.ensure_idle()?;
        let Some(position) = self.transcript.position(id) else {
            return Ok(());
        };
        if self.transcript.messages()[position].role != Role::Assistant {
            debug!(%id, "regenerate ignored: not an assistant message");
            return Ok(());
        }

        let history: Vec<WireMessage> = self.transcript.messages()[..position]
            .iter()
            .map(Message::to_wire)
            .collect();
        self.transcript.truncate_from(id);
        self.view.remove_from(id);

        self.stream_response(history).await;
        Ok(())
    }

    /// Rewrite a user message, discard every later turn, and stream a
    /// fresh reply against the edited history. Ignored for unknown ids,
    /// non-user messages and text that is empty after trimming.
    pub async fn edit(&mut self, id: MessageId, new_text: &str) -> Result<()> {
        self.ensure_idle()?;
        let new_text = new_text.trim();
        if new_text.is_empty() {
            debug!("ignoring empty edit");
            return Ok(());
        }
        let Some(position) = self.transcript.position(id) else {
            return Ok(());
        };
        if self.transcript.messages()[position].role != Role::User {
            debug!(%id, "edit ignored: not a user message");
            return Ok(());
        }

        self.transcript.set_content(id, new_text);
        self.view.update_message(id, new_text);
        if let Some(next) = self.transcript.next_after(id) {
            self.transcript.truncate_from(next);
            self.view.remove_from(next);
        }

        let history = self.transcript.wire_history();
        self.stream_response(history).await;
        Ok(())
    }

    /// Put a message's displayed text on the clipboard. Never mutates the
    /// transcript; a failure surfaces as a view notice.
    pub fn copy(&mut self, id: MessageId) -> Result<()> {
        let Some(message) = self.transcript.get(id) else {
            return Ok(());
        };
        let displayed = self.renderer.render(&message.content);
        if let Err(err) = self.clipboard.write_text(&displayed) {
            warn!("copy failed: {err}");
            self.view.notice("Copy failed!");
            return Err(err);
        }
        Ok(())
    }

    /// Discard the conversation and reseed the system message. The
    /// page-reload analog.
    pub fn reset(&mut self, system_prompt: impl Into<String>) -> Result<()> {
        self.ensure_idle()?;
        if let Some(first_visible) = self.transcript.messages().get(1) {
            self.view.remove_from(first_visible.id);
        }
        self.transcript = Transcript::new(system_prompt);
        Ok(())
    }

    /// One full request/response cycle. The pending assistant slot is
    /// created up front and becomes the authoritative record when the
    /// stream settles; whatever happens, the input affordance is
    /// re-enabled before this returns. Failures terminate in the visible
    /// error-message state and never propagate.
    async fn stream_response(&mut self, history: Vec<WireMessage>) {
        let id = MessageId::new();
        self.view.append_message(id, Role::Assistant, PENDING_MARKUP);
        self.view.set_input_enabled(false);
        self.streaming = true;

        let content = match self.drive_stream(id, &history).await {
            Ok(content) => content,
            Err(err) => {
                warn!("chat stream failed: {err}");
                let text = format!("Sorry, an error occurred: {err}");
                self.view.update_message(id, &text);
                text
            }
        };

        self.transcript.push(Message {
            id,
            role: Role::Assistant,
            content,
        });
        self.streaming = false;
        self.view.set_input_enabled(true);
    }

    async fn drive_stream(&mut self, id: MessageId, history: &[WireMessage]) -> Result<String> {
        let mut stream = self.backend.stream_chat(history).await?;
        // The backend accepted the turn: clear the pending cursor so the
        // display always equals the rendered accumulated text.
        let markup = self.renderer.render("");
        self.view.update_message(id, &markup);

        let mut accumulated = String::new();
        while let Some(chunk) = stream.next().await {
            accumulated.push_str(&chunk?);
            // Full replace on every chunk: the render input is the whole
            // accumulated text, never a delta.
            let markup = self.renderer.render(&accumulated);
            self.view.update_message(id, &markup);
        }
        Ok(accumulated)
    }
}
