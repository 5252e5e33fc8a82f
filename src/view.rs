use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use crate::error::{ErrataError, Result};
use crate::message::{MessageId, Role};

/// The surface the engine keeps in sync with the transcript. Views never
/// receive the system message; the engine only drives them with user and
/// assistant entries.
pub trait TranscriptView: Send {
    /// Add a message slot at the end of the conversation.
    fn append_message(&mut self, id: MessageId, role: Role, markup: &str);

    /// Replace the displayed markup for a message wholesale.
    fn update_message(&mut self, id: MessageId, markup: &str);

    /// Remove the identified message and everything after it.
    fn remove_from(&mut self, id: MessageId);

    /// Gate the submit affordance while a stream is in flight.
    fn set_input_enabled(&mut self, enabled: bool);

    /// Transient, non-modal notification (e.g. "Copy failed!").
    fn notice(&mut self, text: &str);
}

/// View that drops every effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl TranscriptView for NullView {
    fn append_message(&mut self, _id: MessageId, _role: Role, _markup: &str) {}
    fn update_message(&mut self, _id: MessageId, _markup: &str) {}
    fn remove_from(&mut self, _id: MessageId) {}
    fn set_input_enabled(&mut self, _enabled: bool) {}
    fn notice(&mut self, _text: &str) {}
}

/// Every effect the engine pushed at a `RecordingView`, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOp {
    Append {
        id: MessageId,
        role: Role,
        markup: String,
    },
    Update {
        id: MessageId,
        markup: String,
    },
    RemoveFrom {
        id: MessageId,
    },
    InputEnabled(bool),
    Notice(String),
}

#[derive(Debug, Default)]
struct RecordingState {
    ops: Vec<ViewOp>,
    entries: Vec<(MessageId, Role, String)>,
    input_enabled: bool,
    notices: Vec<String>,
}

/// A view double that records the effect log and maintains the display
/// state it implies. Clones share the same state, so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone)]
pub struct RecordingView {
    state: Arc<Mutex<RecordingState>>,
}

impl Default for RecordingView {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                input_enabled: true,
                ..RecordingState::default()
            })),
        }
    }

    pub fn ops(&self) -> Vec<ViewOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Currently displayed entries as `(id, role, markup)`.
    pub fn entries(&self) -> Vec<(MessageId, Role, String)> {
        self.state.lock().unwrap().entries.clone()
    }

    /// Markup currently shown for one message.
    pub fn displayed(&self, id: MessageId) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|(entry_id, _, _)| *entry_id == id)
            .map(|(_, _, markup)| markup.clone())
    }

    pub fn input_enabled(&self) -> bool {
        self.state.lock().unwrap().input_enabled
    }

    pub fn notices(&self) -> Vec<String> {
        self.state.lock().unwrap().notices.clone()
    }
}

impl TranscriptView for RecordingView {
    fn append_message(&mut self, id: MessageId, role: Role, markup: &str) {
        let mut state = self.state.lock().unwrap();
        state.entries.push((id, role, markup.to_string()));
        state.ops.push(ViewOp::Append {
            id,
            role,
            markup: markup.to_string(),
        });
    }

    fn update_message(&mut self, id: MessageId, markup: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.iter_mut().find(|(entry_id, _, _)| *entry_id == id) {
            entry.2 = markup.to_string();
        }
        state.ops.push(ViewOp::Update {
            id,
            markup: markup.to_string(),
        });
    }

    fn remove_from(&mut self, id: MessageId) {
        let mut state = self.state.lock().unwrap();
        if let Some(position) = state.entries.iter().position(|(entry_id, _, _)| *entry_id == id) {
            state.entries.truncate(position);
        }
        state.ops.push(ViewOp::RemoveFrom { id });
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        state.input_enabled = enabled;
        state.ops.push(ViewOp::InputEnabled(enabled));
    }

    fn notice(&mut self, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.notices.push(text.to_string());
        state.ops.push(ViewOp::Notice(text.to_string()));
    }
}

/// System clipboard access for the copy action.
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Clipboard over the platform copy utility (pbcopy / clip / xclip).
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandClipboard;

impl CommandClipboard {
    fn command() -> Command {
        if cfg!(target_os = "macos") {
            Command::new("pbcopy")
        } else if cfg!(target_os = "windows") {
            Command::new("clip")
        } else {
            let mut command = Command::new("xclip");
            command.args(["-selection", "clipboard"]);
            command
        }
    }
}

impl Clipboard for CommandClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        let mut child = Self::command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| ErrataError::Clipboard(format!("failed to spawn copy helper: {err}")))?;

        child
            .stdin
            .take()
            .ok_or_else(|| ErrataError::Clipboard("copy helper has no stdin".into()))?
            .write_all(text.as_bytes())
            .map_err(|err| ErrataError::Clipboard(format!("failed to write clipboard: {err}")))?;

        let status = child
            .wait()
            .map_err(|err| ErrataError::Clipboard(format!("copy helper failed: {err}")))?;
        if !status.success() {
            return Err(ErrataError::Clipboard(format!(
                "copy helper exited with {status}"
            )));
        }
        Ok(())
    }
}

/// In-memory clipboard double. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().unwrap().clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        *self.contents.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

/// Clipboard double that always fails, for exercising the error path.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenClipboard;

impl Clipboard for BrokenClipboard {
    fn write_text(&self, _text: &str) -> Result<()> {
        Err(ErrataError::Clipboard("clipboard unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_view_tracks_display_state() {
        let view = RecordingView::new();
        let mut driver = view.clone();

        let a = MessageId::new();
        let b = MessageId::new();
        driver.append_message(a, Role::User, "hi");
        driver.append_message(b, Role::Assistant, "...");
        driver.update_message(b, "hello");
        assert_eq!(view.displayed(b).as_deref(), Some("hello"));

        driver.remove_from(a);
        assert!(view.entries().is_empty());
        assert_eq!(view.ops().len(), 4);
    }

    #[test]
    fn memory_clipboard_round_trips() {
        let clipboard = MemoryClipboard::new();
        clipboard.write_text("copied").unwrap();
        assert_eq!(clipboard.contents().as_deref(), Some("copied"));
    }
}
