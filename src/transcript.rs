use crate::error::{ErrataError, Result};
use crate::message::{Message, MessageId, Role, WireMessage};

/// Ordered chat history. The first entry is always the seeded system
/// message; everything after it sits in submission order, which is also
/// the order sent to the backend.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Rebuild a transcript from stored messages, e.g. when replaying a
    /// persisted conversation. The first entry must be the system message.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self> {
        match messages.first() {
            Some(first) if first.role == Role::System => Ok(Self { messages }),
            _ => Err(ErrataError::Storage(
                "stored transcript does not start with a system message".into(),
            )),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Id of the message immediately after `id`, if any.
    pub fn next_after(&self, id: MessageId) -> Option<MessageId> {
        let position = self.position(id)?;
        self.messages.get(position + 1).map(|m| m.id)
    }

    /// Cascade delete: drop the identified message and everything after
    /// it. Returns false when the id is unknown (and changes nothing).
    pub fn truncate_from(&mut self, id: MessageId) -> bool {
        match self.position(id) {
            Some(position) => {
                self.messages.truncate(position);
                true
            }
            None => false,
        }
    }

    /// Replace a message's content in place. Only meaningful for user
    /// messages; the caller checks the role.
    pub fn set_content(&mut self, id: MessageId, content: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content = content.into();
                true
            }
            None => false,
        }
    }

    /// The whole history reduced to wire form.
    pub fn wire_history(&self) -> Vec<WireMessage> {
        self.messages.iter().map(Message::to_wire).collect()
    }

    /// Everything strictly before `id`, in wire form.
    pub fn wire_before(&self, id: MessageId) -> Option<Vec<WireMessage>> {
        let position = self.position(id)?;
        Some(self.messages[..position].iter().map(Message::to_wire).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transcript {
        let mut transcript = Transcript::new("ctx");
        transcript.push(Message::user("2+2?"));
        transcript.push(Message::assistant("4."));
        transcript.push(Message::user("3+3?"));
        transcript.push(Message::assistant("6."));
        transcript
    }

    #[test]
    fn seeds_a_system_message_first() {
        let transcript = Transcript::new("ctx");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].role, Role::System);
        assert_eq!(transcript.messages()[0].content, "ctx");
    }

    #[test]
    fn truncate_from_drops_the_message_and_everything_after() {
        // Cascade delete at every index leaves exactly the prefix.
        for k in 0..sample().len() {
            let mut transcript = sample();
            let expected: Vec<MessageId> =
                transcript.messages()[..k].iter().map(|m| m.id).collect();
            let target = transcript.messages()[k].id;

            assert!(transcript.truncate_from(target));
            let remaining: Vec<MessageId> =
                transcript.messages().iter().map(|m| m.id).collect();
            assert_eq!(remaining, expected);
        }
    }

    #[test]
    fn truncate_from_unknown_id_is_a_noop() {
        let mut transcript = sample();
        let before = transcript.len();
        assert!(!transcript.truncate_from(MessageId::new()));
        assert_eq!(transcript.len(), before);
    }

    #[test]
    fn wire_before_excludes_the_target() {
        let transcript = sample();
        let last = transcript.messages().last().unwrap().id;
        let history = transcript.wire_before(last).unwrap();

        assert_eq!(history.len(), transcript.len() - 1);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history.last().unwrap().content, "3+3?");
    }

    #[test]
    fn next_after_walks_forward() {
        let transcript = sample();
        let first_user = transcript.messages()[1].id;
        assert_eq!(
            transcript.next_after(first_user),
            Some(transcript.messages()[2].id)
        );
        assert_eq!(
            transcript.next_after(transcript.messages().last().unwrap().id),
            None
        );
    }

    #[test]
    fn ids_stay_unique_across_mutations() {
        let mut transcript = sample();
        let victim = transcript.messages()[2].id;
        transcript.truncate_from(victim);
        transcript.push(Message::assistant("regenerated"));
        transcript.push(Message::user("again?"));

        let mut ids: Vec<MessageId> = transcript.messages().iter().map(|m| m.id).collect();
        let count = ids.len();
        ids.sort_by_key(|id| id.to_string());
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[test]
    fn from_messages_requires_a_leading_system_message() {
        let err = Transcript::from_messages(vec![Message::user("hi")]).unwrap_err();
        assert!(matches!(err, ErrataError::Storage(_)));

        let ok = Transcript::from_messages(vec![Message::system("ctx"), Message::user("hi")]);
        assert!(ok.is_ok());
    }
}
