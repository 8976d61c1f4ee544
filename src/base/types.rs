use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// The message type the dispatcher answers (`m.text`).
pub const TEXT_MSGTYPE: &str = "m.text";

/// A single inbound room message, detached from the chat library's own event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// The room the message was sent in.
    pub room_id: String,
    /// The ID of the message event, used to attach replies.
    pub event_id: String,
    /// Fully qualified sender ID (`@name:domain`).
    pub sender: String,
    /// Message type tag (`m.text`, `m.notice`, ...).
    pub msgtype: String,
    /// Plain text body.
    pub body: String,
}

impl ChatEvent {
    /// Whether this is a plain text message.
    pub fn is_text(&self) -> bool {
        self.msgtype == TEXT_MSGTYPE
    }
}
