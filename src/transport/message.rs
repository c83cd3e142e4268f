//! JSON frames exchanged over a broker connection.
//!
//! Every connection carries exactly one call. The first client frame picks
//! it (`register`, `publish`, `subscribe` or `request_tags`); a publish call
//! then streams `message` frames and ends with `done`.

use serde::{Deserialize, Serialize};

use crate::broker::message::{Message, WireMessage};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Register { tag: String },
    Publish,
    Message(WireMessage),
    Done,
    Subscribe { tag: String },
    RequestTags,
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Register { .. } => "register",
            ClientFrame::Publish => "publish",
            ClientFrame::Message(_) => "message",
            ClientFrame::Done => "done",
            ClientFrame::Subscribe { .. } => "subscribe",
            ClientFrame::RequestTags => "request_tags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Ack {
        /// Number of messages a publish call accepted. Absent for register.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accepted: Option<u64>,
    },
    Message(Message),
    Tags { list: String },
    Error { message: String },
}
