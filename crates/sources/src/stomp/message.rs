//! Received messages

use bytes::Bytes;

use super::frame::{Command, Frame};

/// How a message is referenced in ACK/NACK frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckTarget {
    /// STOMP 1.2: the message's `ack` header
    Id(String),
    /// STOMP 1.1: `message-id` plus `subscription`
    Legacy {
        message_id: String,
        subscription: String,
    },
}

impl AckTarget {
    pub(crate) fn frame(&self, command: Command) -> Frame {
        match self {
            Self::Id(id) => Frame::new(command).with_header("id", id.as_str()),
            Self::Legacy {
                message_id,
                subscription,
            } => Frame::new(command)
                .with_header("message-id", message_id.as_str())
                .with_header("subscription", subscription.as_str()),
        }
    }
}

/// A MESSAGE frame delivered on a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    frame: Frame,
}

impl Message {
    /// Wrap a MESSAGE frame
    pub fn from_frame(frame: Frame) -> Self {
        debug_assert_eq!(frame.command, Command::Message);
        Self { frame }
    }

    /// First value of a header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.frame.header(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.frame.body
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header("message-id")
    }

    /// Reference for ACK/NACK, if the broker supplied one
    pub fn ack_target(&self) -> Option<AckTarget> {
        if let Some(id) = self.header("ack") {
            return Some(AckTarget::Id(id.to_string()));
        }
        match (self.message_id(), self.header("subscription")) {
            (Some(message_id), Some(subscription)) => Some(AckTarget::Legacy {
                message_id: message_id.to_string(),
                subscription: subscription.to_string(),
            }),
            _ => None,
        }
    }
}
