//! STOMP 1.2 client
//!
//! Just enough of the protocol to consume a durable queue with
//! client-individual acknowledgement: CONNECT, SUBSCRIBE, MESSAGE, ACK/NACK,
//! ERROR and DISCONNECT. Heart-beating is not negotiated (`heart-beat:0,0`).

mod client;
mod error;
mod frame;
mod message;

pub use client::{Acker, Session, StompClient};
pub(crate) use client::sleep_or_cancel;
pub use error::StompError;
pub use frame::{Command, Frame, FrameError, MAX_FRAME_SIZE};
pub use message::{AckTarget, Message};
