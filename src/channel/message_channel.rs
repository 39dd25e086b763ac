//! Cross-surface message channel.
//!
//! The host side owns a [`Subscription`]; the checkout surface gets a
//! [`ParentPort`]. The inbox carries raw JSON, so other frames on the host page
//! can post into it too. Only envelopes stamped with the session token are
//! delivered.

use crate::models::{MessageKind, OutcomeMessage};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

const TOKEN_FIELD: &str = "session_token";
const TOKEN_LEN: usize = 32;

/// Per-session secret issued when the surface is created.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the secret itself.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(..)")
    }
}

/// Creates the host inbox for one session.
pub fn create_channel() -> (ParentPort, Subscription) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let token = SessionToken::generate();

    let port = ParentPort {
        sender,
        token: token.clone(),
        ready_sent: AtomicBool::new(false),
        terminal_sent: AtomicBool::new(false),
    };
    let subscription = Subscription {
        receiver: Some(receiver),
        token,
    };

    (port, subscription)
}

/// Unauthenticated handle on the host inbox, standing in for a foreign frame.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct OpenPort {
    sender: UnboundedSender<Value>,
}

#[cfg(test)]
impl OpenPort {
    /// Posts an arbitrary value. Returns false once the host has stopped listening.
    pub(crate) fn post(&self, value: Value) -> bool {
        self.sender.send(value).is_ok()
    }
}

/// The surface's end of the channel.
///
/// Enforces the emission rules locally: `CHECKOUT_READY` at most once and at most
/// one terminal message for the whole session.
pub struct ParentPort {
    sender: UnboundedSender<Value>,
    token: SessionToken,
    ready_sent: AtomicBool,
    terminal_sent: AtomicBool,
}

impl ParentPort {
    /// Returns true if the message was accepted by the latch and handed to the host inbox.
    pub fn emit(&self, message: OutcomeMessage) -> bool {
        let latch = match message.kind {
            MessageKind::Ready => &self.ready_sent,
            MessageKind::Success | MessageKind::Failure => &self.terminal_sent,
        };

        if latch.swap(true, Ordering::SeqCst) {
            warn!("Dropping duplicate {:?} message", message.kind);
            return false;
        }

        let envelope = match seal(&message, &self.token) {
            Some(envelope) => envelope,
            None => {
                warn!("Failed to encode {:?} message", message.kind);
                return false;
            }
        };

        // The host may already be gone; posting to a closed page is a no-op.
        if self.sender.send(envelope).is_err() {
            debug!("Host inbox closed, {:?} message discarded", message.kind);
        }
        true
    }

    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn open_port(&self) -> OpenPort {
        OpenPort {
            sender: self.sender.clone(),
        }
    }
}

fn seal(message: &OutcomeMessage, token: &SessionToken) -> Option<Value> {
    let mut envelope = serde_json::to_value(message).ok()?;
    envelope
        .as_object_mut()?
        .insert(TOKEN_FIELD.to_string(), Value::String(token.as_str().to_string()));
    Some(envelope)
}

/// Host-side listener, scoped to one session.
///
/// Releasing closes the inbox; it is idempotent and permanent.
pub struct Subscription {
    receiver: Option<UnboundedReceiver<Value>>,
    token: SessionToken,
}

impl Subscription {
    /// Waits for the next authentic, well-formed message. Returns `None` once
    /// released or once every sender is gone.
    pub async fn next(&mut self) -> Option<OutcomeMessage> {
        loop {
            let raw = self.receiver.as_mut()?.recv().await?;
            if let Some(message) = self.open(raw) {
                return Some(message);
            }
        }
    }

    fn open(&self, raw: Value) -> Option<OutcomeMessage> {
        let object = raw.as_object()?;

        match object.get(TOKEN_FIELD).and_then(Value::as_str) {
            Some(token) if token == self.token.as_str() => {}
            _ => {
                debug!("Ignoring message without a valid session token");
                return None;
            }
        }

        match serde_json::from_value::<OutcomeMessage>(raw) {
            Ok(message) if message.is_well_formed() => Some(message),
            Ok(message) => {
                debug!("Ignoring malformed {:?} message", message.kind);
                None
            }
            Err(e) => {
                debug!("Ignoring unrecognized message: {}", e);
                None
            }
        }
    }

    pub fn release(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            debug!("Message subscription released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.receiver.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
