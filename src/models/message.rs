use super::payment::PaymentAttempt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "CHECKOUT_READY")]
    Ready,
    #[serde(rename = "PAYMENT_SUCCESS")]
    Success,
    #[serde(rename = "PAYMENT_FAILED")]
    Failure,
}

impl MessageKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MessageKind::Ready)
    }
}

/// Event sent from the checkout surface to the host page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PaymentAttempt>,
}

impl OutcomeMessage {
    pub fn ready() -> Self {
        Self { kind: MessageKind::Ready, payload: None }
    }

    pub fn success(attempt: PaymentAttempt) -> Self {
        Self { kind: MessageKind::Success, payload: Some(attempt) }
    }

    pub fn failure(attempt: Option<PaymentAttempt>) -> Self {
        Self { kind: MessageKind::Failure, payload: attempt }
    }

    /// A success without the attempt record is not a valid outcome.
    pub fn is_well_formed(&self) -> bool {
        self.kind != MessageKind::Success || self.payload.is_some()
    }
}
