use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Card,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Upi => write!(f, "upi"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

/// Attempt status as reported by the payment service. The service has used both
/// `success` and `succeeded` spellings, in either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "created", alias = "CREATED")]
    Created,
    #[serde(rename = "processing", alias = "PROCESSING")]
    Processing,
    #[serde(rename = "succeeded", alias = "success", alias = "SUCCESS", alias = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "failed", alias = "FAILED")]
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub cvv: String,
}

/// Method-specific fields submitted with a new attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum MethodDetails {
    Upi { vpa: String },
    Card { card: CardDetails },
}

impl MethodDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            MethodDetails::Upi { .. } => PaymentMethod::Upi,
            MethodDetails::Card { .. } => PaymentMethod::Card,
        }
    }

    /// Name of the first required field left blank, if any. Presence only;
    /// format rules belong to the payment service.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            MethodDetails::Upi { vpa } if vpa.trim().is_empty() => Some("vpa"),
            MethodDetails::Card { card } if card.number.trim().is_empty() => Some("card.number"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    #[serde(flatten)]
    pub details: MethodDetails,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AttemptRecordError {
    #[error("payment record has no string `{0}`")]
    MissingField(&'static str),
    #[error("unrecognised payment status {0}")]
    UnknownStatus(Value),
}

/// A payment attempt exactly as the service reported it. Only `id` and
/// `status` are required; every other field is kept as sent and serialized
/// back unchanged, original status spelling included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct PaymentAttempt {
    id: String,
    status: PaymentStatus,
    record: Map<String, Value>,
}

impl PaymentAttempt {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.get(field)
    }

    pub fn order_id(&self) -> Option<&str> {
        self.text("order_id")
    }

    pub fn error_code(&self) -> Option<&str> {
        self.text("error_code")
    }

    pub fn error_description(&self) -> Option<&str> {
        self.text("error_description")
    }

    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.record.get(field).and_then(Value::as_str)
    }
}

impl TryFrom<Map<String, Value>> for PaymentAttempt {
    type Error = AttemptRecordError;

    fn try_from(record: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            _ => return Err(AttemptRecordError::MissingField("id")),
        };
        let raw_status = record
            .get("status")
            .ok_or(AttemptRecordError::MissingField("status"))?;
        let status = serde_json::from_value(raw_status.clone())
            .map_err(|_| AttemptRecordError::UnknownStatus(raw_status.clone()))?;

        Ok(Self { id, status, record })
    }
}

impl TryFrom<Value> for PaymentAttempt {
    type Error = AttemptRecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(record) => Self::try_from(record),
            _ => Err(AttemptRecordError::MissingField("id")),
        }
    }
}

impl From<PaymentAttempt> for Map<String, Value> {
    fn from(attempt: PaymentAttempt) -> Self {
        attempt.record
    }
}
