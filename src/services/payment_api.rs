use crate::models::{CreateOrderRequest, CreatePaymentRequest, Order, PaymentAttempt};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("payment service returned HTTP {status}: {description}")]
    Status {
        status: u16,
        code: Option<String>,
        description: String,
    },
    #[error("invalid response from payment service: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// The payment service endpoints the checkout flow consumes.
#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, ApiError>;
    async fn get_order(&self, order_id: &str) -> Result<Order, ApiError>;
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentAttempt, ApiError>;
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentAttempt, ApiError>;
}

pub type SharedPaymentApi = Arc<dyn PaymentApi>;
