use crate::app::config::Config;
use crate::models::{CreateOrderRequest, CreatePaymentRequest, Order, PaymentAttempt};
use crate::services::payment_api::{ApiError, PaymentApi};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// HTTP client for the public order and payment endpoints.
pub struct PaymentServiceClient {
    client: Client,
    base_url: Url,
}

impl PaymentServiceClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url {}: {}", config.api_base_url, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("base url cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let (code, description) = describe_error(&body);
        warn!("Payment service returned {}: {}", status, description);

        Err(ApiError::Status {
            status: status.as_u16(),
            code,
            description,
        })
    }
}

/// Pulls `code`/`description` out of `{"detail": {"error": {...}}}`, the error
/// envelope used by the service. Falls back to a plain `detail` string or the raw body.
fn describe_error(body: &str) -> (Option<String>, String) {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return (None, body.trim().to_string()),
    };

    let detail = value.get("detail").unwrap_or(&value);
    if let Some(error) = detail.get("error") {
        let code = error.get("code").and_then(Value::as_str).map(str::to_string);
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return (code, description);
    }

    match detail.as_str() {
        Some(text) => (None, text.to_string()),
        None => (None, detail.to_string()),
    }
}

#[async_trait]
impl PaymentApi for PaymentServiceClient {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, ApiError> {
        let url = self.endpoint(&["orders", "public"])?;
        debug!("POST {} amount={} currency={}", url, request.amount, request.currency);

        let response = self.client.post(url).json(request).send().await?;
        Self::read(response).await
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, ApiError> {
        let url = self.endpoint(&["orders", "public", order_id])?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentAttempt, ApiError> {
        let url = self.endpoint(&["payments", "public"])?;
        debug!("POST {} order={} method={}", url, request.order_id, request.details.method());

        let response = self.client.post(url).json(request).send().await?;
        Self::read(response).await
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentAttempt, ApiError> {
        let url = self.endpoint(&["payments", "public", payment_id])?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }
}
