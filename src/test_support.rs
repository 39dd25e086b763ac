//! Scripted in-memory payment service for unit tests.

use crate::models::{CreateOrderRequest, CreatePaymentRequest, Order, PaymentAttempt, PaymentStatus};
use crate::services::payment_api::{ApiError, PaymentApi};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateOrder(CreateOrderRequest),
    GetOrder(String),
    CreatePayment(CreatePaymentRequest),
    GetPayment(String),
}

pub fn order(id: &str, amount: u64) -> Order {
    Order {
        id: id.to_string(),
        amount,
        currency: Some("INR".to_string()),
        notes: None,
        receipt: None,
        merchant_id: None,
        status: Some("created".to_string()),
        created_at: None,
        updated_at: None,
    }
}

pub fn record(value: Value) -> PaymentAttempt {
    PaymentAttempt::try_from(value).expect("test payment record")
}

pub fn attempt(id: &str, status: PaymentStatus) -> PaymentAttempt {
    record(json!({
        "id": id,
        "order_id": "order_test",
        "amount": 10000,
        "currency": "INR",
        "method": "upi",
        "status": status,
        "vpa": "user@bank"
    }))
}

#[derive(Default)]
pub struct ScriptedApi {
    orders: Mutex<HashMap<String, Order>>,
    order_creation: Mutex<VecDeque<Result<Order, ApiError>>>,
    payment_creation: Mutex<VecDeque<Result<PaymentAttempt, ApiError>>>,
    polls: Mutex<VecDeque<Result<PaymentAttempt, ApiError>>>,
    calls: Mutex<Vec<ApiCall>>,
    poll_latency: Duration,
    polls_in_flight: AtomicUsize,
    max_polls_in_flight: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_latency(mut self, latency: Duration) -> Self {
        self.poll_latency = latency;
        self
    }

    pub fn insert_order(&self, id: &str, amount: u64) {
        self.orders.lock().insert(id.to_string(), order(id, amount));
    }

    pub fn push_create_order(&self, result: Result<Order, ApiError>) {
        self.order_creation.lock().push_back(result);
    }

    pub fn push_create_payment(&self, result: Result<PaymentAttempt, ApiError>) {
        self.payment_creation.lock().push_back(result);
    }

    /// Queues a poll response. Once the queue is empty polls report `processing`.
    pub fn push_poll(&self, result: Result<PaymentAttempt, ApiError>) {
        self.polls.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ApiCall::GetPayment(_)))
            .count()
    }

    pub fn max_concurrent_polls(&self) -> usize {
        self.max_polls_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        code: Some("NOT_FOUND_ERROR".to_string()),
        description: format!("{} not found", what),
    }
}

#[async_trait]
impl PaymentApi for ScriptedApi {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, ApiError> {
        self.record(ApiCall::CreateOrder(request.clone()));

        let scripted = self.order_creation.lock().pop_front();
        let created = match scripted {
            Some(result) => result?,
            None => Order {
                currency: Some(request.currency.clone()),
                notes: Some(request.notes.clone()),
                receipt: request.receipt.clone(),
                ..order("order_test", request.amount)
            },
        };

        self.orders.lock().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, ApiError> {
        self.record(ApiCall::GetOrder(order_id.to_string()));
        self.orders.lock().get(order_id).cloned().ok_or_else(|| not_found("Order"))
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentAttempt, ApiError> {
        self.record(ApiCall::CreatePayment(request.clone()));

        let scripted = self.payment_creation.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(attempt("pay_1", PaymentStatus::Processing)))
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentAttempt, ApiError> {
        self.record(ApiCall::GetPayment(payment_id.to_string()));

        let in_flight = self.polls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_polls_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.poll_latency.is_zero() {
            tokio::time::sleep(self.poll_latency).await;
        }
        self.polls_in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.polls.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(attempt(payment_id, PaymentStatus::Processing)))
    }
}
