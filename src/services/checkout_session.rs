//! Checkout session controller.
//!
//! Runs inside the isolated checkout surface. Loads the order, takes one payment
//! attempt at a time and polls the payment service until the attempt settles.
//! Outcomes leave only through the [`ParentPort`]; the controller never touches
//! host presentation.

use crate::channel::ParentPort;
use crate::models::{
    CreatePaymentRequest, MethodDetails, Order, OutcomeMessage, PaymentMethod, PaymentStatus,
};
use crate::services::payment_api::{ApiError, SharedPaymentApi};
use crate::utils::money::format_amount;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const INVALID_ORDER: &str = "Invalid order";
const PAYMENT_FAILED: &str = "Payment failed";
const PAYMENT_TIMED_OUT: &str = "Payment timed out";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound on the whole settlement wait. `None` polls until the
    /// service resolves the attempt or the surface is torn down.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Processing,
    Succeeded,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Succeeded | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub attempt_id: Option<String>,
    pub error: Option<String>,
}

impl SessionState {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            attempt_id: None,
            error: None,
        }
    }

    fn fail(&mut self, message: &str) {
        self.status = SessionStatus::Failed;
        self.error = Some(message.to_string());
    }
}

/// What the surface should render right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutView {
    Loading,
    Ready {
        amount_label: String,
        selected: Option<PaymentMethod>,
    },
    Processing,
    Succeeded,
    Failed {
        message: String,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("invalid order: {0}")]
    InvalidOrder(ApiError),
    #[error("order has not been loaded")]
    OrderNotLoaded,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("operation not allowed while session is {0:?}")]
    InvalidState(SessionStatus),
}

pub struct CheckoutController {
    api: SharedPaymentApi,
    port: Arc<ParentPort>,
    policy: PollPolicy,
    order: Option<Order>,
    selected: Option<PaymentMethod>,
    state: Arc<watch::Sender<SessionState>>,
    poller: Option<JoinHandle<()>>,
}

impl CheckoutController {
    /// Boots the controller and announces `CHECKOUT_READY` to the host.
    pub fn mount(api: SharedPaymentApi, port: ParentPort, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(SessionState::idle());
        let port = Arc::new(port);

        port.emit(OutcomeMessage::ready());
        debug!("Checkout surface mounted");

        Self {
            api,
            port,
            policy,
            order: None,
            selected: None,
            state: Arc::new(state),
            poller: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn view(&self) -> CheckoutView {
        let state = self.state.borrow();

        match (state.status, &self.order) {
            (SessionStatus::Failed, _) => CheckoutView::Failed {
                message: state.error.clone().unwrap_or_else(|| PAYMENT_FAILED.to_string()),
            },
            (_, None) => CheckoutView::Loading,
            (SessionStatus::Idle, Some(order)) => CheckoutView::Ready {
                amount_label: format!("Pay {}", format_amount(order.amount, order.currency())),
                selected: self.selected,
            },
            (SessionStatus::Processing, Some(_)) => CheckoutView::Processing,
            (SessionStatus::Succeeded, Some(_)) => CheckoutView::Succeeded,
        }
    }

    /// Fetches the order this surface was opened for. Failure is terminal for
    /// the surface and is not reported to the host.
    pub async fn load_order(&mut self, order_id: &str) -> Result<&Order, CheckoutError> {
        let status = self.state.borrow().status;
        if self.order.is_some() || status != SessionStatus::Idle {
            return Err(CheckoutError::InvalidState(status));
        }

        match self.api.get_order(order_id).await {
            Ok(order) => {
                info!("Loaded order {} ({} {})", order.id, order.amount, order.currency());
                Ok(self.order.insert(order))
            }
            Err(e) => {
                warn!("Failed to load order {}: {}", order_id, e);
                self.state.send_modify(|s| s.fail(INVALID_ORDER));
                Err(CheckoutError::InvalidOrder(e))
            }
        }
    }

    pub fn select_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.ensure_idle_with_order()?;
        self.selected = Some(method);
        Ok(())
    }

    /// Creates a payment attempt and starts polling it. Backend failures are
    /// absorbed into the session state; only local precondition violations
    /// come back as errors.
    pub async fn submit_attempt(&mut self, details: MethodDetails) -> Result<SessionStatus, CheckoutError> {
        let order_id = self.ensure_idle_with_order()?.id.clone();
        if let Some(field) = details.missing_field() {
            return Err(CheckoutError::MissingField(field));
        }

        self.selected = Some(details.method());
        self.state.send_modify(|s| {
            s.status = SessionStatus::Processing;
            s.attempt_id = None;
            s.error = None;
        });

        let request = CreatePaymentRequest { order_id, details };
        match self.api.create_payment(&request).await {
            Ok(attempt) => {
                info!("Created payment {} for order {}", attempt.id(), request.order_id);
                self.state.send_modify(|s| s.attempt_id = Some(attempt.id().to_string()));
                self.start_polling(attempt.id().to_string());
                Ok(SessionStatus::Processing)
            }
            Err(e) => {
                warn!("Payment creation failed for order {}: {}", request.order_id, e);
                self.state.send_modify(|s| s.fail(PAYMENT_FAILED));
                self.port.emit(OutcomeMessage::failure(None));
                Ok(SessionStatus::Failed)
            }
        }
    }

    /// Returns to method selection after a failed attempt. The host has
    /// already been told about the failure, so a later outcome stays local.
    pub fn retry(&mut self) -> Result<(), CheckoutError> {
        let status = self.state.borrow().status;
        if status != SessionStatus::Failed || self.order.is_none() {
            return Err(CheckoutError::InvalidState(status));
        }

        self.stop_polling();
        self.selected = None;
        self.state.send_modify(|s| *s = SessionState::idle());
        info!("Checkout reset for a new attempt");
        Ok(())
    }

    /// Resolves once the session reaches a terminal state.
    pub async fn settled(&self) -> SessionState {
        let mut receiver = self.state.subscribe();
        let settled = match receiver.wait_for(|s| s.status.is_terminal()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }

    /// Stops any recurring work. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.poller.is_some() {
            debug!("Tearing down checkout surface");
        }
        self.stop_polling();
    }

    fn ensure_idle_with_order(&self) -> Result<&Order, CheckoutError> {
        let status = self.state.borrow().status;
        if status != SessionStatus::Idle {
            return Err(CheckoutError::InvalidState(status));
        }
        self.order.as_ref().ok_or(CheckoutError::OrderNotLoaded)
    }

    fn start_polling(&mut self, attempt_id: String) {
        self.stop_polling();
        self.poller = Some(tokio::spawn(poll_attempt(
            self.api.clone(),
            self.port.clone(),
            self.state.clone(),
            attempt_id,
            self.policy,
        )));
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl Drop for CheckoutController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Polls one attempt until it settles. Each request completes before the next
/// interval starts, so polls never overlap.
async fn poll_attempt(
    api: SharedPaymentApi,
    port: Arc<ParentPort>,
    state: Arc<watch::Sender<SessionState>>,
    attempt_id: String,
    policy: PollPolicy,
) {
    let started = Instant::now();

    loop {
        sleep(policy.interval).await;

        if let Some(max_wait) = policy.max_wait {
            if started.elapsed() >= max_wait {
                warn!("Payment {} not settled after {:?}", attempt_id, max_wait);
                state.send_modify(|s| s.fail(PAYMENT_TIMED_OUT));
                port.emit(OutcomeMessage::failure(None));
                return;
            }
        }

        match api.get_payment(&attempt_id).await {
            Ok(attempt) => match attempt.status() {
                PaymentStatus::Succeeded => {
                    info!("Payment {} succeeded", attempt_id);
                    state.send_modify(|s| s.status = SessionStatus::Succeeded);
                    port.emit(OutcomeMessage::success(attempt));
                    return;
                }
                PaymentStatus::Failed => {
                    info!("Payment {} failed: {:?}", attempt_id, attempt.error_code());
                    let message = attempt
                        .error_description()
                        .unwrap_or(PAYMENT_FAILED)
                        .to_string();
                    state.send_modify(|s| s.fail(&message));
                    port.emit(OutcomeMessage::failure(Some(attempt)));
                    return;
                }
                status => debug!("Payment {} still {:?}", attempt_id, status),
            },
            Err(e) => {
                warn!("Polling payment {} failed: {}", attempt_id, e);
                state.send_modify(|s| s.fail(PAYMENT_FAILED));
                port.emit(OutcomeMessage::failure(None));
                return;
            }
        }
    }
}
