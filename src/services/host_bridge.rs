//! Merchant-facing entry point.
//!
//! `HostBridge::open` creates the order, mounts the checkout surface and relays
//! its single outcome to the merchant callbacks. The bridge owns the only
//! handle to the live overlay, so there is never more than one on the page.

use crate::app::config::Config;
use crate::channel::{create_channel, Subscription};
use crate::models::order::Notes;
use crate::models::{CreateOrderRequest, MessageKind, Order, PaymentAttempt};
use crate::services::atomic_metrics::{BridgeMetrics, MetricsSnapshot};
use crate::services::payment_api::{ApiError, SharedPaymentApi};
use crate::services::surface::{OverlayId, SurfaceError, SurfacePresenter, SurfaceRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

pub type SuccessCallback = Box<dyn FnOnce(PaymentAttempt) + Send>;
pub type FailureCallback = Box<dyn FnOnce(Option<PaymentAttempt>) + Send>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("amount is required")]
    MissingAmount,
    #[error("order creation failed: {0}")]
    OrderCreation(#[source] ApiError),
    #[error("invalid checkout url {url}: {reason}")]
    InvalidCheckoutUrl { url: String, reason: String },
    #[error("failed to present checkout: {0}")]
    Surface(#[from] SurfaceError),
}

/// Options accepted by [`HostBridge::open`].
#[derive(Default)]
pub struct CheckoutOptions {
    /// Minor units. Required and must be positive.
    pub amount: Option<u64>,
    pub currency: Option<String>,
    pub notes: Option<Notes>,
    pub receipt: Option<String>,
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
}

impl CheckoutOptions {
    pub fn new(amount: u64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn note(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.notes.get_or_insert_with(Notes::new).insert(key.into(), value.into());
        self
    }

    pub fn receipt(mut self, receipt: impl Into<String>) -> Self {
        self.receipt = Some(receipt.into());
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(PaymentAttempt) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl FnOnce(Option<PaymentAttempt>) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded(PaymentAttempt),
    Failed(Option<PaymentAttempt>),
}

/// Returned by a successful `open`.
pub struct SessionHandle {
    pub session_id: Uuid,
    pub order: Order,
    pub surface_url: Url,
    outcome: oneshot::Receiver<SessionOutcome>,
}

impl SessionHandle {
    /// Resolves with the delivered outcome, or `None` if the session ended
    /// without one (cancelled, replaced, or the surface went away).
    pub async fn outcome(self) -> Option<SessionOutcome> {
        self.outcome.await.ok()
    }
}

struct ActiveSession {
    session_id: Uuid,
    overlay: Option<OverlayId>,
    listener: JoinHandle<()>,
}

type ActiveSlot = Arc<Mutex<Option<ActiveSession>>>;

pub struct HostBridge {
    api: SharedPaymentApi,
    presenter: Arc<dyn SurfacePresenter>,
    checkout_url: Url,
    default_currency: String,
    active: ActiveSlot,
    metrics: Arc<BridgeMetrics>,
}

impl HostBridge {
    pub fn new(
        api: SharedPaymentApi,
        presenter: Arc<dyn SurfacePresenter>,
        config: &Config,
    ) -> Result<Self, BridgeError> {
        let checkout_url = Url::parse(&config.checkout_url).map_err(|e| BridgeError::InvalidCheckoutUrl {
            url: config.checkout_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            api,
            presenter,
            checkout_url,
            default_currency: config.default_currency.clone(),
            active: Arc::new(Mutex::new(None)),
            metrics: Arc::new(BridgeMetrics::new()),
        })
    }

    /// Starts a checkout session. Any session already on the page is replaced.
    pub async fn open(&self, options: CheckoutOptions) -> Result<SessionHandle, BridgeError> {
        let CheckoutOptions {
            amount,
            currency,
            notes,
            receipt,
            on_success,
            on_failure,
        } = options;

        let amount = match amount {
            Some(amount) if amount > 0 => amount,
            _ => return Err(BridgeError::MissingAmount),
        };

        let request = CreateOrderRequest {
            amount,
            currency: currency.unwrap_or_else(|| self.default_currency.clone()),
            notes: notes.unwrap_or_default(),
            receipt,
        };
        let order = self.api.create_order(&request).await.map_err(|e| {
            error!("Order creation failed: {}", e);
            BridgeError::OrderCreation(e)
        })?;
        info!("Created order {} for {} {}", order.id, order.amount, order.currency());

        let session_id = Uuid::new_v4();
        let surface_url = self.surface_url(&order.id);
        let (port, subscription) = create_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        {
            let mut active = self.active.lock();
            if let Some(previous) = active.take() {
                info!("Replacing checkout session {}", previous.session_id);
                self.retire(previous);
            }

            let overlay = self.presenter.mount(SurfaceRequest {
                session_id,
                url: surface_url.clone(),
                port,
            })?;

            let listener = tokio::spawn(listen(
                subscription,
                Callbacks { on_success, on_failure },
                Teardown {
                    session_id,
                    active: self.active.clone(),
                    presenter: self.presenter.clone(),
                    metrics: self.metrics.clone(),
                },
                outcome_tx,
            ));

            *active = Some(ActiveSession {
                session_id,
                overlay: Some(overlay),
                listener,
            });
        }

        self.metrics.increment_opened();
        Ok(SessionHandle {
            session_id,
            order,
            surface_url,
            outcome: outcome_rx,
        })
    }

    /// User closed the overlay. The listener stays registered and the payment
    /// service is not told. Whether a later outcome still reaches the callbacks
    /// depends on the presenter: [`InProcessSurface`] stops the controller on
    /// unmount, so the session ends without an outcome and
    /// [`SessionHandle::outcome`] resolves `None`.
    ///
    /// [`InProcessSurface`]: crate::services::InProcessSurface
    pub fn dismiss(&self) -> bool {
        let mut active = self.active.lock();
        let overlay = match active.as_mut().and_then(|session| session.overlay.take()) {
            Some(overlay) => overlay,
            None => return false,
        };

        self.presenter.unmount(overlay);
        self.metrics.increment_dismissed();
        info!("Checkout overlay dismissed by user");
        true
    }

    /// Ends the current session: removes the overlay and releases the listener.
    pub fn cancel(&self) -> bool {
        match self.active.lock().take() {
            Some(session) => {
                self.retire(session);
                true
            }
            None => false,
        }
    }

    pub fn active_session(&self) -> Option<Uuid> {
        self.active.lock().as_ref().map(|session| session.session_id)
    }

    pub fn overlay_visible(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map_or(false, |session| session.overlay.is_some())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn surface_url(&self, order_id: &str) -> Url {
        let mut url = self.checkout_url.clone();
        url.query_pairs_mut().append_pair("order_id", order_id);
        url
    }

    fn retire(&self, session: ActiveSession) {
        if let Some(overlay) = session.overlay {
            self.presenter.unmount(overlay);
        }
        session.listener.abort();
        self.metrics.increment_cancelled();
        debug!("Checkout session {} cancelled", session.session_id);
    }
}

struct Callbacks {
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

/// What the listener needs to take its own overlay down.
struct Teardown {
    session_id: Uuid,
    active: ActiveSlot,
    presenter: Arc<dyn SurfacePresenter>,
    metrics: Arc<BridgeMetrics>,
}

impl Teardown {
    /// Clears the active slot if it still holds this session.
    fn remove_overlay(&self) {
        let mut active = self.active.lock();
        let mine = active
            .as_ref()
            .map_or(false, |session| session.session_id == self.session_id);
        if !mine {
            return;
        }

        if let Some(overlay) = active.take().and_then(|session| session.overlay) {
            self.presenter.unmount(overlay);
        }
    }
}

async fn listen(
    mut subscription: Subscription,
    callbacks: Callbacks,
    teardown: Teardown,
    outcome_tx: oneshot::Sender<SessionOutcome>,
) {
    while let Some(message) = subscription.next().await {
        let outcome = match (message.kind, message.payload) {
            (MessageKind::Ready, _) => {
                debug!("Checkout surface ready for session {}", teardown.session_id);
                continue;
            }
            (MessageKind::Success, Some(attempt)) => SessionOutcome::Succeeded(attempt),
            (MessageKind::Success, None) => continue,
            (MessageKind::Failure, payload) => SessionOutcome::Failed(payload),
        };

        teardown.remove_overlay();

        match &outcome {
            SessionOutcome::Succeeded(attempt) => {
                info!("Payment {} succeeded for session {}", attempt.id(), teardown.session_id);
                teardown.metrics.increment_succeeded();
                if let Some(callback) = callbacks.on_success {
                    callback(attempt.clone());
                }
            }
            SessionOutcome::Failed(attempt) => {
                warn!(
                    "Payment failed for session {} ({})",
                    teardown.session_id,
                    attempt.as_ref().map_or("no attempt", |a| a.id())
                );
                teardown.metrics.increment_failed();
                if let Some(callback) = callbacks.on_failure {
                    callback(attempt.clone());
                }
            }
        }

        subscription.release();
        let _ = outcome_tx.send(outcome);
        return;
    }

    warn!("Checkout surface for session {} closed without an outcome", teardown.session_id);
    teardown.remove_overlay();
}
