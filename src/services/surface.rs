use crate::channel::ParentPort;
use crate::models::MethodDetails;
use crate::services::checkout_session::{CheckoutController, PollPolicy};
use crate::services::payment_api::SharedPaymentApi;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface address has no order_id: {0}")]
    MissingOrder(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayId(pub u64);

/// Everything a presenter needs to show one checkout surface.
pub struct SurfaceRequest {
    pub session_id: Uuid,
    pub url: Url,
    pub port: ParentPort,
}

impl SurfaceRequest {
    /// The order id carried in the surface address.
    pub fn order_id(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "order_id")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }
}

/// Creates and removes the overlay that hosts an isolated checkout surface.
pub trait SurfacePresenter: Send + Sync {
    fn mount(&self, request: SurfaceRequest) -> Result<OverlayId, SurfaceError>;

    /// Removes the overlay. Unknown or already removed overlays are ignored.
    fn unmount(&self, overlay: OverlayId);
}

/// Runs each checkout surface as a local task with its own controller.
///
/// When `input` is set the surface selects that method and submits it as soon
/// as the order has loaded; otherwise it waits idle until unmounted.
pub struct InProcessSurface {
    api: SharedPaymentApi,
    policy: PollPolicy,
    input: Option<MethodDetails>,
    next_id: AtomicU64,
    surfaces: Mutex<HashMap<OverlayId, JoinHandle<()>>>,
}

impl InProcessSurface {
    pub fn new(api: SharedPaymentApi, policy: PollPolicy, input: Option<MethodDetails>) -> Self {
        Self {
            api,
            policy,
            input,
            next_id: AtomicU64::new(1),
            surfaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn mounted(&self) -> usize {
        self.surfaces.lock().len()
    }
}

impl SurfacePresenter for InProcessSurface {
    fn mount(&self, request: SurfaceRequest) -> Result<OverlayId, SurfaceError> {
        let order_id = request
            .order_id()
            .ok_or_else(|| SurfaceError::MissingOrder(request.url.to_string()))?;

        let overlay = OverlayId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = tokio::spawn(run_surface(
            self.api.clone(),
            request.port,
            self.policy,
            order_id,
            self.input.clone(),
        ));

        let mut surfaces = self.surfaces.lock();
        surfaces.retain(|_, task| !task.is_finished());
        surfaces.insert(overlay, task);
        info!("Mounted checkout surface {:?} for session {} at {}", overlay, request.session_id, request.url);
        Ok(overlay)
    }

    fn unmount(&self, overlay: OverlayId) {
        if let Some(task) = self.surfaces.lock().remove(&overlay) {
            task.abort();
            debug!("Unmounted checkout surface {:?}", overlay);
        }
    }
}

async fn run_surface(
    api: SharedPaymentApi,
    port: ParentPort,
    policy: PollPolicy,
    order_id: String,
    input: Option<MethodDetails>,
) {
    let mut controller = CheckoutController::mount(api, port, policy);

    if controller.load_order(&order_id).await.is_err() {
        return;
    }

    let details = match input {
        Some(details) => details,
        None => return futures::future::pending().await,
    };

    if let Err(e) = controller.select_method(details.method()) {
        warn!("Cannot select {}: {}", details.method(), e);
        return;
    }
    match controller.submit_attempt(details).await {
        Ok(_) => {
            let state = controller.settled().await;
            debug!("Checkout surface settled as {:?}", state.status);
        }
        Err(e) => warn!("Payment details rejected: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::create_channel;
    use crate::models::{MessageKind, PaymentStatus};
    use crate::test_support::{attempt, ScriptedApi};
    use std::sync::Arc;
    use std::time::Duration;

    fn request(url: &str) -> (SurfaceRequest, crate::channel::Subscription) {
        let (port, subscription) = create_channel();
        let request = SurfaceRequest {
            session_id: Uuid::new_v4(),
            url: Url::parse(url).unwrap(),
            port,
        };
        (request, subscription)
    }

    #[test]
    fn test_order_id_from_address() {
        let (with_order, _s1) = request("http://localhost:3001/?order_id=order_abc");
        let (without_order, _s2) = request("http://localhost:3001/?order_id=");

        assert_eq!(with_order.order_id().as_deref(), Some("order_abc"));
        assert_eq!(without_order.order_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_rejects_address_without_order() {
        let surface = InProcessSurface::new(Arc::new(ScriptedApi::new()), PollPolicy::default(), None);
        let (request, _subscription) = request("http://localhost:3001/");

        assert!(matches!(surface.mount(request), Err(SurfaceError::MissingOrder(_))));
        assert_eq!(surface.mounted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_submitting_surface_reports_outcome() {
        let api = Arc::new(ScriptedApi::new());
        api.insert_order("order_test", 10000);
        api.push_poll(Ok(attempt("pay_1", PaymentStatus::Succeeded)));
        let input = MethodDetails::Upi { vpa: "user@bank".to_string() };
        let surface = InProcessSurface::new(api.clone(), PollPolicy::default(), Some(input));

        let (request, mut subscription) = request("http://localhost:3001/?order_id=order_test");
        surface.mount(request).unwrap();

        assert_eq!(subscription.next().await.unwrap().kind, MessageKind::Ready);
        assert_eq!(subscription.next().await.unwrap().kind, MessageKind::Success);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_tears_down_the_controller() {
        let api = Arc::new(ScriptedApi::new());
        api.insert_order("order_test", 10000);
        let input = MethodDetails::Upi { vpa: "user@bank".to_string() };
        let surface = InProcessSurface::new(api.clone(), PollPolicy::default(), Some(input));

        let (request, mut subscription) = request("http://localhost:3001/?order_id=order_test");
        let overlay = surface.mount(request).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(api.poll_count(), 1);

        surface.unmount(overlay);
        surface.unmount(overlay);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(api.poll_count(), 1);
        assert_eq!(surface.mounted(), 0);

        assert_eq!(subscription.next().await.unwrap().kind, MessageKind::Ready);
        assert!(subscription.next().await.is_none());
    }
}
