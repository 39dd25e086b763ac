pub mod atomic_metrics;
pub mod checkout_session;
pub mod host_bridge;
pub mod payment_api;
pub mod payment_service_client;
pub mod surface;

pub use checkout_session::{CheckoutController, CheckoutError, CheckoutView, PollPolicy, SessionState, SessionStatus};
pub use host_bridge::{BridgeError, CheckoutOptions, HostBridge, SessionHandle, SessionOutcome};
pub use payment_api::{ApiError, PaymentApi, SharedPaymentApi};
pub use payment_service_client::PaymentServiceClient;
pub use surface::{InProcessSurface, OverlayId, SurfaceError, SurfacePresenter, SurfaceRequest};
