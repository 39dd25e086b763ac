pub mod message;
pub mod order;
pub mod payment;

pub use message::{MessageKind, OutcomeMessage};
pub use order::{CreateOrderRequest, Order};
pub use payment::{
    AttemptRecordError, CardDetails, CreatePaymentRequest, MethodDetails, PaymentAttempt, PaymentMethod,
    PaymentStatus,
};
