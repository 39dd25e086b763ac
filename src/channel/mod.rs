pub mod message_channel;

pub use message_channel::{create_channel, ParentPort, SessionToken, Subscription};
