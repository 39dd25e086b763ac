pub mod app;
pub mod channel;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
