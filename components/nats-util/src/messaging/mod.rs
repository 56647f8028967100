pub mod connection;
pub mod core_session;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod session;
pub mod streaming_session;
pub mod transport;
