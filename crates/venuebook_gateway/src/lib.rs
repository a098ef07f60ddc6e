// --- File: crates/venuebook_gateway/src/lib.rs ---
// Remote booking gateway: typed REST client plus an in-memory stand-in.

pub mod auth;
pub mod client;
pub mod error;
pub mod mock;
pub mod payments;
pub mod reports;

pub use client::RestGateway;
pub use error::GatewayError;
pub use mock::MockGateway;
