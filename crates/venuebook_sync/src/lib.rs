// --- File: crates/venuebook_sync/src/lib.rs ---
// Client-side booking synchronization on top of the gateway traits.

pub mod auth;
pub mod board;
pub mod cache;
pub mod calendar;
pub mod controller;
pub mod error;
pub mod live;
pub mod notice;
pub mod payment;
pub mod permissions;
#[cfg(test)]
mod permissions_proptest;
pub mod reports;
pub mod venues;

pub use auth::Authenticator;
pub use board::BookingBoard;
pub use cache::{BookingViewCache, CacheKey};
pub use controller::{MutationController, MutationPhase};
pub use error::LiveError;
pub use live::{BookingEventRouter, ConnectionState, LiveChannel, LiveHandle, LiveSettings, RetryPolicy};
pub use notice::{Notice, NoticeBoard, NoticeLevel};
pub use payment::{PaymentReference, PaymentResultFlow, VerificationState};
pub use permissions::{can_mutate, guard, Access};
pub use reports::Reports;
pub use venues::VenueDirectory;
