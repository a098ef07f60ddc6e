// --- File: crates/venuebook_common/src/services.rs ---
//! Service abstractions for the remote booking service.
//!
//! The sync layer only talks to these traits, so the REST client can be swapped
//! for an in-memory implementation in tests.

use std::future::Future;
use std::pin::Pin;

use crate::error::VenuebookError;
use crate::models::{
    Booking, BookingPatch, BookingQuery, CheckoutSession, LoginRequest, LoginResponse, NewBooking,
    Overview, OverviewQuery, PaymentVerification, Venue,
};

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E = VenuebookError> =
    Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Source of the current bearer token.
///
/// Read on every request and on every live channel (re)connection attempt, so
/// a re-login is picked up without rebuilding clients.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token, or none. Handy for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Booking and venue operations.
pub trait BookingGateway: Send + Sync {
    /// `GET /venues`
    fn list_venues(&self) -> BoxFuture<'_, Vec<Venue>>;

    /// `GET /bookings?venueId&from&to`
    fn list_bookings(&self, query: BookingQuery) -> BoxFuture<'_, Vec<Booking>>;

    /// `POST /bookings`
    fn create_booking(&self, booking: NewBooking) -> BoxFuture<'_, Booking>;

    /// `PATCH /bookings/:id`
    fn update_booking(&self, booking_id: &str, patch: BookingPatch) -> BoxFuture<'_, Booking>;

    /// `DELETE /bookings/:id`
    fn delete_booking(&self, booking_id: &str) -> BoxFuture<'_, ()>;
}

/// Credential exchange.
pub trait AuthGateway: Send + Sync {
    /// `POST /auth/login`
    fn login(&self, request: LoginRequest) -> BoxFuture<'_, LoginResponse>;
}

/// Checkout and verification against the payment provider, via the backend.
pub trait PaymentGateway: Send + Sync {
    /// `POST /payments/checkout`
    fn checkout(&self, booking_id: &str) -> BoxFuture<'_, CheckoutSession>;

    /// `GET /payments/verify?payment_id=`
    fn verify_payment(&self, payment_id: &str) -> BoxFuture<'_, PaymentVerification>;

    /// `GET /payments/verify?preference_id=`
    fn verify_preference(&self, preference_id: &str) -> BoxFuture<'_, PaymentVerification>;

    /// `GET /payments/verify-external?bookingId=`
    fn verify_external(&self, booking_id: &str) -> BoxFuture<'_, PaymentVerification>;
}

/// Role-gated reporting endpoints.
pub trait ReportsGateway: Send + Sync {
    /// `GET /reports/overview`
    fn overview(&self, query: OverviewQuery) -> BoxFuture<'_, Overview>;

    /// `GET /venues/admin-stats`. The shape is owned by the server.
    fn admin_stats(&self) -> BoxFuture<'_, serde_json::Value>;
}
