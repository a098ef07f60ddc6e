//! In-memory gateway for tests and offline development.
//!
//! Behaves like a small booking server: it validates intervals, assigns ids,
//! filters listings by venue and range, and records every call. Failures can
//! be queued per operation and listings can be held behind a gate to stage
//! races between fetches and invalidations.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use venuebook_common::models::{
    Booking, BookingPatch, BookingQuery, BookingStatus, CheckoutSession, LoginRequest,
    LoginResponse, NewBooking, Overview, OverviewQuery, PaymentVerification, User, Venue,
};
use venuebook_common::services::{
    AuthGateway, BookingGateway, BoxFuture, PaymentGateway, ReportsGateway,
};
use venuebook_common::{not_found, validation_error, VenuebookError};

/// Operation selector for queued failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListVenues,
    ListBookings,
    Create,
    Update,
    Delete,
    Login,
    Checkout,
    Verify,
    Reports,
}

/// A recorded call, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListVenues,
    ListBookings(BookingQuery),
    Create(NewBooking),
    Update(String, BookingPatch),
    Delete(String),
    Login(String),
    Checkout(String),
    VerifyPayment(String),
    VerifyPreference(String),
    VerifyExternal(String),
    Overview(OverviewQuery),
    AdminStats,
}

#[derive(Default)]
struct MockState {
    venues: Vec<Venue>,
    bookings: Vec<Booking>,
    next_id: u64,
    users: HashMap<String, (String, User)>,
    verifications: HashMap<String, PaymentVerification>,
    overview: Option<Overview>,
    failures: HashMap<Op, VecDeque<VenuebookError>>,
    calls: Vec<Call>,
}

/// Holds `list_bookings` calls until permits are released.
#[derive(Clone)]
pub struct ListingGate {
    permits: Arc<Semaphore>,
}

impl ListingGate {
    /// Lets `n` held (or future) listings complete.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

/// In-memory booking service.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    gate: Mutex<Option<ListingGate>>,
}

impl MockGateway {
    /// Create a new, empty mock gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_venue(self, id: &str, name: &str) -> Self {
        self.lock().venues.push(Venue {
            id: id.to_string(),
            name: name.to_string(),
            lat: None,
            lng: None,
        });
        self
    }

    pub fn with_booking(self, booking: Booking) -> Self {
        self.insert_booking(booking);
        self
    }

    pub fn with_user(self, password: &str, user: User) -> Self {
        self.lock()
            .users
            .insert(user.email.clone(), (password.to_string(), user));
        self
    }

    /// Server-side change made by "another session".
    pub fn insert_booking(&self, booking: Booking) {
        let mut state = self.lock();
        state.bookings.retain(|b| b.id != booking.id);
        state.bookings.push(booking);
    }

    pub fn set_verification(&self, reference: &str, verification: PaymentVerification) {
        self.lock()
            .verifications
            .insert(reference.to_string(), verification);
    }

    pub fn set_overview(&self, overview: Overview) {
        self.lock().overview = Some(overview);
    }

    /// The next call of `op` fails with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: Op, error: VenuebookError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// From now on every `list_bookings` waits for a permit from the returned gate.
    pub fn gate_listing(&self) -> ListingGate {
        let gate = ListingGate {
            permits: Arc::new(Semaphore::new(0)),
        };
        *self.gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn booking(&self, booking_id: &str) -> Option<Booking> {
        self.lock()
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .cloned()
    }

    fn begin(&self, op: Op, call: Call) -> Result<(), VenuebookError> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn verification_for(&self, reference: &str) -> PaymentVerification {
        self.lock()
            .verifications
            .get(reference)
            .cloned()
            .unwrap_or(PaymentVerification {
                approved: false,
                status: Some("pending".to_string()),
                payment_id: None,
                booking_id: None,
            })
    }
}

impl BookingGateway for MockGateway {
    fn list_venues(&self) -> BoxFuture<'_, Vec<Venue>> {
        Box::pin(async move {
            self.begin(Op::ListVenues, Call::ListVenues)?;
            Ok(self.lock().venues.clone())
        })
    }

    fn list_bookings(&self, query: BookingQuery) -> BoxFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            self.begin(Op::ListBookings, Call::ListBookings(query.clone()))?;
            let gate = self.gate.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(gate) = gate {
                if let Ok(permit) = gate.permits.acquire().await {
                    permit.forget();
                }
            }
            // Snapshot taken at completion, like a slow server
            Ok(self
                .lock()
                .bookings
                .iter()
                .filter(|b| b.venue_id() == Some(query.venue_id.as_str()))
                .filter(|b| b.start_at < query.to && b.end_at > query.from)
                .cloned()
                .collect())
        })
    }

    fn create_booking(&self, booking: NewBooking) -> BoxFuture<'_, Booking> {
        Box::pin(async move {
            self.begin(Op::Create, Call::Create(booking.clone()))?;
            if booking.end_at <= booking.start_at {
                return Err(validation_error("endAt must be after startAt"));
            }
            let mut state = self.lock();
            state.next_id += 1;
            let created = Booking {
                id: format!("bk-{}", state.next_id),
                title: booking.title,
                start_at: booking.start_at,
                end_at: booking.end_at,
                venue_id: Some(booking.venue_id),
                venue: None,
                user_id: None,
                user: None,
                status: BookingStatus::Pending,
            };
            state.bookings.push(created.clone());
            Ok(created)
        })
    }

    fn update_booking(&self, booking_id: &str, patch: BookingPatch) -> BoxFuture<'_, Booking> {
        let booking_id = booking_id.to_string();
        Box::pin(async move {
            self.begin(Op::Update, Call::Update(booking_id.clone(), patch.clone()))?;
            let mut state = self.lock();
            let booking = state
                .bookings
                .iter_mut()
                .find(|b| b.id == booking_id)
                .ok_or_else(|| not_found(format!("booking {}", booking_id)))?;
            let start = patch.start_at.unwrap_or(booking.start_at);
            let end = patch.end_at.unwrap_or(booking.end_at);
            if end <= start {
                return Err(validation_error("endAt must be after startAt"));
            }
            booking.start_at = start;
            booking.end_at = end;
            if let Some(title) = patch.title {
                booking.title = Some(title);
            }
            Ok(booking.clone())
        })
    }

    fn delete_booking(&self, booking_id: &str) -> BoxFuture<'_, ()> {
        let booking_id = booking_id.to_string();
        Box::pin(async move {
            self.begin(Op::Delete, Call::Delete(booking_id.clone()))?;
            let mut state = self.lock();
            let before = state.bookings.len();
            state.bookings.retain(|b| b.id != booking_id);
            if state.bookings.len() == before {
                return Err(not_found(format!("booking {}", booking_id)));
            }
            Ok(())
        })
    }
}

impl AuthGateway for MockGateway {
    fn login(&self, request: LoginRequest) -> BoxFuture<'_, LoginResponse> {
        Box::pin(async move {
            self.begin(Op::Login, Call::Login(request.email.clone()))?;
            let state = self.lock();
            match state.users.get(&request.email) {
                Some((password, user)) if *password == request.password => Ok(LoginResponse {
                    access_token: format!("token-{}", user.id),
                    user: user.clone(),
                }),
                _ => Err(VenuebookError::AuthError("Invalid credentials".to_string())),
            }
        })
    }
}

impl PaymentGateway for MockGateway {
    fn checkout(&self, booking_id: &str) -> BoxFuture<'_, CheckoutSession> {
        let booking_id = booking_id.to_string();
        Box::pin(async move {
            self.begin(Op::Checkout, Call::Checkout(booking_id.clone()))?;
            Ok(CheckoutSession {
                init_point: format!("https://checkout.example.com/pay?ref={}", booking_id),
            })
        })
    }

    fn verify_payment(&self, payment_id: &str) -> BoxFuture<'_, PaymentVerification> {
        let payment_id = payment_id.to_string();
        Box::pin(async move {
            self.begin(Op::Verify, Call::VerifyPayment(payment_id.clone()))?;
            Ok(self.verification_for(&payment_id))
        })
    }

    fn verify_preference(&self, preference_id: &str) -> BoxFuture<'_, PaymentVerification> {
        let preference_id = preference_id.to_string();
        Box::pin(async move {
            self.begin(Op::Verify, Call::VerifyPreference(preference_id.clone()))?;
            Ok(self.verification_for(&preference_id))
        })
    }

    fn verify_external(&self, booking_id: &str) -> BoxFuture<'_, PaymentVerification> {
        let booking_id = booking_id.to_string();
        Box::pin(async move {
            self.begin(Op::Verify, Call::VerifyExternal(booking_id.clone()))?;
            Ok(self.verification_for(&booking_id))
        })
    }
}

impl ReportsGateway for MockGateway {
    fn overview(&self, query: OverviewQuery) -> BoxFuture<'_, Overview> {
        Box::pin(async move {
            self.begin(Op::Reports, Call::Overview(query))?;
            self.lock()
                .overview
                .clone()
                .ok_or_else(|| not_found("overview"))
        })
    }

    fn admin_stats(&self) -> BoxFuture<'_, serde_json::Value> {
        Box::pin(async move {
            self.begin(Op::Reports, Call::AdminStats)?;
            let state = self.lock();
            Ok(serde_json::json!({
                "venues": state.venues.len(),
                "bookings": state.bookings.len(),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn booking(id: &str, venue: &str, hour: u32) -> Booking {
        let start = Utc.with_ymd_and_hms(2025, 5, 5, hour, 0, 0).unwrap();
        Booking {
            id: id.to_string(),
            title: None,
            start_at: start,
            end_at: start + Duration::hours(1),
            venue_id: Some(venue.to_string()),
            venue: None,
            user_id: None,
            user: None,
            status: BookingStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_listing_filters_by_venue_and_range() {
        let gateway = MockGateway::new()
            .with_booking(booking("a", "v1", 9))
            .with_booking(booking("b", "v1", 20))
            .with_booking(booking("c", "v2", 9));

        let day = Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap();
        let listed = gateway
            .list_bookings(BookingQuery {
                venue_id: "v1".into(),
                from: day,
                to: day + Duration::hours(12),
            })
            .await
            .unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "a");
    }

    #[tokio::test]
    async fn test_queued_failure_is_consumed_once() {
        let gateway = MockGateway::new().with_venue("v1", "Court A");
        gateway.fail_next(Op::ListVenues, VenuebookError::HttpError("down".into()));

        assert!(gateway.list_venues().await.is_err());
        assert_eq!(gateway.list_venues().await.unwrap().len(), 1);
        assert_eq!(gateway.count_calls(|c| *c == Call::ListVenues), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_inverted_interval() {
        let gateway = MockGateway::new().with_booking(booking("a", "v1", 9));
        let original = gateway.booking("a").unwrap();

        let result = gateway
            .update_booking(
                "a",
                BookingPatch::reschedule(original.end_at, original.start_at),
            )
            .await;

        assert!(matches!(result, Err(VenuebookError::ValidationError(_))));
        assert_eq!(gateway.booking("a").unwrap(), original);
    }
}
