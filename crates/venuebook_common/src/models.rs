// --- File: crates/venuebook_common/src/models.rs ---

// Wire and domain types shared by the gateway, the stores and the sync layer.
// Instants are absolute UTC on the wire (RFC 3339) and are only converted to a
// local timezone when rendered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Identity ---

/// Role of the acting user.
///
/// The backend historically spelled the non-admin roles in Spanish; both
/// spellings are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(alias = "trabajador")]
    Worker,
    #[serde(alias = "cliente")]
    Customer,
}

impl Role {
    /// Staff may edit any booking regardless of owner.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Worker)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Worker => "worker",
            Role::Customer => "customer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Bearer token and the user it belongs to. Always stored as a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

impl From<LoginResponse> for Session {
    fn from(response: LoginResponse) -> Self {
        Session {
            token: response.access_token,
            user: response.user,
        }
    }
}

// --- Venues ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl Venue {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }
}

/// Venue as embedded in a booking payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// User as embedded in a booking payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
}

// --- Bookings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    #[serde(alias = "PENDING")]
    Pending,
    #[serde(alias = "PAID")]
    Paid,
    #[serde(alias = "CANCELLED", alias = "canceled")]
    Cancelled,
}

/// A reserved interval at a venue.
///
/// The backend sends either flat `venueId`/`userId` references or embedded
/// `venue`/`user` objects; the accessors resolve whichever is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<VenueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub status: BookingStatus,
}

impl Booking {
    pub fn venue_id(&self) -> Option<&str> {
        self.venue_id
            .as_deref()
            .or_else(|| self.venue.as_ref().map(|v| v.id.as_str()))
    }

    /// Owning user id. Bookings without an owner are never editable by ownership.
    pub fn owner_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Booking")
    }
}

/// The instant window currently displayed by the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibleRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl VisibleRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant < self.to
    }
}

/// Query parameters of `GET /bookings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    pub venue_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Body of `POST /bookings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub venue_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Body of `PATCH /bookings/:id`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl BookingPatch {
    pub fn reschedule(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            start_at: Some(start_at),
            end_at: Some(end_at),
            title: None,
        }
    }

    pub fn retitle(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

// --- Live events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingEventKind {
    Created,
    Updated,
    Deleted,
}

impl BookingEventKind {
    /// Maps a channel event name such as `booking.created`.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "booking.created" => Some(Self::Created),
            "booking.updated" => Some(Self::Updated),
            "booking.deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            Self::Created => "booking.created",
            Self::Updated => "booking.updated",
            Self::Deleted => "booking.deleted",
        }
    }
}

/// Payload pushed by the live channel for each booking mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEventPayload {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub venue_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub payload: BookingEventPayload,
}

// --- Payments ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub booking_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub init_point: String,
}

/// Response of both verification endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub booking_id: Option<String>,
}

// --- Reports ---

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VenueCount {
    pub id: String,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTotals {
    pub bookings: u64,
    #[serde(default)]
    pub by_venue: Vec<VenueCount>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesPoint {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Overview {
    pub range: ReportRange,
    pub totals: OverviewTotals,
    #[serde(default)]
    pub series: Vec<SeriesPoint>,
}
