// --- File: crates/services/venuebook_agent/src/app_state.rs ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};
use venuebook_common::models::VisibleRange;
use venuebook_common::services::{AuthGateway, BookingGateway};
use venuebook_common::time::parse_timezone;
use venuebook_common::{internal_error, VenuebookError};
use venuebook_config::AppConfig;
use venuebook_store::{KeyValueStore, NotificationLog, SessionStore};
use venuebook_sync::calendar;
use venuebook_sync::{Authenticator, BookingBoard, BookingViewCache, NoticeBoard, VenueDirectory};

/// Everything the agent keeps alive for the lifetime of the process.
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Display timezone for log lines about bookings
    pub timezone: Tz,

    pub sessions: Arc<SessionStore>,
    pub log: Arc<NotificationLog>,
    pub cache: Arc<BookingViewCache>,
    pub notices: NoticeBoard,
    pub auth: Authenticator,
    pub board: BookingBoard,
}

impl AppState {
    /// Opens the local stores and wires the sync layer on top of the gateway
    /// returned by `connect`. The gateway receives the session store as its
    /// token source.
    pub fn build<G, F>(
        config: Arc<AppConfig>,
        store: Arc<dyn KeyValueStore>,
        connect: F,
    ) -> Result<Self, VenuebookError>
    where
        G: BookingGateway + AuthGateway + 'static,
        F: FnOnce(Arc<SessionStore>) -> Result<Arc<G>, VenuebookError>,
    {
        let timezone = parse_timezone(&config.display.timezone)?;
        let sessions = Arc::new(SessionStore::open(store.clone())?);
        let log = Arc::new(NotificationLog::open(store, &config.notifications)?);
        let gateway = connect(sessions.clone())?;

        let bookings: Arc<dyn BookingGateway> = gateway.clone();
        let cache = Arc::new(BookingViewCache::new(
            bookings.clone(),
            config.cache.max_refetch,
        ));
        let venues = VenueDirectory::new(
            bookings,
            Duration::from_secs(config.cache.venue_stale_secs),
        );
        let notices = NoticeBoard::default();
        let board = BookingBoard::new(
            venues,
            cache.clone(),
            calendar::shared(),
            sessions.clone(),
            notices.clone(),
        );
        let auth = Authenticator::new(gateway, sessions.clone());

        Ok(Self {
            config,
            timezone,
            sessions,
            log,
            cache,
            notices,
            auth,
            board,
        })
    }

    /// Signs in with the configured credentials unless a stored session
    /// already exists.
    pub async fn ensure_signed_in(&self) -> Result<(), VenuebookError> {
        if let Some(user) = self.sessions.user() {
            info!("resuming session of {} ({:?})", user.email, user.role);
            return Ok(());
        }
        match &self.config.credentials {
            Some(credentials) => {
                let session = self
                    .auth
                    .sign_in(&credentials.email, &credentials.password)
                    .await?;
                info!("signed in as {} ({:?})", session.user.email, session.user.role);
                Ok(())
            }
            None => {
                warn!("no stored session and no credentials configured; continuing anonymously");
                Ok(())
            }
        }
    }
}

/// Monday 00:00 UTC of the week containing `now`, through the following Monday.
pub fn week_of(now: DateTime<Utc>) -> Result<VisibleRange, VenuebookError> {
    let today = now.date_naive();
    let back = u64::from(today.weekday().num_days_from_monday());
    let monday = today
        .checked_sub_days(Days::new(back))
        .ok_or_else(|| internal_error("week start out of range"))?;
    let next_monday = monday
        .checked_add_days(Days::new(7))
        .ok_or_else(|| internal_error("week end out of range"))?;
    Ok(VisibleRange::new(
        monday.and_time(NaiveTime::MIN).and_utc(),
        next_monday.and_time(NaiveTime::MIN).and_utc(),
    ))
}
