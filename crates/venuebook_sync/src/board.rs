//! The booking board: venue selection, visible range and the calendar
//! view-model fed from the booking cache.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use venuebook_common::models::{Venue, VisibleRange};
use venuebook_common::{validation_error, VenuebookError};
use venuebook_store::SessionStore;

use crate::cache::BookingViewCache;
use crate::calendar::{lock, CalendarEvent, SharedCalendar};
use crate::notice::NoticeBoard;
use crate::venues::{default_venue, VenueDirectory};

pub struct BookingBoard {
    venues: VenueDirectory,
    cache: Arc<BookingViewCache>,
    calendar: SharedCalendar,
    sessions: Arc<SessionStore>,
    notices: NoticeBoard,
    venue_id: Option<String>,
    range: Option<VisibleRange>,
}

impl BookingBoard {
    pub fn new(
        venues: VenueDirectory,
        cache: Arc<BookingViewCache>,
        calendar: SharedCalendar,
        sessions: Arc<SessionStore>,
        notices: NoticeBoard,
    ) -> Self {
        Self {
            venues,
            cache,
            calendar,
            sessions,
            notices,
            venue_id: None,
            range: None,
        }
    }

    /// Loads the venue list and falls back to the first venue when nothing
    /// (or a venue that no longer exists) is selected.
    pub async fn load_venues(&mut self) -> Result<Vec<Venue>, VenuebookError> {
        let venues = self.venues.list().await.inspect_err(|e| self.notices.error(e))?;
        let selected = default_venue(&venues, self.venue_id.as_deref()).map(|v| v.id.clone());
        if selected != self.venue_id {
            debug!("selecting venue {:?}", selected);
            self.venue_id = selected;
            self.refresh().await?;
        }
        Ok(venues)
    }

    pub async fn select_venue(&mut self, venue_id: &str) -> Result<(), VenuebookError> {
        self.venue_id = Some(venue_id.to_string());
        self.refresh().await
    }

    /// Called whenever the calendar shows a different window.
    pub async fn set_range(&mut self, range: VisibleRange) -> Result<(), VenuebookError> {
        if range.to <= range.from {
            let err = validation_error("Visible range must end after it starts");
            self.notices.error(&err);
            return Err(err);
        }
        self.range = Some(range);
        self.refresh().await
    }

    /// Re-projects the calendar from the cache. On failure the calendar keeps
    /// showing the last good bookings.
    pub async fn refresh(&mut self) -> Result<(), VenuebookError> {
        let fetched = self
            .cache
            .get_for(self.venue_id.as_deref(), self.range)
            .await
            .inspect_err(|e| self.notices.error(e))?;
        if let Some(bookings) = fetched {
            let actor = self.sessions.user();
            lock(&self.calendar).project(&bookings, actor.as_ref());
        }
        Ok(())
    }

    pub fn selected_venue(&self) -> Option<&str> {
        self.venue_id.as_deref()
    }

    pub fn range(&self) -> Option<VisibleRange> {
        self.range
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        lock(&self.calendar).events().to_vec()
    }

    pub fn calendar(&self) -> SharedCalendar {
        self.calendar.clone()
    }

    /// Changes whenever the cache is invalidated; call [`Self::refresh`] then.
    pub fn invalidations(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone, Utc};
    use venuebook_common::models::{Booking, BookingStatus};
    use venuebook_gateway::mock::{Call, Op};
    use venuebook_gateway::MockGateway;
    use venuebook_store::MemoryStore;

    use crate::calendar;

    fn booking(id: &str, venue: &str) -> Booking {
        let start = Utc.with_ymd_and_hms(2025, 5, 6, 10, 0, 0).unwrap();
        Booking {
            id: id.to_string(),
            title: None,
            start_at: start,
            end_at: start + Duration::hours(1),
            venue_id: Some(venue.to_string()),
            venue: None,
            user_id: None,
            user: None,
            status: BookingStatus::Paid,
        }
    }

    fn week() -> VisibleRange {
        let from = Utc.with_ymd_and_hms(2025, 5, 5, 0, 0, 0).unwrap();
        VisibleRange::new(from, from + Duration::days(7))
    }

    fn board(gateway: &Arc<MockGateway>) -> BookingBoard {
        let cache = Arc::new(BookingViewCache::new(gateway.clone(), 3));
        BookingBoard::new(
            VenueDirectory::new(gateway.clone(), StdDuration::from_secs(300)),
            cache,
            calendar::shared(),
            Arc::new(SessionStore::open(Arc::new(MemoryStore::new())).unwrap()),
            NoticeBoard::default(),
        )
    }

    #[tokio::test]
    async fn test_first_venue_is_default_and_range_triggers_fetch() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_venue("v1", "Court A")
                .with_venue("v2", "Court B")
                .with_booking(booking("b1", "v1"))
                .with_booking(booking("b2", "v2")),
        );
        let mut board = board(&gateway);

        board.load_venues().await.unwrap();
        assert_eq!(board.selected_venue(), Some("v1"));
        // No range yet, nothing fetched
        assert_eq!(gateway.count_calls(|c| matches!(c, Call::ListBookings(_))), 0);

        board.set_range(week()).await.unwrap();
        assert_eq!(board.events()[0].id, "b1");

        board.select_venue("v2").await.unwrap();
        assert_eq!(board.events()[0].id, "b2");
        assert!(!board.events()[0].editable);
    }

    #[tokio::test]
    async fn test_refresh_after_invalidation_shows_remote_change() {
        let gateway = Arc::new(MockGateway::new().with_venue("v1", "Court A"));
        let mut board = board(&gateway);
        let mut invalidations = board.invalidations();
        board.load_venues().await.unwrap();
        board.set_range(week()).await.unwrap();
        assert!(board.events().is_empty());

        gateway.insert_booking(booking("b9", "v1"));
        board.cache.invalidate();
        assert!(invalidations.has_changed().unwrap());
        invalidations.borrow_and_update();

        board.refresh().await.unwrap();
        assert_eq!(board.events().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_calendar() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_venue("v1", "Court A")
                .with_booking(booking("b1", "v1")),
        );
        let mut board = board(&gateway);
        board.load_venues().await.unwrap();
        board.set_range(week()).await.unwrap();

        board.cache.invalidate();
        gateway.fail_next(Op::ListBookings, VenuebookError::TimeoutError("slow".into()));
        assert!(board.refresh().await.is_err());
        assert_eq!(board.events().len(), 1);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let gateway = Arc::new(MockGateway::new());
        let mut board = board(&gateway);
        let r = week();
        assert!(board.set_range(VisibleRange::new(r.to, r.from)).await.is_err());
        assert_eq!(board.range(), None);
    }
}
