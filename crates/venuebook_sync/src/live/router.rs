//! Fans live booking events out to the cache, the notification log and the
//! notice board.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use venuebook_common::log_error;
use venuebook_common::models::{BookingEvent, BookingEventKind};
use venuebook_store::NotificationLog;

use crate::cache::BookingViewCache;
use crate::notice::NoticeBoard;

#[derive(Clone)]
pub struct BookingEventRouter {
    cache: Arc<BookingViewCache>,
    log: Arc<NotificationLog>,
    notices: NoticeBoard,
}

impl BookingEventRouter {
    pub fn new(cache: Arc<BookingViewCache>, log: Arc<NotificationLog>, notices: NoticeBoard) -> Self {
        Self {
            cache,
            log,
            notices,
        }
    }

    /// Events carry no venue or range filter, so every event invalidates
    /// the whole cache.
    pub fn handle(&self, event: &BookingEvent) {
        self.cache.invalidate();
        if let Err(e) = self.log.push(event) {
            log_error(e, "recording notification");
        }

        let title = event.payload.title.as_deref().filter(|t| !t.is_empty());
        let with_title = |action: &str| match title {
            Some(t) => format!("{}: {}", action, t),
            None => action.to_string(),
        };
        match event.kind {
            BookingEventKind::Created => self.notices.success(with_title("Booking created")),
            BookingEventKind::Updated => self.notices.info(with_title("Booking updated")),
            BookingEventKind::Deleted => self.notices.warning(with_title("Booking deleted")),
        }
    }

    /// Consumes `events` until the channel closes.
    pub fn spawn(self, mut events: broadcast::Receiver<BookingEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(RecvError::Lagged(missed)) => {
                        // Whatever was missed changed something
                        warn!("missed {} live events", missed);
                        self.cache.invalidate();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("live event router stopped");
        })
    }
}
