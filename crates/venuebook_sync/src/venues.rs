//! Venue list with a staleness window.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use venuebook_common::models::Venue;
use venuebook_common::services::BookingGateway;
use venuebook_common::VenuebookError;

struct Fetched {
    at: Instant,
    venues: Vec<Venue>,
}

pub struct VenueDirectory {
    gateway: Arc<dyn BookingGateway>,
    fresh_for: Duration,
    cached: Mutex<Option<Fetched>>,
}

impl VenueDirectory {
    pub fn new(gateway: Arc<dyn BookingGateway>, fresh_for: Duration) -> Self {
        Self {
            gateway,
            fresh_for,
            cached: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Fetched>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Venues, refetched once the cached list is older than the window.
    /// A failed refetch falls back to the previous list when there is one.
    pub async fn list(&self) -> Result<Vec<Venue>, VenuebookError> {
        if let Some(fetched) = self
            .lock()
            .as_ref()
            .filter(|f| f.at.elapsed() < self.fresh_for)
        {
            return Ok(fetched.venues.clone());
        }

        debug!("fetching venue list");
        match self.gateway.list_venues().await {
            Ok(venues) => {
                *self.lock() = Some(Fetched {
                    at: Instant::now(),
                    venues: venues.clone(),
                });
                Ok(venues)
            }
            Err(err) => match self.lock().as_ref() {
                Some(previous) => {
                    warn!("venue refetch failed, keeping previous list: {}", err);
                    Ok(previous.venues.clone())
                }
                None => Err(err),
            },
        }
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }
}

/// The selected venue when it still exists, otherwise the first one.
pub fn default_venue<'a>(venues: &'a [Venue], selected: Option<&str>) -> Option<&'a Venue> {
    selected
        .and_then(|id| venues.iter().find(|v| v.id == id))
        .or_else(|| venues.first())
}
