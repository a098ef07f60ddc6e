//! Read-through cache of booking lists per (venue, visible range).
//!
//! Every fetch takes a sequence number and remembers the invalidation
//! generation it started under. A response is only applied when no
//! invalidation happened while it was in flight and no newer response for the
//! same key has been applied already. Failed fetches leave the last good list
//! in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use venuebook_common::models::{Booking, BookingQuery, VisibleRange};
use venuebook_common::services::BookingGateway;
use venuebook_common::VenuebookError;

/// Views kept per cache; the least recently fetched one goes first.
pub const MAX_CACHED_VIEWS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub venue_id: String,
    pub range: VisibleRange,
}

impl CacheKey {
    pub fn new(venue_id: impl Into<String>, range: VisibleRange) -> Self {
        Self {
            venue_id: venue_id.into(),
            range,
        }
    }

    /// Both components must be known before anything is fetched.
    pub fn from_parts(venue_id: Option<&str>, range: Option<VisibleRange>) -> Option<Self> {
        Some(Self::new(venue_id?, range?))
    }

    fn query(&self) -> BookingQuery {
        BookingQuery {
            venue_id: self.venue_id.clone(),
            from: self.range.from,
            to: self.range.to,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    bookings: Vec<Booking>,
    seq: u64,
    stale: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    generation: u64,
    next_seq: u64,
}

impl CacheState {
    /// Drops the oldest views beyond the bound, never `keep`.
    fn evict_oldest(&mut self, keep: &CacheKey) {
        while self.entries.len() > MAX_CACHED_VIEWS {
            let oldest = self
                .entries
                .iter()
                .filter(|(key, _)| *key != keep)
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            let Some(oldest) = oldest else {
                return;
            };
            debug!("evicting cached view for venue {}", oldest.venue_id);
            self.entries.remove(&oldest);
        }
    }
}

enum Applied {
    Fresh(Vec<Booking>),
    /// An invalidation landed while the fetch was in flight
    Superseded(Vec<Booking>),
}

pub struct BookingViewCache {
    gateway: Arc<dyn BookingGateway>,
    state: Mutex<CacheState>,
    generation: watch::Sender<u64>,
    max_refetch: u32,
}

impl BookingViewCache {
    pub fn new(gateway: Arc<dyn BookingGateway>, max_refetch: u32) -> Self {
        Self {
            gateway,
            state: Mutex::new(CacheState::default()),
            generation: watch::channel(0).0,
            max_refetch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bookings for `key`, fetched when absent or stale.
    ///
    /// # Errors
    ///
    /// The fetch error is returned as is; the previous list for the key stays
    /// available through [`Self::last_good`].
    pub async fn get(&self, key: &CacheKey) -> Result<Vec<Booking>, VenuebookError> {
        if let Some(entry) = self.lock().entries.get(key).filter(|e| !e.stale) {
            debug!("cache hit for venue {} seq {}", key.venue_id, entry.seq);
            return Ok(entry.bookings.clone());
        }

        let mut refetches = 0;
        loop {
            let (seq, generation) = self.begin_fetch();
            debug!("cache miss for venue {}, fetch seq {}", key.venue_id, seq);
            let result = self.gateway.list_bookings(key.query()).await;
            let bookings = match result {
                Ok(bookings) => bookings,
                Err(err) => {
                    if self.lock().entries.contains_key(key) {
                        warn!("refetch for venue {} failed, keeping last good list: {}", key.venue_id, err);
                    }
                    return Err(err);
                }
            };
            match self.apply(key, seq, generation, bookings, refetches >= self.max_refetch) {
                Applied::Fresh(bookings) => return Ok(bookings),
                Applied::Superseded(bookings) if refetches >= self.max_refetch => {
                    warn!(
                        "venue {} kept changing during {} refetches, serving possibly stale list",
                        key.venue_id, refetches
                    );
                    return Ok(bookings);
                }
                Applied::Superseded(_) => {
                    refetches += 1;
                    debug!("fetch seq {} superseded by invalidation, refetching", seq);
                }
            }
        }
    }

    /// Like [`Self::get`], but only fetches once both venue and range are set.
    pub async fn get_for(
        &self,
        venue_id: Option<&str>,
        range: Option<VisibleRange>,
    ) -> Result<Option<Vec<Booking>>, VenuebookError> {
        match CacheKey::from_parts(venue_id, range) {
            Some(key) => self.get(&key).await.map(Some),
            None => Ok(None),
        }
    }

    fn begin_fetch(&self) -> (u64, u64) {
        let mut state = self.lock();
        state.next_seq += 1;
        (state.next_seq, state.generation)
    }

    /// Decides the fate of a completed fetch. With `last_try` set a superseded
    /// response is still stored, but left stale.
    fn apply(
        &self,
        key: &CacheKey,
        seq: u64,
        generation: u64,
        bookings: Vec<Booking>,
        last_try: bool,
    ) -> Applied {
        let mut state = self.lock();
        let superseded = state.generation != generation;
        if superseded && !last_try {
            return Applied::Superseded(bookings);
        }
        if let Some(newer) = state.entries.get(key).filter(|e| e.seq > seq) {
            debug!("dropping fetch seq {}, seq {} already applied", seq, newer.seq);
            let bookings = newer.bookings.clone();
            return if newer.stale {
                Applied::Superseded(bookings)
            } else {
                Applied::Fresh(bookings)
            };
        }
        state.entries.insert(
            key.clone(),
            Entry {
                bookings: bookings.clone(),
                seq,
                stale: superseded,
            },
        );
        state.evict_oldest(key);
        if superseded {
            Applied::Superseded(bookings)
        } else {
            Applied::Fresh(bookings)
        }
    }

    /// Marks every entry stale. Readers refetch on their next `get`, and
    /// subscribers are woken so open views can do so right away.
    pub fn invalidate(&self) {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.entries.values_mut().for_each(|e| e.stale = true);
            state.generation
        };
        info!("booking cache invalidated (generation {})", generation);
        self.generation.send_replace(generation);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Last list applied for `key`, stale or not.
    pub fn last_good(&self, key: &CacheKey) -> Option<Vec<Booking>> {
        self.lock().entries.get(key).map(|e| e.bookings.clone())
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.lock().entries.get(key).map_or(true, |e| e.stale)
    }
}
