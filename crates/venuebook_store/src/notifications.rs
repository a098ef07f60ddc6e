//! Bounded, persisted log of remote booking changes.
//!
//! Newest entries come first. The log never holds more than `max_items`
//! entries and drops anything older than the retention window when it is
//! loaded. Stored under the `notif` namespace as a versioned envelope.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;
use venuebook_common::models::{BookingEvent, BookingEventKind};
use venuebook_common::time::{format_local, format_span};
use venuebook_config::NotificationConfig;

use crate::error::StoreError;
use crate::storage::{load_versioned, save_versioned, KeyValueStore};

pub const NOTIFICATION_NAMESPACE: &str = "notif";
pub const NOTIFICATION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub id: String,
    pub kind: BookingEventKind,
    pub booking_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
    /// Arrival time, stored as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl NotificationEntry {
    /// e.g. `Booking updated · Finals`
    pub fn summary(&self) -> String {
        let action = match self.kind {
            BookingEventKind::Created => "Booking created",
            BookingEventKind::Updated => "Booking updated",
            BookingEventKind::Deleted => "Booking deleted",
        };
        match &self.title {
            Some(title) if !title.is_empty() => format!("{} · {}", action, title),
            _ => action.to_string(),
        }
    }

    /// Booking interval in the display timezone, or the arrival time when the
    /// event carried no interval.
    pub fn time_line(&self, tz: Tz) -> String {
        let span = format_span(self.start_at, self.end_at, tz);
        if span.is_empty() {
            format_local(self.at, tz)
        } else {
            span
        }
    }
}

/// Stored shape; entries are decoded one at a time so a bad one does not
/// take the rest of the log with it.
#[derive(Debug, Default, Deserialize)]
struct LogState {
    #[serde(default)]
    items: Vec<Value>,
}

/// Entries written without an arrival time count as arriving `now`.
fn decode_entry(mut raw: Value, now: DateTime<Utc>) -> Option<NotificationEntry> {
    if let Value::Object(map) = &mut raw {
        if map.get("at").map_or(true, Value::is_null) {
            map.insert("at".to_string(), json!(now.timestamp_millis()));
        }
    }
    serde_json::from_value(raw)
        .inspect_err(|e| warn!("dropping unreadable notification: {}", e))
        .ok()
}

/// Notification log with load-on-open and save-on-mutation.
pub struct NotificationLog {
    store: Arc<dyn KeyValueStore>,
    items: Mutex<Vec<NotificationEntry>>,
    unread: watch::Sender<usize>,
    max_items: usize,
}

/// Version 0 kept the entries as a bare array.
fn migrate(state: Value, version: u32) -> Result<Value, StoreError> {
    match (version, state) {
        (0, Value::Array(items)) => Ok(json!({ "items": items })),
        (_, state @ Value::Object(_)) => Ok(state),
        _ => Ok(json!({ "items": [] })),
    }
}

impl NotificationLog {
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        config: &NotificationConfig,
    ) -> Result<Self, StoreError> {
        Self::open_at(store, config, Utc::now())
    }

    /// Opens the log as of `now`; entries older than the retention window
    /// relative to `now` are dropped and the pruned log is written back.
    pub fn open_at(
        store: Arc<dyn KeyValueStore>,
        config: &NotificationConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let mut rewrite = false;
        let state = match load_versioned::<LogState, _>(
            store.as_ref(),
            NOTIFICATION_NAMESPACE,
            NOTIFICATION_VERSION,
            migrate,
        ) {
            Ok(state) => state.unwrap_or_default(),
            Err(StoreError::Serialization(e)) => {
                warn!("discarding unreadable notification log: {}", e);
                rewrite = true;
                LogState::default()
            }
            Err(e) => return Err(e),
        };

        let stored = state.items.len();
        let entries: Vec<NotificationEntry> = state
            .items
            .into_iter()
            .filter_map(|raw| decode_entry(raw, now))
            .collect();
        let decoded = entries.len();

        let cutoff = now - Duration::days(config.retention_days);
        let mut items: Vec<NotificationEntry> =
            entries.into_iter().filter(|n| n.at >= cutoff).collect();
        items.truncate(config.max_items);
        if items.len() != decoded {
            info!("pruned {} expired notifications", decoded - items.len());
        }
        rewrite |= items.len() != stored;

        let log = Self {
            store,
            unread: watch::channel(items.iter().filter(|n| !n.read).count()).0,
            items: Mutex::new(items),
            max_items: config.max_items,
        };
        if rewrite {
            log.persist(&log.lock())?;
        }
        Ok(log)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NotificationEntry>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, items: &[NotificationEntry]) -> Result<(), StoreError> {
        self.unread
            .send_replace(items.iter().filter(|n| !n.read).count());
        save_versioned(
            self.store.as_ref(),
            NOTIFICATION_NAMESPACE,
            NOTIFICATION_VERSION,
            &json!({ "items": items }),
        )
    }

    /// Records a live event as a new unread entry at the head of the log.
    pub fn push(&self, event: &BookingEvent) -> Result<NotificationEntry, StoreError> {
        self.push_at(event, Utc::now())
    }

    pub fn push_at(
        &self,
        event: &BookingEvent,
        at: DateTime<Utc>,
    ) -> Result<NotificationEntry, StoreError> {
        let entry = NotificationEntry {
            id: Uuid::new_v4().to_string(),
            kind: event.kind,
            booking_id: event.payload.id.clone(),
            title: event.payload.title.clone(),
            start_at: event.payload.start_at,
            end_at: event.payload.end_at,
            venue_id: event.payload.venue_id.clone(),
            at,
            read: false,
        };
        let mut items = self.lock();
        items.insert(0, entry.clone());
        items.truncate(self.max_items);
        debug!("notification {} for booking {}", entry.id, entry.booking_id);
        self.persist(&items)?;
        Ok(entry)
    }

    pub fn mark_all_read(&self) -> Result<(), StoreError> {
        let mut items = self.lock();
        items.iter_mut().for_each(|n| n.read = true);
        self.persist(&items)
    }

    /// Returns whether an entry with `id` existed.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|n| n.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.persist(&items)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let mut items = self.lock();
        items.clear();
        self.persist(&items)
    }

    pub fn items(&self) -> Vec<NotificationEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        *self.unread.borrow()
    }

    /// Badge counter; changes whenever the unread count is recomputed.
    pub fn watch_unread(&self) -> watch::Receiver<usize> {
        self.unread.subscribe()
    }
}
