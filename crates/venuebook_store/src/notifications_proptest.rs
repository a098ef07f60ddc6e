#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use venuebook_common::models::{BookingEvent, BookingEventKind, BookingEventPayload};
    use venuebook_config::NotificationConfig;

    use crate::notifications::NotificationLog;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn event(index: usize) -> BookingEvent {
        BookingEvent {
            kind: BookingEventKind::Created,
            payload: BookingEventPayload {
                id: format!("b{}", index),
                title: None,
                start_at: None,
                end_at: None,
                venue_id: None,
            },
        }
    }

    proptest! {
        // Test that the log never grows past the bound and evicts oldest first
        #[test]
        fn test_log_is_bounded(pushes in 0..120usize) {
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            let log = NotificationLog::open(store, &NotificationConfig::default()).unwrap();

            for i in 0..pushes {
                log.push(&event(i)).unwrap();
                prop_assert!(log.len() <= 50);
            }

            let items = log.items();
            prop_assert_eq!(items.len(), pushes.min(50));
            if pushes > 0 {
                prop_assert_eq!(&items[0].booking_id, &format!("b{}", pushes - 1));
                let oldest_kept = pushes - pushes.min(50);
                prop_assert_eq!(&items[items.len() - 1].booking_id, &format!("b{}", oldest_kept));
            }
        }

        // Test that every entry older than the retention window is dropped at load
        #[test]
        fn test_retention_on_load(ages in proptest::collection::vec(0..90i64, 0..40)) {
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            let config = NotificationConfig::default();
            let now = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
            let log = NotificationLog::open_at(store.clone(), &config, now).unwrap();
            for (i, age_hours) in ages.iter().enumerate() {
                log.push_at(&event(i), now - Duration::hours(age_hours * 12)).unwrap();
            }

            let reopened = NotificationLog::open_at(store, &config, now).unwrap();
            let cutoff = now - Duration::days(config.retention_days);
            prop_assert!(reopened.items().iter().all(|n| n.at >= cutoff));
            let expected = ages.iter().filter(|a| **a * 12 <= 30 * 24).count();
            prop_assert_eq!(reopened.len(), expected);
        }
    }
}
