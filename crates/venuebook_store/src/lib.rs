// --- File: crates/venuebook_store/src/lib.rs ---
// Durable local state: namespaced records, the session identity and the
// notification log.

pub mod error;
pub mod notifications;
#[cfg(test)]
mod notifications_proptest;
pub mod session;
pub mod storage;

pub use error::StoreError;
pub use notifications::{NotificationEntry, NotificationLog};
pub use session::SessionStore;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
