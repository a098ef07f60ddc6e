//! Session identity store.
//!
//! Holds the bearer token together with its user. Loaded once when the store
//! is opened and written back on every change; a record that does not carry
//! both halves is discarded.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use venuebook_common::models::{Role, Session, User};
use venuebook_common::services::TokenSource;

use crate::error::StoreError;
use crate::storage::{load_json, save_json, KeyValueStore};

pub const SESSION_NAMESPACE: &str = "auth";

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    current: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Opens the store and restores a previously persisted session.
    ///
    /// A malformed record is removed and the store starts signed out.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let restored = match load_json::<Session>(store.as_ref(), SESSION_NAMESPACE) {
            Ok(session) => session,
            Err(StoreError::Serialization(e)) => {
                warn!("discarding unreadable session record: {}", e);
                store.remove(SESSION_NAMESPACE)?;
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(session) = &restored {
            info!("restored session for {} ({})", session.user.email, session.user.role);
        }
        let (current, _) = watch::channel(restored);
        Ok(Self { store, current })
    }

    pub fn session(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.current.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.current.borrow().as_ref().map(|s| s.user.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Replaces the session. Persisted before it becomes visible to readers.
    pub fn sign_in(&self, session: Session) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), SESSION_NAMESPACE, &session)?;
        info!("signed in as {} ({})", session.user.email, session.user.role);
        self.current.send_replace(Some(session));
        Ok(())
    }

    /// Clears token and user together.
    pub fn sign_out(&self) -> Result<(), StoreError> {
        self.store.remove(SESSION_NAMESPACE)?;
        if self.current.send_replace(None).is_some() {
            info!("signed out");
        }
        Ok(())
    }

    /// Notified on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

impl TokenSource for SessionStore {
    fn bearer_token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|s| s.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn session(token: &str, role: Role) -> Session {
        Session {
            token: token.to_string(),
            user: User {
                id: "u1".into(),
                name: "Ana".into(),
                email: "ana@demo.com".into(),
                role,
            },
        }
    }

    #[test]
    fn test_session_survives_reopen() {
        let backing: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let sessions = SessionStore::open(backing.clone()).unwrap();
        assert!(!sessions.is_authenticated());

        sessions.sign_in(session("t1", Role::Worker)).unwrap();
        let reopened = SessionStore::open(backing).unwrap();
        assert_eq!(reopened.bearer_token().as_deref(), Some("t1"));
        assert_eq!(reopened.role(), Some(Role::Worker));
    }

    #[test]
    fn test_sign_out_clears_token_and_user() {
        let backing: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let sessions = SessionStore::open(backing.clone()).unwrap();
        sessions.sign_in(session("t1", Role::Admin)).unwrap();

        sessions.sign_out().unwrap();
        assert_eq!(sessions.bearer_token(), None);
        assert_eq!(sessions.user(), None);
        assert_eq!(backing.read(SESSION_NAMESPACE).unwrap(), None);
    }

    #[test]
    fn test_half_record_is_discarded() {
        let backing: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        backing.write(SESSION_NAMESPACE, r#"{"token":"orphan"}"#).unwrap();

        let sessions = SessionStore::open(backing.clone()).unwrap();
        assert!(!sessions.is_authenticated());
        assert_eq!(backing.read(SESSION_NAMESPACE).unwrap(), None);
    }

    #[test]
    fn test_token_change_is_visible_immediately() {
        let sessions = SessionStore::open(Arc::new(MemoryStore::new())).unwrap();
        let mut changes = sessions.subscribe();

        sessions.sign_in(session("old", Role::Customer)).unwrap();
        sessions.sign_in(session("new", Role::Customer)).unwrap();

        assert!(changes.has_changed().unwrap());
        assert_eq!(
            changes.borrow_and_update().as_ref().map(|s| s.token.as_str()),
            Some("new")
        );
        assert_eq!(sessions.bearer_token().as_deref(), Some("new"));
    }
}
