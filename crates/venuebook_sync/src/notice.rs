//! Transient user-facing notices (the toast surface).

use tokio::sync::broadcast;
use tracing::debug;
use venuebook_common::{Redirect, VenuebookError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Set when the failure should also move the user to another view
    pub redirect: Option<Redirect>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            redirect: None,
        }
    }

    pub fn from_error(err: &VenuebookError) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: err.notice(),
            redirect: err.redirect(),
        }
    }
}

/// Fan-out of notices to whoever renders them. Publishing never blocks and
/// never fails; notices sent while nobody listens are dropped.
#[derive(Clone)]
pub struct NoticeBoard {
    sender: broadcast::Sender<Notice>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NoticeBoard {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notice: Notice) {
        debug!("notice [{:?}] {}", notice.level, notice.message);
        let _ = self.sender.send(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(Notice::new(NoticeLevel::Success, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(Notice::new(NoticeLevel::Info, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.publish(Notice::new(NoticeLevel::Warning, message));
    }

    pub fn error(&self, err: &VenuebookError) {
        self.publish(Notice::from_error(err));
    }
}
