//! Optimistic mutation controller.
//!
//! Create, move, resize and retitle are applied to the calendar view-model
//! before the remote call resolves. Success invalidates the booking cache so
//! the next read shows server state; failure undoes the local change and
//! surfaces a notice. Nothing is retried automatically.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use venuebook_common::models::{Booking, BookingPatch, NewBooking, User};
use venuebook_common::services::BookingGateway;
use venuebook_common::{forbidden, not_found, validation_error, VenuebookError};
use venuebook_store::SessionStore;

use crate::cache::BookingViewCache;
use crate::calendar::{lock, CalendarEvent, CalendarModel, SharedCalendar};
use crate::notice::NoticeBoard;
use crate::permissions::can_mutate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Move,
    Resize,
    Retitle,
}

/// Lifecycle of one optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    OptimisticApplied,
    Committed,
    RolledBack,
}

impl MutationPhase {
    pub fn can_advance_to(self, next: MutationPhase) -> bool {
        use MutationPhase::*;
        matches!(
            (self, next),
            (Idle, OptimisticApplied)
                | (OptimisticApplied, Committed)
                | (OptimisticApplied, RolledBack)
                | (Committed, Idle)
                | (RolledBack, Idle)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub kind: MutationKind,
    pub phase: MutationPhase,
}

struct Mutation<'a> {
    kind: MutationKind,
    phase: MutationPhase,
    phases: &'a broadcast::Sender<PhaseChange>,
}

impl<'a> Mutation<'a> {
    fn applied(kind: MutationKind, phases: &'a broadcast::Sender<PhaseChange>) -> Self {
        let mut mutation = Self {
            kind,
            phase: MutationPhase::Idle,
            phases,
        };
        mutation.advance(MutationPhase::OptimisticApplied);
        mutation
    }

    fn advance(&mut self, next: MutationPhase) {
        debug_assert!(self.phase.can_advance_to(next), "{:?} -> {:?}", self.phase, next);
        debug!("{:?} mutation {:?} -> {:?}", self.kind, self.phase, next);
        self.phase = next;
        let _ = self.phases.send(PhaseChange {
            kind: self.kind,
            phase: next,
        });
    }

    fn finish(mut self, terminal: MutationPhase) {
        self.advance(terminal);
        self.advance(MutationPhase::Idle);
    }
}

type PendingSet = Mutex<HashSet<String>>;

fn lock_pending(pending: &PendingSet) -> MutexGuard<'_, HashSet<String>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Marks a booking as having a change in flight until dropped.
struct InFlight<'a> {
    pending: &'a PendingSet,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

pub struct MutationController {
    gateway: Arc<dyn BookingGateway>,
    cache: Arc<BookingViewCache>,
    calendar: SharedCalendar,
    sessions: Arc<SessionStore>,
    notices: NoticeBoard,
    phases: broadcast::Sender<PhaseChange>,
    /// Bookings with an unsettled move, resize or retitle
    pending: PendingSet,
}

impl MutationController {
    pub fn new(
        gateway: Arc<dyn BookingGateway>,
        cache: Arc<BookingViewCache>,
        calendar: SharedCalendar,
        sessions: Arc<SessionStore>,
        notices: NoticeBoard,
    ) -> Self {
        Self {
            gateway,
            cache,
            calendar,
            sessions,
            notices,
            phases: broadcast::channel(32).0,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Every phase transition of every mutation, in order.
    pub fn phases(&self) -> broadcast::Receiver<PhaseChange> {
        self.phases.subscribe()
    }

    /// Whether a drag or resize of `event_id` may start at all.
    pub fn allow_drag(&self, event_id: &str) -> bool {
        let Some(user) = self.sessions.user() else {
            return false;
        };
        if lock_pending(&self.pending).contains(event_id) {
            return false;
        }
        match lock(&self.calendar).get(event_id) {
            Some(event) if !event.provisional => {
                can_mutate(user.role, event.owner_id.as_deref(), &user.id)
            }
            _ => false,
        }
    }

    fn reject(&self, err: VenuebookError) -> VenuebookError {
        self.notices.error(&err);
        err
    }

    fn actor(&self) -> Result<User, VenuebookError> {
        self.sessions
            .user()
            .ok_or_else(|| self.reject(VenuebookError::AuthError("sign in required".to_string())))
    }

    fn check_interval(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), VenuebookError> {
        if end <= start {
            return Err(self.reject(validation_error("End must be after start")));
        }
        Ok(())
    }

    /// Applies `change` to an event the actor may edit and returns the
    /// event as it was before. One change per booking may be in flight; its
    /// rollback snapshot would be wrong for any change stacked on top.
    fn apply_local<F>(
        &self,
        user: &User,
        id: &str,
        change: F,
    ) -> Result<(CalendarEvent, InFlight<'_>), VenuebookError>
    where
        F: FnOnce(&mut CalendarModel) -> Option<CalendarEvent>,
    {
        let mut calendar = lock(&self.calendar);
        let mut pending = lock_pending(&self.pending);
        if pending.contains(id) {
            return Err(self.reject(validation_error(
                "Booking is still being saved, try again in a moment",
            )));
        }
        let event = calendar
            .get(id)
            .ok_or_else(|| self.reject(not_found(format!("booking {} is not on the calendar", id))))?;
        if event.provisional {
            return Err(self.reject(validation_error("Booking is still being saved")));
        }
        if !can_mutate(user.role, event.owner_id.as_deref(), &user.id) {
            return Err(self.reject(forbidden("You can only change your own bookings")));
        }
        let before = change(&mut *calendar)
            .ok_or_else(|| self.reject(not_found(format!("booking {}", id))))?;
        pending.insert(id.to_string());
        Ok((
            before,
            InFlight {
                pending: &self.pending,
                id: id.to_string(),
            },
        ))
    }

    pub async fn create(
        &self,
        venue_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        title: Option<String>,
    ) -> Result<Booking, VenuebookError> {
        let user = self.actor()?;
        if venue_id.is_empty() {
            return Err(self.reject(validation_error("Select a venue first")));
        }
        self.check_interval(start, end)?;

        let provisional =
            lock(&self.calendar).add_provisional(title.as_deref(), start, end, Some(&user.id));
        let mutation = Mutation::applied(MutationKind::Create, &self.phases);

        let request = NewBooking {
            venue_id: venue_id.to_string(),
            start_at: start,
            end_at: end,
            title,
        };
        match self.gateway.create_booking(request).await {
            Ok(booking) => {
                lock(&self.calendar).confirm(&provisional, &booking, Some(&user));
                self.cache.invalidate();
                mutation.finish(MutationPhase::Committed);
                info!("created booking {} at venue {}", booking.id, venue_id);
                self.notices.success("Booking created");
                Ok(booking)
            }
            Err(err) => {
                lock(&self.calendar).remove(&provisional);
                mutation.finish(MutationPhase::RolledBack);
                warn!("create at venue {} failed: {}", venue_id, err);
                Err(self.reject(err))
            }
        }
    }

    /// Drag to a new slot.
    pub async fn move_booking(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Booking, VenuebookError> {
        self.reschedule(MutationKind::Move, id, start, end).await
    }

    /// Drag one edge.
    pub async fn resize_booking(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Booking, VenuebookError> {
        self.reschedule(MutationKind::Resize, id, start, end).await
    }

    async fn reschedule(
        &self,
        kind: MutationKind,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Booking, VenuebookError> {
        let user = self.actor()?;
        self.check_interval(start, end)?;
        let (before, _in_flight) =
            self.apply_local(&user, id, |calendar| calendar.reschedule(id, start, end))?;
        let mutation = Mutation::applied(kind, &self.phases);

        let result = self
            .gateway
            .update_booking(id, BookingPatch::reschedule(start, end))
            .await;
        self.settle(mutation, &user, before, result)
    }

    pub async fn retitle(&self, id: &str, title: &str) -> Result<Booking, VenuebookError> {
        let user = self.actor()?;
        let title = title.trim();
        if title.is_empty() {
            return Err(self.reject(validation_error("Title must not be empty")));
        }
        let (before, _in_flight) =
            self.apply_local(&user, id, |calendar| calendar.retitle(id, title))?;
        let mutation = Mutation::applied(MutationKind::Retitle, &self.phases);

        let result = self
            .gateway
            .update_booking(id, BookingPatch::retitle(title))
            .await;
        self.settle(mutation, &user, before, result)
    }

    fn settle(
        &self,
        mutation: Mutation<'_>,
        user: &User,
        before: CalendarEvent,
        result: Result<Booking, VenuebookError>,
    ) -> Result<Booking, VenuebookError> {
        let kind = mutation.kind;
        match result {
            Ok(booking) => {
                lock(&self.calendar).upsert(&booking, Some(user));
                self.cache.invalidate();
                mutation.finish(MutationPhase::Committed);
                info!("{:?} of booking {} committed", kind, booking.id);
                Ok(booking)
            }
            Err(err) => {
                warn!("{:?} of booking {} failed, rolling back: {}", kind, before.id, err);
                lock(&self.calendar).restore(before);
                mutation.finish(MutationPhase::RolledBack);
                Err(self.reject(err))
            }
        }
    }

    /// Deletes without touching the calendar first. Bookings known to the
    /// calendar are checked against the actor's permissions; unknown ids are
    /// left to the server.
    pub async fn delete(&self, id: &str) -> Result<(), VenuebookError> {
        let user = self.actor()?;
        let denied = lock(&self.calendar)
            .get(id)
            .is_some_and(|event| !can_mutate(user.role, event.owner_id.as_deref(), &user.id));
        if denied {
            return Err(self.reject(forbidden("You can only delete your own bookings")));
        }

        match self.gateway.delete_booking(id).await {
            Ok(()) => {
                lock(&self.calendar).remove(id);
                self.cache.invalidate();
                info!("deleted booking {}", id);
                self.notices.success("Booking deleted");
                Ok(())
            }
            Err(err) => {
                warn!("delete of booking {} failed: {}", id, err);
                Err(self.reject(err))
            }
        }
    }
}
