//! Calendar view-model.
//!
//! The application owns the event list a calendar renders. Optimistic changes
//! are applied here and undone here, so rollback is plain state manipulation
//! rather than a call into a rendering widget.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use venuebook_common::models::{Booking, BookingStatus, User};

use crate::permissions::can_mutate;

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub owner_id: Option<String>,
    pub status: BookingStatus,
    /// Whether the acting user may drag, resize or retitle it
    pub editable: bool,
    /// Shown before the server confirmed it
    pub provisional: bool,
}

impl CalendarEvent {
    fn from_booking(booking: &Booking, actor: Option<&User>) -> Self {
        let owner_id = booking.owner_id().map(str::to_string);
        let editable = actor
            .map(|u| can_mutate(u.role, owner_id.as_deref(), &u.id))
            .unwrap_or(false);
        Self {
            id: booking.id.clone(),
            title: booking.display_title().to_string(),
            start: booking.start_at,
            end: booking.end_at,
            owner_id,
            status: booking.status,
            editable,
            provisional: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct CalendarModel {
    events: Vec<CalendarEvent>,
    next_provisional: u64,
}

/// The model shared by the board and the mutation controller.
pub type SharedCalendar = Arc<Mutex<CalendarModel>>;

pub fn shared() -> SharedCalendar {
    Arc::new(Mutex::new(CalendarModel::default()))
}

pub(crate) fn lock(calendar: &SharedCalendar) -> MutexGuard<'_, CalendarModel> {
    calendar.lock().unwrap_or_else(|e| e.into_inner())
}

impl CalendarModel {
    /// Replaces every event, provisional ones included, with `bookings`.
    pub fn project(&mut self, bookings: &[Booking], actor: Option<&User>) {
        self.events = bookings
            .iter()
            .map(|b| CalendarEvent::from_booking(b, actor))
            .collect();
        self.events.sort_by_key(|e| e.start);
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn get(&self, id: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut CalendarEvent> {
        self.events.iter_mut().find(|e| e.id == id)
    }

    /// Adds a placeholder for a booking being created. Returns its local id.
    pub fn add_provisional(
        &mut self,
        title: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        owner_id: Option<&str>,
    ) -> String {
        self.next_provisional += 1;
        let id = format!("provisional-{}", self.next_provisional);
        self.events.push(CalendarEvent {
            id: id.clone(),
            title: title.unwrap_or("Booking").to_string(),
            start,
            end,
            owner_id: owner_id.map(str::to_string),
            status: BookingStatus::Pending,
            editable: false,
            provisional: true,
        });
        id
    }

    /// Swaps a placeholder for the confirmed booking.
    pub fn confirm(&mut self, provisional_id: &str, booking: &Booking, actor: Option<&User>) {
        self.remove(provisional_id);
        self.upsert(booking, actor);
    }

    /// Inserts or refreshes the event for `booking`.
    pub fn upsert(&mut self, booking: &Booking, actor: Option<&User>) {
        let event = CalendarEvent::from_booking(booking, actor);
        self.restore(event);
    }

    pub fn remove(&mut self, id: &str) -> Option<CalendarEvent> {
        let index = self.events.iter().position(|e| e.id == id)?;
        Some(self.events.remove(index))
    }

    /// Moves an event. Returns the event as it was before.
    pub fn reschedule(
        &mut self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<CalendarEvent> {
        let event = self.get_mut(id)?;
        let before = event.clone();
        event.start = start;
        event.end = end;
        Some(before)
    }

    /// Renames an event. Returns the event as it was before.
    pub fn retitle(&mut self, id: &str, title: &str) -> Option<CalendarEvent> {
        let event = self.get_mut(id)?;
        let before = event.clone();
        event.title = title.to_string();
        Some(before)
    }

    /// Puts back a previously taken copy of an event.
    pub fn restore(&mut self, snapshot: CalendarEvent) {
        match self.get_mut(&snapshot.id) {
            Some(event) => *event = snapshot,
            None => self.events.push(snapshot),
        }
        self.events.sort_by_key(|e| e.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use venuebook_common::models::Role;

    fn booking(id: &str, owner: Option<&str>, hour: u32) -> Booking {
        let start = Utc.with_ymd_and_hms(2025, 5, 6, hour, 0, 0).unwrap();
        Booking {
            id: id.to_string(),
            title: None,
            start_at: start,
            end_at: start + Duration::hours(1),
            venue_id: Some("v1".into()),
            venue: None,
            user_id: owner.map(str::to_string),
            user: None,
            status: BookingStatus::Pending,
        }
    }

    fn customer(id: &str) -> User {
        User {
            id: id.into(),
            name: "Carla".into(),
            email: "carla@demo.com".into(),
            role: Role::Customer,
        }
    }

    #[test]
    fn test_projection_sets_editability_and_order() {
        let mut model = CalendarModel::default();
        let me = customer("u1");
        model.project(
            &[booking("late", Some("u1"), 15), booking("early", Some("u2"), 9)],
            Some(&me),
        );

        let events = model.events();
        assert_eq!(events[0].id, "early");
        assert!(!events[0].editable);
        assert!(events[1].editable);
        assert_eq!(events[1].title, "Booking");
    }

    #[test]
    fn test_reschedule_then_restore_is_exact() {
        let mut model = CalendarModel::default();
        model.project(&[booking("b1", None, 9)], None);
        let original = model.get("b1").cloned().unwrap();

        let later = original.start + Duration::hours(3);
        let before = model.reschedule("b1", later, later + Duration::hours(1)).unwrap();
        assert_eq!(model.get("b1").unwrap().start, later);

        model.restore(before);
        assert_eq!(model.get("b1"), Some(&original));
    }

    #[test]
    fn test_provisional_is_replaced_on_projection() {
        let mut model = CalendarModel::default();
        let start = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let id = model.add_provisional(Some("Draft"), start, start + Duration::hours(1), None);
        assert!(model.get(&id).unwrap().provisional);

        model.project(&[booking("b1", None, 9)], None);
        assert!(model.get(&id).is_none());
        assert_eq!(model.events().len(), 1);
    }
}
