//! Role and ownership checks.

use venuebook_common::models::{Role, Session};

/// Whether `role` acting as `self_id` may change a booking owned by `owner_id`.
///
/// Staff may change anything. Everybody else only their own bookings; a
/// booking without an owner is never editable by ownership.
pub fn can_mutate(role: Role, owner_id: Option<&str>, self_id: &str) -> bool {
    if role.is_staff() {
        return true;
    }
    owner_id == Some(self_id)
}

/// Outcome of a route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Not signed in
    Login,
    /// Signed in with a role outside the allowed set
    Forbidden,
}

/// Guards a view. An empty `roles` slice only requires a session.
pub fn guard(session: Option<&Session>, roles: &[Role]) -> Access {
    match session {
        None => Access::Login,
        Some(_) if roles.is_empty() => Access::Granted,
        Some(s) if roles.contains(&s.user.role) => Access::Granted,
        Some(_) => Access::Forbidden,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venuebook_common::models::User;

    fn session(role: Role) -> Session {
        Session {
            token: "t".into(),
            user: User {
                id: "u1".into(),
                name: "Ana".into(),
                email: "ana@demo.com".into(),
                role,
            },
        }
    }

    #[test]
    fn test_guard_outcomes() {
        assert_eq!(guard(None, &[]), Access::Login);
        assert_eq!(guard(None, &[Role::Admin]), Access::Login);
        assert_eq!(guard(Some(&session(Role::Customer)), &[]), Access::Granted);
        assert_eq!(
            guard(Some(&session(Role::Worker)), &[Role::Admin]),
            Access::Forbidden
        );
        assert_eq!(
            guard(Some(&session(Role::Admin)), &[Role::Admin]),
            Access::Granted
        );
    }

    #[test]
    fn test_unowned_booking_is_not_editable_by_customer() {
        assert!(!can_mutate(Role::Customer, None, "u1"));
        assert!(can_mutate(Role::Worker, None, "u1"));
    }
}
