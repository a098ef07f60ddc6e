#[cfg(test)]
mod tests {
    use crate::permissions::can_mutate;
    use proptest::prelude::*;
    use venuebook_common::models::Role;

    proptest! {
        // Test that staff may always mutate
        #[test]
        fn test_staff_always_allowed(
            owner in proptest::option::of("[a-z0-9]{1,8}"),
            actor in "[a-z0-9]{1,8}",
            admin in any::<bool>(),
        ) {
            let role = if admin { Role::Admin } else { Role::Worker };
            prop_assert!(can_mutate(role, owner.as_deref(), &actor));
        }

        // Test that customers may mutate iff they own the booking
        #[test]
        fn test_customer_needs_ownership(
            owner in proptest::option::of("[a-c]{1,2}"),
            actor in "[a-c]{1,2}",
        ) {
            let expected = owner.as_deref() == Some(actor.as_str());
            prop_assert_eq!(can_mutate(Role::Customer, owner.as_deref(), &actor), expected);
        }
    }
}
