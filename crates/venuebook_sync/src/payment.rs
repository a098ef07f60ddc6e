//! Checkout and payment result verification.
//!
//! The result view receives the provider's redirect query. Exactly one
//! verification call is made for the highest-priority reference present:
//! `payment_id`, then `bookingId`, then `preference_id`. Without any of them
//! no call is made at all.

use std::sync::Arc;

use tracing::{info, warn};
use venuebook_common::models::{CheckoutSession, PaymentVerification};
use venuebook_common::services::PaymentGateway;
use venuebook_common::{validation_error, VenuebookError};

use crate::cache::BookingViewCache;
use crate::notice::NoticeBoard;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentReference {
    Payment(String),
    Booking(String),
    Preference(String),
}

impl PaymentReference {
    /// Picks the reference to verify from a query string (leading `?`
    /// optional). Empty values count as absent.
    pub fn from_query(query: &str) -> Option<Self> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(query.trim_start_matches('?')).unwrap_or_default();
        let find = |key: &str| {
            pairs
                .iter()
                .find(|(k, v)| k == key && !v.trim().is_empty())
                .map(|(_, v)| v.trim().to_string())
        };
        find("payment_id")
            .map(Self::Payment)
            .or_else(|| find("bookingId").map(Self::Booking))
            .or_else(|| find("preference_id").map(Self::Preference))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationState {
    /// Not verified yet
    Pending,
    Approved(PaymentVerification),
    /// Verified, but not (yet) approved by the provider
    NotApproved(PaymentVerification),
    /// The query carried nothing to verify
    MissingReference,
    Failed(String),
}

pub struct PaymentResultFlow {
    payments: Arc<dyn PaymentGateway>,
    cache: Arc<BookingViewCache>,
    notices: NoticeBoard,
    reference: Option<PaymentReference>,
    state: VerificationState,
}

impl PaymentResultFlow {
    pub fn new(
        payments: Arc<dyn PaymentGateway>,
        cache: Arc<BookingViewCache>,
        notices: NoticeBoard,
        query: &str,
    ) -> Self {
        Self {
            payments,
            cache,
            notices,
            reference: PaymentReference::from_query(query),
            state: VerificationState::Pending,
        }
    }

    pub fn reference(&self) -> Option<&PaymentReference> {
        self.reference.as_ref()
    }

    pub fn state(&self) -> &VerificationState {
        &self.state
    }

    /// Runs the verification once and records the outcome.
    pub async fn verify(&mut self) -> Result<PaymentVerification, VenuebookError> {
        let Some(reference) = self.reference.clone() else {
            let err = VenuebookError::MissingPaymentReference;
            self.state = VerificationState::MissingReference;
            self.notices.error(&err);
            return Err(err);
        };

        let result = match &reference {
            PaymentReference::Payment(id) => self.payments.verify_payment(id).await,
            PaymentReference::Booking(id) => self.payments.verify_external(id).await,
            PaymentReference::Preference(id) => self.payments.verify_preference(id).await,
        };

        match result {
            Ok(verification) if verification.approved => {
                info!("payment for {:?} approved", reference);
                self.cache.invalidate();
                self.notices.success("Payment confirmed");
                self.state = VerificationState::Approved(verification.clone());
                Ok(verification)
            }
            Ok(verification) => {
                info!(
                    "payment for {:?} not approved (status {:?})",
                    reference, verification.status
                );
                self.notices.warning("Payment not approved yet");
                self.state = VerificationState::NotApproved(verification.clone());
                Ok(verification)
            }
            Err(err) => {
                warn!("payment verification for {:?} failed: {}", reference, err);
                self.notices.error(&err);
                self.state = VerificationState::Failed(err.notice());
                Err(err)
            }
        }
    }

    /// Manual retry from the result view. Same resolution as [`Self::verify`].
    pub async fn retry(&mut self) -> Result<PaymentVerification, VenuebookError> {
        self.state = VerificationState::Pending;
        self.verify().await
    }
}

/// Starts a provider checkout for `booking_id` and returns where to send
/// the user.
pub async fn checkout(
    payments: &dyn PaymentGateway,
    booking_id: &str,
) -> Result<CheckoutSession, VenuebookError> {
    if booking_id.trim().is_empty() {
        return Err(validation_error("A booking is required to pay"));
    }
    let session = payments.checkout(booking_id).await?;
    if !session.init_point.starts_with("https://") && !session.init_point.starts_with("http://") {
        return Err(VenuebookError::ParseError(format!(
            "checkout returned an unusable redirect '{}'",
            session.init_point
        )));
    }
    info!("checkout started for booking {}", booking_id);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_priority() {
        assert_eq!(
            PaymentReference::from_query("?preference_id=p&bookingId=42&payment_id=9"),
            Some(PaymentReference::Payment("9".into()))
        );
        assert_eq!(
            PaymentReference::from_query("preference_id=p&bookingId=42"),
            Some(PaymentReference::Booking("42".into()))
        );
        assert_eq!(
            PaymentReference::from_query("preference_id=p&status=approved"),
            Some(PaymentReference::Preference("p".into()))
        );
    }

    #[test]
    fn test_empty_values_are_absent() {
        assert_eq!(
            PaymentReference::from_query("payment_id=&preference_id=pref-1"),
            Some(PaymentReference::Preference("pref-1".into()))
        );
        assert_eq!(PaymentReference::from_query("payment_id=&status=null"), None);
        assert_eq!(PaymentReference::from_query(""), None);
    }
}
