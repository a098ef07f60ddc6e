// --- File: crates/venuebook_gateway/src/payments.rs ---
//! Checkout and verification endpoints.
//!
//! The backend talks to the payment provider; the client only starts a
//! checkout and later asks the backend whether the payment was approved.

use reqwest::Method;
use tracing::debug;
use venuebook_common::models::{CheckoutRequest, CheckoutSession, PaymentVerification};
use venuebook_common::services::{BoxFuture, PaymentGateway};

use crate::client::RestGateway;
use crate::error::GatewayError;

impl RestGateway {
    async fn verify_with(
        &self,
        path: &str,
        param: &str,
        value: &str,
    ) -> Result<PaymentVerification, GatewayError> {
        debug!("verifying payment via {} ({}={})", path, param, value);
        self.send_json(self.request(Method::GET, path).query(&[(param, value)]))
            .await
    }
}

impl PaymentGateway for RestGateway {
    fn checkout(&self, booking_id: &str) -> BoxFuture<'_, CheckoutSession> {
        let request = CheckoutRequest {
            booking_id: booking_id.to_string(),
        };
        Box::pin(async move {
            Ok(self
                .send_json(self.request(Method::POST, "/payments/checkout").json(&request))
                .await?)
        })
    }

    fn verify_payment(&self, payment_id: &str) -> BoxFuture<'_, PaymentVerification> {
        let payment_id = payment_id.to_string();
        Box::pin(async move {
            Ok(self
                .verify_with("/payments/verify", "payment_id", &payment_id)
                .await?)
        })
    }

    fn verify_preference(&self, preference_id: &str) -> BoxFuture<'_, PaymentVerification> {
        let preference_id = preference_id.to_string();
        Box::pin(async move {
            Ok(self
                .verify_with("/payments/verify", "preference_id", &preference_id)
                .await?)
        })
    }

    fn verify_external(&self, booking_id: &str) -> BoxFuture<'_, PaymentVerification> {
        let booking_id = booking_id.to_string();
        Box::pin(async move {
            Ok(self
                .verify_with("/payments/verify-external", "bookingId", &booking_id)
                .await?)
        })
    }
}
