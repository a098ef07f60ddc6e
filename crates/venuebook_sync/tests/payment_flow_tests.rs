//! Payment result verification against a mock payment API.

use std::sync::Arc;

use serde_json::json;
use venuebook_common::{StaticToken, VenuebookError};
use venuebook_config::ApiConfig;
use venuebook_gateway::{MockGateway, RestGateway};
use venuebook_sync::payment::checkout;
use venuebook_sync::{
    BookingViewCache, NoticeBoard, NoticeLevel, PaymentReference, PaymentResultFlow,
    VerificationState,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    payments: Arc<RestGateway>,
    cache: Arc<BookingViewCache>,
    notices: NoticeBoard,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let config = ApiConfig {
        base_url: server.uri(),
        timeout_secs: 5,
    };
    let payments =
        Arc::new(RestGateway::new(&config, Arc::new(StaticToken(Some("tok".into())))).unwrap());
    let cache = Arc::new(BookingViewCache::new(Arc::new(MockGateway::new()), 3));
    Harness {
        server,
        payments,
        cache,
        notices: NoticeBoard::default(),
    }
}

impl Harness {
    fn flow(&self, query: &str) -> PaymentResultFlow {
        PaymentResultFlow::new(
            self.payments.clone(),
            self.cache.clone(),
            self.notices.clone(),
            query,
        )
    }
}

#[tokio::test]
async fn test_booking_id_uses_external_verification_only() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/payments/verify-external"))
        .and(query_param("bookingId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "approved": true, "status": "approved", "bookingId": "42"
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "approved": true })))
        .expect(0)
        .mount(&h.server)
        .await;

    let mut flow = h.flow("?bookingId=42");
    assert_eq!(flow.reference(), Some(&PaymentReference::Booking("42".into())));
    let verification = flow.verify().await.unwrap();

    assert!(verification.approved);
    assert!(matches!(flow.state(), VerificationState::Approved(_)));
    assert_eq!(h.cache.generation(), 1);
    assert_eq!(h.server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_reference_makes_no_request() {
    let h = harness().await;
    let mut notices = h.notices.subscribe();

    let mut flow = h.flow("?status=approved&collection_status=null");
    let result = flow.verify().await;

    assert!(matches!(result, Err(VenuebookError::MissingPaymentReference)));
    assert_eq!(flow.state(), &VerificationState::MissingReference);
    assert!(h.server.received_requests().await.unwrap().is_empty());
    assert_eq!(h.cache.generation(), 0);
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_not_approved_keeps_cache_and_retry_reverifies() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/payments/verify"))
        .and(query_param("payment_id", "pay-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "approved": false, "status": "in_process", "paymentId": "pay-7"
        })))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/verify"))
        .and(query_param("payment_id", "pay-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "approved": true, "status": "approved", "paymentId": "pay-7"
        })))
        .mount(&h.server)
        .await;

    let mut flow = h.flow("payment_id=pay-7&preference_id=pref-1&bookingId=3");
    let first = flow.verify().await.unwrap();
    assert_eq!(first.status.as_deref(), Some("in_process"));
    assert!(matches!(flow.state(), VerificationState::NotApproved(_)));
    assert_eq!(h.cache.generation(), 0);

    flow.retry().await.unwrap();
    assert!(matches!(flow.state(), VerificationState::Approved(_)));
    assert_eq!(h.cache.generation(), 1);
    assert_eq!(h.server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_verification_failure_is_recorded() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/payments/verify"))
        .and(query_param("preference_id", "pref-1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&h.server)
        .await;

    let mut flow = h.flow("preference_id=pref-1");
    assert!(flow.verify().await.is_err());
    assert!(matches!(flow.state(), VerificationState::Failed(_)));
}

#[tokio::test]
async fn test_checkout_returns_provider_redirect() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/payments/checkout"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "initPoint": "https://www.mercadopago.cl/checkout/v1/redirect?pref_id=1"
        })))
        .mount(&h.server)
        .await;

    let session = checkout(h.payments.as_ref(), "b1").await.unwrap();
    assert!(session.init_point.contains("pref_id=1"));
    assert!(matches!(
        checkout(h.payments.as_ref(), " ").await,
        Err(VenuebookError::ValidationError(_))
    ));
}
