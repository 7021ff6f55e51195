//! Payment verification and its durable cache.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use bitebox_core::{OrderId, PaymentStatus};
use bitebox_integration_tests::{Call, FakeCommerceApi, Failure, Op, config, session_with_store};
use bitebox_storefront::SessionError;
use bitebox_storefront::api::{VerificationResponse, VerifiedPayment};
use bitebox_storefront::services::PaymentVerificationRecord;
use bitebox_storefront::storage::{KeyValueStore, MemoryStore, keys};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

const SESSION: &str = "cs_test_123";
const GUEST: &str = "ABCDEFGHJKMNPQRS";

fn paid() -> VerificationResponse {
    VerificationResponse {
        success: true,
        message: "Payment verified".to_string(),
        data: Some(VerifiedPayment {
            order_id: OrderId::new(77),
            order_number: "BB-1001".to_string(),
            payment_status: PaymentStatus::Paid,
            total_amount: Decimal::new(4250, 2),
            customer_email: None,
        }),
    }
}

fn setup() -> (FakeCommerceApi, Arc<MemoryStore>, bitebox_storefront::SessionContext<FakeCommerceApi>) {
    let api = FakeCommerceApi::new();
    let store = Arc::new(MemoryStore::new());
    let ctx = session_with_store(&api, config(), Arc::clone(&store) as _);
    (api, store, ctx)
}

fn verify_calls(api: &FakeCommerceApi) -> usize {
    api.count(|c| matches!(c, Call::VerifyPayment { .. }))
}

#[tokio::test]
async fn test_missing_identifiers_make_no_call() {
    let (api, _, ctx) = setup();
    let verifier = ctx.payment_verifier();

    assert!(matches!(
        verifier.verify(None, Some(GUEST)).await,
        Err(SessionError::MissingIdentifiers)
    ));
    assert!(matches!(
        verifier.verify(Some(SESSION), Some("   ")).await,
        Err(SessionError::MissingIdentifiers)
    ));
    assert_eq!(verify_calls(&api), 0);
}

#[tokio::test]
async fn test_success_is_served_from_cache() {
    let (api, store, ctx) = setup();
    api.set_verification(paid());
    let verifier = ctx.payment_verifier();

    let first = verifier.verify(Some(SESSION), Some(GUEST)).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.response, paid());

    let second = verifier.verify(Some(SESSION), Some(GUEST)).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.response, paid());
    assert_eq!(verify_calls(&api), 1);

    let raw = store
        .get(&keys::payment_verification(SESSION, GUEST))
        .unwrap()
        .unwrap();
    let record: PaymentVerificationRecord = serde_json::from_str(&raw).unwrap();
    assert_eq!(record.session_id, SESSION);
    assert_eq!(record.guest_id, GUEST);
}

#[tokio::test]
async fn test_expired_record_is_verified_again() {
    let (api, store, ctx) = setup();
    api.set_verification(paid());

    let stale = PaymentVerificationRecord {
        session_id: SESSION.to_string(),
        guest_id: GUEST.to_string(),
        verified_payload: paid(),
        verified_at_epoch_ms: (Utc::now() - Duration::hours(25)).timestamp_millis(),
    };
    let key = keys::payment_verification(SESSION, GUEST);
    store
        .set(&key, &serde_json::to_string(&stale).unwrap())
        .unwrap();

    let result = ctx
        .payment_verifier()
        .verify(Some(SESSION), Some(GUEST))
        .await
        .unwrap();
    assert!(!result.from_cache);
    assert_eq!(verify_calls(&api), 1);

    let raw = store.get(&key).unwrap().unwrap();
    let record: PaymentVerificationRecord = serde_json::from_str(&raw).unwrap();
    assert!(record.verified_at_epoch_ms > stale.verified_at_epoch_ms);
}

#[tokio::test]
async fn test_unverified_payment_is_not_cached() {
    let (api, store, ctx) = setup();
    api.set_verification(VerificationResponse {
        success: false,
        message: "Payment not completed".to_string(),
        data: None,
    });
    let verifier = ctx.payment_verifier();

    let result = verifier.verify(Some(SESSION), Some(GUEST)).await.unwrap();
    assert!(!result.response.success);
    assert_eq!(result.response.message, "Payment not completed");

    verifier.verify(Some(SESSION), Some(GUEST)).await.unwrap();
    assert_eq!(verify_calls(&api), 2);
    assert!(
        store
            .get(&keys::payment_verification(SESSION, GUEST))
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_corrupt_record_is_discarded() {
    let (api, store, ctx) = setup();
    api.set_verification(VerificationResponse {
        success: false,
        message: "Payment not completed".to_string(),
        data: None,
    });
    let key = keys::payment_verification(SESSION, GUEST);
    store.set(&key, "{not json").unwrap();

    let result = ctx
        .payment_verifier()
        .verify(Some(SESSION), Some(GUEST))
        .await
        .unwrap();
    assert!(!result.from_cache);
    assert_eq!(verify_calls(&api), 1);
    assert!(store.get(&key).unwrap().is_none());
}

#[tokio::test]
async fn test_transport_failure_is_an_error() {
    let (api, store, ctx) = setup();
    api.fail(Op::VerifyPayment, Failure::Status(502));

    assert!(matches!(
        ctx.payment_verifier()
            .verify(Some(SESSION), Some(GUEST))
            .await,
        Err(SessionError::Fetch(_))
    ));
    assert!(
        store
            .get(&keys::payment_verification(SESSION, GUEST))
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_concurrent_verifications_make_one_call() {
    let (api, _, ctx) = setup();
    api.set_verification(paid());
    let a = ctx.payment_verifier();
    let b = ctx.payment_verifier();

    let (first, second) = tokio::join!(
        a.verify(Some(SESSION), Some(GUEST)),
        b.verify(Some(SESSION), Some(GUEST)),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(verify_calls(&api), 1);
    assert!(first.from_cache != second.from_cache);
    assert_eq!(first.response, second.response);
}
