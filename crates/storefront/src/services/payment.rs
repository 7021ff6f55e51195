//! Payment verification with a durable cache.
//!
//! The shopper lands back from the external payment page with a session id
//! and their guest id. A successful verification is stored under
//! [`keys::payment_verification`] so reloading the confirmation page does
//! not hit the backend again while the record is fresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::{CommerceApi, VerificationRequest, VerificationResponse};
use crate::error::{Result, SessionError};
use crate::storage::{SharedStore, keys};

/// A stored successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerificationRecord {
    pub session_id: String,
    pub guest_id: String,
    pub verified_payload: VerificationResponse,
    pub verified_at_epoch_ms: i64,
}

impl PaymentVerificationRecord {
    /// Whether the record is younger than `ttl` at `now_ms`.
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.verified_at_epoch_ms) < ttl_ms
    }
}

/// Outcome of [`PaymentVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub response: VerificationResponse,
    /// Whether the response was served from the durable cache.
    pub from_cache: bool,
}

/// Why a stored record was not used.
#[derive(Debug)]
enum StaleEntry {
    Corrupt(serde_json::Error),
    Expired { age_ms: i64 },
}

/// Verifies payment sessions, caching successes.
///
/// Cheap to clone; clones share the single-flight gate.
pub struct PaymentVerifier<A> {
    inner: Arc<PaymentVerifierInner<A>>,
}

struct PaymentVerifierInner<A> {
    api: A,
    store: SharedStore,
    ttl: Duration,
    gate: tokio::sync::Mutex<()>,
}

impl<A> Clone for PaymentVerifier<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for PaymentVerifier<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentVerifier")
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl<A: CommerceApi> PaymentVerifier<A> {
    /// Create a verifier whose records stay fresh for `ttl`.
    #[must_use]
    pub fn new(api: A, store: SharedStore, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(PaymentVerifierInner {
                api,
                store,
                ttl,
                gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Verify a payment session.
    ///
    /// Returns a fresh stored result without contacting the backend.
    /// Otherwise makes exactly one verification call; a `success: true`
    /// response is stored before returning, a `success: false` response is
    /// returned as-is and not stored. Concurrent calls are serialised.
    ///
    /// # Errors
    ///
    /// Returns `MissingIdentifiers` if either id is absent or blank, and
    /// `Fetch` if the verification call failed.
    #[instrument(skip(self))]
    pub async fn verify(
        &self,
        session_id: Option<&str>,
        guest_id: Option<&str>,
    ) -> Result<VerificationResult> {
        let (Some(session_id), Some(guest_id)) = (non_blank(session_id), non_blank(guest_id))
        else {
            return Err(SessionError::MissingIdentifiers);
        };

        let _gate = self.inner.gate.lock().await;
        let key = keys::payment_verification(session_id, guest_id);

        if let Some(record) = self.cached(&key) {
            debug!("Cache hit for payment verification");
            return Ok(VerificationResult {
                response: record.verified_payload,
                from_cache: true,
            });
        }

        let response = self
            .inner
            .api
            .verify_payment(&VerificationRequest {
                session_id: session_id.to_string(),
                guest_id: guest_id.to_string(),
            })
            .await?;

        if response.success {
            info!("Payment verified");
            self.remember(&key, session_id, guest_id, &response);
        } else {
            info!(message = %response.message, "Payment not verified");
        }

        Ok(VerificationResult {
            response,
            from_cache: false,
        })
    }

    /// Read a fresh record, removing stale or corrupt ones.
    fn cached(&self, key: &str) -> Option<PaymentVerificationRecord> {
        let raw = match self.inner.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Payment cache unreadable, verifying remotely");
                return None;
            }
        };

        match self.check(&raw) {
            Ok(record) => Some(record),
            Err(stale) => {
                match &stale {
                    StaleEntry::Corrupt(e) => warn!(error = %e, "Discarding corrupt payment record"),
                    StaleEntry::Expired { age_ms } => {
                        debug!(age_ms, "Discarding expired payment record");
                    }
                }
                if let Err(e) = self.inner.store.remove(key) {
                    warn!(error = %e, "Could not remove stale payment record");
                }
                None
            }
        }
    }

    fn check(&self, raw: &str) -> std::result::Result<PaymentVerificationRecord, StaleEntry> {
        let record: PaymentVerificationRecord =
            serde_json::from_str(raw).map_err(StaleEntry::Corrupt)?;
        let now = Utc::now().timestamp_millis();
        if record.is_fresh(now, self.inner.ttl) {
            Ok(record)
        } else {
            Err(StaleEntry::Expired {
                age_ms: now.saturating_sub(record.verified_at_epoch_ms),
            })
        }
    }

    fn remember(&self, key: &str, session_id: &str, guest_id: &str, response: &VerificationResponse) {
        let record = PaymentVerificationRecord {
            session_id: session_id.to_string(),
            guest_id: guest_id.to_string(),
            verified_payload: response.clone(),
            verified_at_epoch_ms: Utc::now().timestamp_millis(),
        };

        let stored = serde_json::to_string(&record)
            .map_err(crate::storage::StorageError::from)
            .and_then(|json| self.inner.store.set(key, &json));
        if let Err(e) = stored {
            warn!(error = %e, "Could not store payment verification");
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(verified_at_epoch_ms: i64) -> PaymentVerificationRecord {
        PaymentVerificationRecord {
            session_id: "cs_1".to_string(),
            guest_id: "ABCDEFGHIJKLMNOP".to_string(),
            verified_payload: VerificationResponse {
                success: true,
                message: "ok".to_string(),
                data: None,
            },
            verified_at_epoch_ms,
        }
    }

    #[test]
    fn test_freshness_window() {
        let day = Duration::from_secs(24 * 60 * 60);
        let hour_ms = 60 * 60 * 1000;
        let now = 100 * hour_ms;

        assert!(record(now - 23 * hour_ms).is_fresh(now, day));
        assert!(!record(now - 24 * hour_ms).is_fresh(now, day));
        assert!(!record(now - 25 * hour_ms).is_fresh(now, day));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some(" cs_1 ")), Some("cs_1"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_record_uses_camel_case_keys() {
        let json = serde_json::to_value(record(5)).unwrap_or_default();
        assert_eq!(json["verifiedAtEpochMs"], 5);
        assert_eq!(json["verifiedPayload"]["success"], true);
    }
}
