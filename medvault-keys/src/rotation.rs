//! Daily key pair rotation.

use crate::error::{KeyError, KeyResult};
use crate::store::KeyStore;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use medvault_crypto::AsymmetricKeyPair;
use medvault_policy::{AuditAction, AuditDecision, AuditEvent, AuditSink};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// First instant strictly after `now` at `hour`:00:00 UTC.
///
/// Hours above 23 are clamped to 23.
pub fn next_rotation_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Rotates the backend key pair once a day at a fixed UTC hour.
///
/// A failed rotation is logged and audited; the scheduler carries on and
/// tries again at the next slot.
pub struct RotationScheduler {
    store: Arc<KeyStore>,
    hour: u32,
    audit: Arc<dyn AuditSink>,
}

impl RotationScheduler {
    pub fn new(store: Arc<KeyStore>, hour: u32, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, hour, audit }
    }

    /// Performs a single rotation off the async runtime.
    pub async fn run_once(&self) -> KeyResult<Arc<AsymmetricKeyPair>> {
        let store = Arc::clone(&self.store);
        let previous = store.current().fingerprint().to_string();

        let outcome = tokio::task::spawn_blocking(move || store.rotate())
            .await
            .unwrap_or_else(|e| Err(KeyError::KeyGenerationFailed(format!("rotation task: {e}"))));

        match &outcome {
            Ok(pair) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditAction::KeyRotate, AuditDecision::Allowed)
                            .with_details(format!("{previous} -> {}", pair.fingerprint())),
                    )
                    .await;
            }
            Err(e) => {
                error!(current = %previous, "key rotation failed: {e}");
                self.audit
                    .record(
                        AuditEvent::new(AuditAction::KeyRotate, AuditDecision::Failed)
                            .with_details(e.to_string()),
                    )
                    .await;
            }
        }
        outcome
    }

    /// Runs until `shutdown` carries `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = Utc::now();
            let next = next_rotation_after(now, self.hour);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next, "next key rotation scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    // Failures are already logged and audited.
                    let _ = self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("rotation scheduler stopped");
                        return;
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
