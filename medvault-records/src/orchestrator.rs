//! Entry point for every record operation.
//!
//! Each call authorizes first. A denial returns before the key store is
//! even consulted. After authorization the call takes one key pair snapshot
//! and uses it for all of its unwraps and wraps, so a concurrent rotation
//! cannot split an operation across two pairs.

use crate::config::SensitiveFields;
use crate::error::{RecordError, RecordResult};
use crate::pipeline::{
    check_resealable, open_stored, reseal_for_transport, seal_for_storage, OpenedRecord, Stage,
};
use crate::record::{
    NewRecord, PrewrappedRecord, RecordId, RecordMetadata, SealedRecord, Storage, Transport,
};
use crate::store::RecordStore;
use chrono::Utc;
use medvault_crypto::{AsymmetricKeyPair, WrappedKey};
use medvault_keys::{KeyStore, RequesterPublicKey};
use medvault_policy::{
    authorize, listing_scope, AuditAction, AuditDecision, AuditEvent, AuditSink, Operation,
    Requester,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RECORD_TARGET: &str = "PatientRecord";

/// Audit detail for a failure. Crypto failures are reported by stage only.
fn failure_summary(err: &RecordError) -> String {
    match err {
        RecordError::Failed { stage, .. } => format!("failed while {stage}"),
        other => other.to_string(),
    }
}

fn reseal_all(
    records: Vec<SealedRecord<Storage>>,
    pair: &AsymmetricKeyPair,
    sensitive: &SensitiveFields,
    requester_key: &RequesterPublicKey,
) -> RecordResult<Vec<SealedRecord<Transport>>> {
    records
        .into_iter()
        .map(|record| reseal_for_transport(open_stored(record, pair, sensitive)?, requester_key))
        .collect()
}

/// Drives records through authorization, encryption and key wrapping.
pub struct EnvelopeOrchestrator {
    keys: Arc<KeyStore>,
    fields: SensitiveFields,
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditSink>,
}

impl EnvelopeOrchestrator {
    pub fn new(
        keys: Arc<KeyStore>,
        fields: SensitiveFields,
        store: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            keys,
            fields,
            store,
            audit,
        }
    }

    pub fn sensitive_fields(&self) -> &SensitiveFields {
        &self.fields
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Encrypts and persists a new record. Returns its id.
    pub async fn create_record(
        &self,
        requester: &Requester,
        record: NewRecord,
    ) -> RecordResult<RecordId> {
        debug!(role = %requester.role, stage = %Stage::Authorizing, "create record");
        let result = async {
            authorize(requester, Operation::Create)?;
            record.check_fields(&self.fields)?;

            let pair = self.keys.current();
            let now = Utc::now();
            let id = Uuid::now_v7();
            let metadata = RecordMetadata {
                patient: record.patient,
                assigned_provider: record.assigned_provider,
                created_by: requester.id.clone(),
                visit_date: record.visit_date.unwrap_or(now),
                created_at: now,
                updated_at: now,
            };

            let sealed = seal_for_storage(OpenedRecord::new(id, metadata, record.fields), &pair)?;
            self.store.insert(sealed).await?;

            info!(
                record = %id,
                role = %requester.role,
                fingerprint = pair.fingerprint(),
                "created record"
            );
            Ok::<_, RecordError>(id)
        }
        .await;

        let target = result.as_ref().ok().copied();
        self.conclude(requester, AuditAction::RecordCreate, target, result, |_| {
            "created".to_string()
        })
        .await
    }

    /// Persists a record the client already encrypted.
    ///
    /// `wrapped_key` is the base64 record key from the
    /// `x-encrypted-aes-key` header, wrapped with the backend public key.
    /// Every field must decrypt under it before anything is stored.
    pub async fn create_prewrapped(
        &self,
        requester: &Requester,
        record: PrewrappedRecord,
        wrapped_key: &str,
    ) -> RecordResult<RecordId> {
        debug!(role = %requester.role, stage = %Stage::Authorizing, "create pre-wrapped record");
        let result = async {
            authorize(requester, Operation::Create)?;
            let wrapped = WrappedKey::from_base64(wrapped_key).map_err(|source| {
                RecordError::Failed {
                    stage: Stage::KeyPreparing,
                    source,
                }
            })?;

            let pair = self.keys.current();
            let now = Utc::now();
            let id = Uuid::now_v7();
            let metadata = RecordMetadata {
                patient: record.patient,
                assigned_provider: record.assigned_provider,
                created_by: requester.id.clone(),
                visit_date: record.visit_date.unwrap_or(now),
                created_at: now,
                updated_at: now,
            };
            let sealed = SealedRecord::<Storage>::from_parts(id, metadata, record.fields, wrapped);

            // The opened plaintext is discarded; only the checks matter.
            let opened = open_stored(sealed.clone(), &pair, &self.fields)?;
            check_resealable(&opened)?;
            self.store.insert(sealed).await?;

            info!(
                record = %id,
                role = %requester.role,
                fingerprint = pair.fingerprint(),
                "created pre-wrapped record"
            );
            Ok::<_, RecordError>(id)
        }
        .await;

        let target = result.as_ref().ok().copied();
        self.conclude(requester, AuditAction::RecordCreate, target, result, |_| {
            "created pre-wrapped".to_string()
        })
        .await
    }

    /// Reads one record, re-sealed for the requester's registered key.
    pub async fn read_record(
        &self,
        requester: &Requester,
        id: RecordId,
        requester_key: &RequesterPublicKey,
    ) -> RecordResult<SealedRecord<Transport>> {
        debug!(
            record = %id,
            role = %requester.role,
            stage = %Stage::Authorizing,
            "read record"
        );
        let result = async {
            let stored = self
                .store
                .get(id)
                .await?
                .ok_or(RecordError::NotFound(id))?;
            let resource = stored.metadata().resource();
            authorize(requester, Operation::ViewById { resource: &resource })?;

            let pair = self.keys.current();
            let opened = open_stored(stored, &pair, &self.fields)?;
            reseal_for_transport(opened, requester_key)
        }
        .await;

        self.conclude(requester, AuditAction::RecordRead, Some(id), result, |_| {
            format!("sealed for {}", requester_key.fingerprint())
        })
        .await
    }

    /// Lists the records the requester may see: everything for managers,
    /// the assigned subset for providers. Patients use
    /// [`list_own_records`](Self::list_own_records).
    pub async fn list_records(
        &self,
        requester: &Requester,
        requester_key: &RequesterPublicKey,
    ) -> RecordResult<Vec<SealedRecord<Transport>>> {
        debug!(role = %requester.role, stage = %Stage::Authorizing, "list records");
        let result = async {
            let scope = listing_scope(requester)?;
            let visible: Vec<_> = self
                .store
                .list()
                .await?
                .into_iter()
                .filter(|record| scope.includes(&record.metadata().resource()))
                .collect();

            let pair = self.keys.current();
            reseal_all(visible, &pair, &self.fields, requester_key)
        }
        .await;

        self.conclude(requester, AuditAction::RecordList, None, result, |records| {
            format!("{} records", records.len())
        })
        .await
    }

    /// Lists a patient's own records.
    pub async fn list_own_records(
        &self,
        requester: &Requester,
        requester_key: &RequesterPublicKey,
    ) -> RecordResult<Vec<SealedRecord<Transport>>> {
        debug!(role = %requester.role, stage = %Stage::Authorizing, "list own records");
        let result = async {
            authorize(
                requester,
                Operation::ViewOwn {
                    owner: &requester.id,
                },
            )?;
            let own = self.store.list_by_patient(&requester.id).await?;

            let pair = self.keys.current();
            reseal_all(own, &pair, &self.fields, requester_key)
        }
        .await;

        self.conclude(requester, AuditAction::RecordList, None, result, |records| {
            format!("{} own records", records.len())
        })
        .await
    }

    /// Logs and audits the outcome of an operation, then hands it back.
    async fn conclude<T>(
        &self,
        requester: &Requester,
        action: AuditAction,
        target: Option<RecordId>,
        result: RecordResult<T>,
        describe: impl FnOnce(&T) -> String,
    ) -> RecordResult<T> {
        let (decision, details) = match &result {
            Ok(value) => {
                debug!(%action, role = %requester.role, stage = %Stage::Done, "record stage");
                (AuditDecision::Allowed, describe(value))
            }
            Err(RecordError::AccessDenied(denied)) => {
                warn!(%action, role = %requester.role, "{denied}");
                (AuditDecision::Denied, denied.to_string())
            }
            Err(err) => {
                let summary = failure_summary(err);
                warn!(%action, role = %requester.role, stage = ?err.stage(), "{summary}");
                (AuditDecision::Failed, summary)
            }
        };

        let mut event = AuditEvent::new(action, decision)
            .with_actor(requester)
            .with_details(details);
        if let Some(id) = target {
            event = event.with_target(RECORD_TARGET, id.to_string());
        }
        self.audit.record(event).await;
        result
    }
}
