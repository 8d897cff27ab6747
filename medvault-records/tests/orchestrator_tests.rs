mod support;

use base64::Engine;
use medvault_crypto::{encrypt_field, wrap_key, CryptoError, SymmetricKey};
use medvault_policy::{AuditAction, AuditDecision, Requester, Role};
use medvault_records::{PrewrappedRecord, RecordError, RecordStore, Stage};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{
    asthma_record, backend_pair, harness, open_as_requester, patient, provider, requester_key,
    requester_pair,
};
use uuid::Uuid;

// ── End to end ──────────────────────────────────────────────────

#[tokio::test]
async fn provider_creates_and_patient_reads_asthma_record() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    // At rest: ciphertext only, key wrapped for the backend.
    let stored = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.metadata().created_by.as_str(), "prov-1");
    let stored_json = serde_json::to_string(&stored).unwrap();
    for plaintext in ["Asthma", "inhaler", "Albuterol"] {
        assert!(!stored_json.contains(plaintext), "{plaintext} stored in clear");
    }
    assert!(h.keys.current().unwrap(stored.encrypted_aes_key()).is_ok());

    // In transit: fresh key, wrapped for the requester only.
    let transport = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap();
    let opened = open_as_requester(&transport);

    assert_eq!(opened["diagnosis"], "Asthma");
    assert_eq!(opened["notes"], "Use inhaler twice daily");
    assert_eq!(opened["medications"], r#"["Albuterol","Fluticasone"]"#);
    assert_eq!(transport.metadata(), stored.metadata());
    assert_ne!(transport.field("diagnosis"), stored.field("diagnosis"));

    let err = h
        .keys
        .current()
        .unwrap(transport.encrypted_aes_key())
        .unwrap_err();
    assert!(matches!(err, CryptoError::UnwrapFailed));
}

#[tokio::test]
async fn each_read_uses_a_new_record_key() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    let first = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap();

    assert_ne!(first.encrypted_aes_key(), second.encrypted_aes_key());
    assert_ne!(first.field("notes"), second.field("notes"));
    assert_eq!(open_as_requester(&first), open_as_requester(&second));
}

#[tokio::test]
async fn manager_and_assigned_provider_can_read() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    for requester in [provider("prov-1"), Requester::new("mgr", Role::Manager)] {
        let record = h
            .orchestrator
            .read_record(&requester, id, &requester_key())
            .await
            .unwrap();
        assert_eq!(open_as_requester(&record)["diagnosis"], "Asthma");
    }
}

// ── Denials ─────────────────────────────────────────────────────

#[tokio::test]
async fn denied_create_touches_nothing() {
    let h = harness();
    for role in [Role::Patient, Role::Employee, Role::Admin] {
        let err = h
            .orchestrator
            .create_record(&Requester::new("u", role), asthma_record("pat-1", "prov-1"))
            .await
            .unwrap_err();
        assert!(err.is_denied(), "{role}: {err}");
    }

    assert!(h.store.is_empty().await);
    let events = h.audit.events_for(AuditAction::RecordCreate).await;
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.decision == AuditDecision::Denied));
}

#[tokio::test]
async fn denied_reads_for_unrelated_requesters() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    let outsiders = [
        patient("pat-2"),
        provider("prov-2"),
        Requester::new("emp", Role::Employee),
        Requester::new("adm", Role::Admin),
    ];
    for requester in outsiders {
        let err = h
            .orchestrator
            .read_record(&requester, id, &requester_key())
            .await
            .unwrap_err();
        assert!(err.is_denied(), "{}: {err}", requester.role);
    }

    let denied = h.audit.events_for(AuditAction::RecordRead).await;
    assert_eq!(denied.len(), 4);
    assert!(denied.iter().all(|e| e.decision == AuditDecision::Denied));
    assert!(denied.iter().all(|e| e.target_id == Some(id.to_string())));
}

#[tokio::test]
async fn unknown_record_is_not_found() {
    let h = harness();
    let missing = Uuid::now_v7();
    let err = h
        .orchestrator
        .read_record(&patient("pat-1"), missing, &requester_key())
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::NotFound(id) if id == missing));
}

// ── Failures ────────────────────────────────────────────────────

#[tokio::test]
async fn rotation_strands_records_sealed_before_it() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    h.keys.rotate().unwrap();

    let err = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::KeyPreparing));
    assert!(matches!(
        err,
        RecordError::Failed {
            source: CryptoError::UnwrapFailed,
            ..
        }
    ));

    let failed = h.audit.events_for(AuditAction::RecordRead).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].decision, AuditDecision::Failed);
    assert_eq!(failed[0].details, "failed while preparing the record key");
}

#[tokio::test]
async fn records_created_after_rotation_read_normally() {
    let h = harness();
    h.keys.rotate().unwrap();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();
    let record = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap();
    assert_eq!(open_as_requester(&record)["diagnosis"], "Asthma");
}

#[tokio::test]
async fn one_bad_field_fails_the_whole_read() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    // Swap the diagnosis ciphertext into the list field: it decrypts, but
    // "Asthma" is not a JSON list.
    let stored = h.store.get(id).await.unwrap().unwrap();
    let mut doc = serde_json::to_value(&stored).unwrap();
    let tampered_id = Uuid::now_v7();
    doc["id"] = json!(tampered_id.to_string());
    doc["medications"] = doc["diagnosis"].clone();
    h.store
        .insert(serde_json::from_value(doc).unwrap())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .read_record(&patient("pat-1"), tampered_id, &requester_key())
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::FieldProcessing));
    assert!(matches!(
        err,
        RecordError::Failed {
            source: CryptoError::MalformedPlaintext(_),
            ..
        }
    ));
}

#[tokio::test]
async fn stored_record_missing_a_field_is_rejected() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();

    let stored = h.store.get(id).await.unwrap().unwrap();
    let mut doc = serde_json::to_value(&stored).unwrap();
    let tampered_id = Uuid::now_v7();
    doc["id"] = json!(tampered_id.to_string());
    doc.as_object_mut().unwrap().remove("notes");
    h.store
        .insert(serde_json::from_value(doc).unwrap())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .read_record(&patient("pat-1"), tampered_id, &requester_key())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::Failed {
            stage: Stage::FieldProcessing,
            source: CryptoError::MalformedCiphertext(_),
        }
    ));
}

#[tokio::test]
async fn create_rejects_wrong_field_shapes() {
    let h = harness();
    let record = asthma_record("pat-1", "prov-1").with_field(
        "medications",
        medvault_crypto::FieldValue::Text("Albuterol".to_string()),
    );
    let err = h
        .orchestrator
        .create_record(&provider("prov-1"), record)
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::InvalidInput(_)));

    let empty = asthma_record("pat-1", "prov-1")
        .with_field("notes", medvault_crypto::FieldValue::Text(String::new()));
    let err = h
        .orchestrator
        .create_record(&provider("prov-1"), empty)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::Failed {
            stage: Stage::FieldProcessing,
            source: CryptoError::InvalidInput(_),
        }
    ));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn audit_trail_never_holds_plaintext() {
    let h = harness();
    let id = h
        .orchestrator
        .create_record(&provider("prov-1"), asthma_record("pat-1", "prov-1"))
        .await
        .unwrap();
    h.orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap();
    h.keys.rotate().unwrap();
    let _ = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await;

    let events = h.audit.events().await;
    assert_eq!(events.len(), 3);
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        for secret in ["Asthma", "inhaler", "Albuterol", "PRIVATE KEY"] {
            assert!(!json.contains(secret), "{secret} in {json}");
        }
    }
}

// ── Listing ─────────────────────────────────────────────────────

#[tokio::test]
async fn listing_follows_role_scope() {
    let h = harness();
    let author = provider("prov-1");
    for (pat, prov) in [("pat-1", "prov-1"), ("pat-2", "prov-1"), ("pat-1", "prov-2")] {
        h.orchestrator
            .create_record(&author, asthma_record(pat, prov))
            .await
            .unwrap();
    }
    let key = requester_key();

    let assigned = h.orchestrator.list_records(&provider("prov-1"), &key).await.unwrap();
    assert_eq!(assigned.len(), 2);
    assert!(assigned
        .iter()
        .all(|r| r.metadata().assigned_provider.as_ref().map(|p| p.as_str()) == Some("prov-1")));

    let manager = Requester::new("mgr", Role::Manager);
    assert_eq!(h.orchestrator.list_records(&manager, &key).await.unwrap().len(), 3);

    for requester in [
        patient("pat-1"),
        Requester::new("x", Role::Employee),
        Requester::new("x", Role::Admin),
    ] {
        let err = h
            .orchestrator
            .list_records(&requester, &key)
            .await
            .unwrap_err();
        assert!(err.is_denied());
    }
}

#[tokio::test]
async fn list_own_records_is_patients_only() {
    let h = harness();
    for pat in ["pat-1", "pat-1", "pat-2"] {
        h.orchestrator
            .create_record(&provider("prov-1"), asthma_record(pat, "prov-1"))
            .await
            .unwrap();
    }
    let key = requester_key();

    let own = h.orchestrator.list_own_records(&patient("pat-1"), &key).await.unwrap();
    assert_eq!(own.len(), 2);
    for record in &own {
        assert_eq!(record.metadata().patient.as_str(), "pat-1");
        assert_eq!(open_as_requester(record)["diagnosis"], "Asthma");
    }

    let err = h
        .orchestrator
        .list_own_records(&provider("prov-1"), &key)
        .await
        .unwrap_err();
    assert!(err.is_denied());
}

// ── Pre-wrapped create ──────────────────────────────────────────

fn client_body(key: &SymmetricKey, medications: &str) -> serde_json::Value {
    json!({
        "patient": "pat-1",
        "assignedProvider": "prov-1",
        "diagnosis": encrypt_field("Asthma", key).unwrap().to_string(),
        "notes": encrypt_field("Use inhaler twice daily", key).unwrap().to_string(),
        "medications": encrypt_field(medications, key).unwrap().to_string(),
    })
}

#[tokio::test]
async fn prewrapped_record_is_verified_and_readable() {
    let h = harness();
    let key = SymmetricKey::generate();
    let body = client_body(&key, r#"["Albuterol"]"#);
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();
    let wrapped = wrap_key(&key, &h.keys.public_key_pem()).unwrap();

    let id = h
        .orchestrator
        .create_prewrapped(&provider("prov-1"), record, &wrapped.to_base64())
        .await
        .unwrap();

    let transport = h
        .orchestrator
        .read_record(&patient("pat-1"), id, &requester_key())
        .await
        .unwrap();
    let opened = open_as_requester(&transport);
    assert_eq!(opened["diagnosis"], "Asthma");
    assert_eq!(opened["medications"], r#"["Albuterol"]"#);
}

#[tokio::test]
async fn prewrapped_key_for_the_wrong_pair_is_rejected() {
    let h = harness();
    let key = SymmetricKey::generate();
    let body = client_body(&key, r#"["Albuterol"]"#);
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();
    let wrapped = requester_pair().wrap(&key).unwrap();

    let err = h
        .orchestrator
        .create_prewrapped(&provider("prov-1"), record, &wrapped.to_base64())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::KeyPreparing));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn prewrapped_fields_must_all_decrypt() {
    let h = harness();
    let key = SymmetricKey::generate();
    let body = client_body(&key, "Albuterol");
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();
    let wrapped = wrap_key(&key, backend_pair().public_key_pem()).unwrap();

    let err = h
        .orchestrator
        .create_prewrapped(&provider("prov-1"), record, &wrapped.to_base64())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::FieldProcessing));
    assert!(h.store.is_empty().await);
}

/// Ciphertext of an empty string. `encrypt_field` refuses to produce one,
/// but a client can.
fn encrypted_empty_string(key: &SymmetricKey) -> String {
    use cbc::cipher::block_padding::Pkcs7;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};

    let iv = [7u8; 16];
    let ciphertext = cbc::Encryptor::<aes::Aes256>::new_from_slices(key.as_bytes(), &iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(b"");
    format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
}

#[tokio::test]
async fn prewrapped_empty_field_is_rejected_before_storing() {
    let h = harness();
    let key = SymmetricKey::generate();
    let mut body = client_body(&key, r#"["Albuterol"]"#);
    body["notes"] = json!(encrypted_empty_string(&key));
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();
    let wrapped = wrap_key(&key, backend_pair().public_key_pem()).unwrap();

    let err = h
        .orchestrator
        .create_prewrapped(&provider("prov-1"), record, &wrapped.to_base64())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RecordError::Failed {
            stage: Stage::FieldProcessing,
            source: CryptoError::InvalidInput(_),
        }
    ));
    assert!(h.store.is_empty().await);

    let own = h
        .orchestrator
        .list_own_records(&patient("pat-1"), &requester_key())
        .await
        .unwrap();
    assert!(own.is_empty());
}

#[tokio::test]
async fn prewrapped_header_must_be_base64() {
    let h = harness();
    let key = SymmetricKey::generate();
    let body = client_body(&key, r#"["Albuterol"]"#);
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();

    let err = h
        .orchestrator
        .create_prewrapped(&provider("prov-1"), record, "%%% not base64")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecordError::Failed {
            stage: Stage::KeyPreparing,
            source: CryptoError::UnwrapFailed,
        }
    ));

    let encoded = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();
    let err = h
        .orchestrator
        .create_prewrapped(&provider("prov-1"), record, &encoded)
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::KeyPreparing));
}

#[tokio::test]
async fn prewrapped_create_is_still_authorized() {
    let h = harness();
    let key = SymmetricKey::generate();
    let body = client_body(&key, r#"["Albuterol"]"#);
    let record =
        PrewrappedRecord::from_json(&body, h.orchestrator.sensitive_fields()).unwrap();
    let wrapped = wrap_key(&key, &h.keys.public_key_pem()).unwrap();

    let err = h
        .orchestrator
        .create_prewrapped(&patient("pat-1"), record, &wrapped.to_base64())
        .await
        .unwrap_err();
    assert!(err.is_denied());
}
