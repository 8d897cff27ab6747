//! Shared fixtures for record orchestration tests.

#![allow(dead_code)]

use medvault_crypto::{decrypt_field, AsymmetricKeyPair, FieldValue, RSA_KEY_BITS};
use medvault_keys::{KeyStore, RequesterPublicKey};
use medvault_policy::{MemoryAuditSink, Requester, Role};
use medvault_records::{
    EnvelopeOrchestrator, MemoryRecordStore, NewRecord, SealedRecord, SensitiveFields, Transport,
};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// A fresh copy of the backend pair. The RSA work happens once per binary.
pub fn backend_pair() -> AsymmetricKeyPair {
    static PEMS: OnceLock<(String, String)> = OnceLock::new();
    let (private_pem, public_pem) = PEMS.get_or_init(|| {
        let pair = AsymmetricKeyPair::generate(RSA_KEY_BITS).unwrap();
        (
            pair.private_key_pem().to_string(),
            pair.public_key_pem().to_string(),
        )
    });
    AsymmetricKeyPair::from_pem(private_pem, public_pem).unwrap()
}

pub fn requester_pair() -> &'static AsymmetricKeyPair {
    static PAIR: OnceLock<AsymmetricKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| AsymmetricKeyPair::generate(RSA_KEY_BITS).unwrap())
}

pub fn requester_key() -> RequesterPublicKey {
    RequesterPublicKey::parse(requester_pair().public_key_pem()).unwrap()
}

pub struct Harness {
    pub orchestrator: EnvelopeOrchestrator,
    pub keys: Arc<KeyStore>,
    pub store: MemoryRecordStore,
    pub audit: MemoryAuditSink,
}

pub fn harness() -> Harness {
    let keys = Arc::new(KeyStore::in_memory(backend_pair()));
    let store = MemoryRecordStore::new();
    let audit = MemoryAuditSink::new();
    let orchestrator = EnvelopeOrchestrator::new(
        Arc::clone(&keys),
        SensitiveFields::default(),
        Arc::new(store.clone()),
        Arc::new(audit.clone()),
    );
    Harness {
        orchestrator,
        keys,
        store,
        audit,
    }
}

pub fn provider(id: &str) -> Requester {
    Requester::new(id, Role::Provider)
}

pub fn patient(id: &str) -> Requester {
    Requester::new(id, Role::Patient)
}

pub fn asthma_record(patient: &str, provider: &str) -> NewRecord {
    NewRecord::new(patient)
        .assigned_to(provider)
        .with_field("diagnosis", FieldValue::Text("Asthma".to_string()))
        .with_field(
            "notes",
            FieldValue::Text("Use inhaler twice daily".to_string()),
        )
        .with_field(
            "medications",
            FieldValue::List(vec!["Albuterol".to_string(), "Fluticasone".to_string()]),
        )
}

/// What the requester's client does with a transport record.
pub fn open_as_requester(record: &SealedRecord<Transport>) -> BTreeMap<String, String> {
    let key = requester_pair().unwrap(record.encrypted_aes_key()).unwrap();
    record
        .fields()
        .iter()
        .map(|(name, field)| (name.clone(), decrypt_field(field, &key).unwrap()))
        .collect()
}
