//! Shared fixtures for the exchange integration tests
#![allow(dead_code)]

use chrono::Utc;
use common::crypto::SecretKey;
use common::keyring::KeyWrapStore;
use common::ledger::MemoryLedger;
use common::records::{Patient, Provider};
use common::store::{MemoryMetadataStore, MetadataStore};
use common::testkit::MemoryContentNetwork;
use common::wallet::Wallet;

pub const PATIENT_ID: &str = "P1";
pub const PASSPHRASE: &str = "patient passphrase";

/// A patient, a provider with a published key, and every collaborator
pub struct TestEnv {
    pub patient: Wallet,
    pub provider: Wallet,
    pub provider_key: SecretKey,
    pub keyring: KeyWrapStore<MemoryMetadataStore>,
    pub ledger: MemoryLedger,
    pub network: MemoryContentNetwork,
}

pub async fn setup_test_env() -> TestEnv {
    let store = MemoryMetadataStore::new();
    let patient = Wallet::generate();
    let provider = Wallet::generate();
    let provider_key = SecretKey::generate();

    store
        .register_patient(Patient {
            wallet_address: patient.address().clone(),
            patient_id: PATIENT_ID.to_string(),
            name: "Test Patient".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .register_provider(Provider {
            wallet_address: provider.address().clone(),
            hospital_name: "Test Hospital".to_string(),
            encryption_public_key: Some(provider_key.public()),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    TestEnv {
        patient,
        provider,
        provider_key,
        keyring: KeyWrapStore::new(store),
        ledger: MemoryLedger::new(),
        network: MemoryContentNetwork::new(),
    }
}
