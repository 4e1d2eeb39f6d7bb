mod common;

use std::collections::BTreeMap;

use ::common::crypto::{encrypt, Recipient, SecretKey, WrappedKey};
use ::common::exchange::{
    open_for_patient, open_for_provider, prepare_upload, OpenError, UploadRequest,
};
use ::common::fetcher::FetchError;
use ::common::keyring::resolve_for_recipient;
use ::common::ledger::{ConsentLedger, ConsentReconciler, ConsentStatus};
use ::common::records::{FileId, NewFile};
use ::common::store::MetadataStore;

use crate::common::{setup_test_env, PASSPHRASE, PATIENT_ID};

const GATEWAYS: [&str; 2] = ["gw1.test", "gw2.test"];

#[tokio::test]
async fn test_consent_gated_exchange_end_to_end() {
    let env = setup_test_env().await;
    let reconciler = ConsentReconciler::new(env.ledger.clone());
    let fetcher = env.network.fetcher(&GATEWAYS).unwrap();
    let plaintext = b"MRI report: no abnormalities".to_vec();

    // patient encrypts and pins the ciphertext under a fixed address
    let sealed = encrypt(&plaintext).unwrap();
    env.network.pin("bafy123", sealed.ciphertext.clone());
    env.keyring
        .register_file(NewFile {
            cid: "bafy123".into(),
            patient_id: PATIENT_ID.into(),
            file_name: "mri.txt".into(),
            file_type: "text/plain".into(),
            iv: sealed.iv,
            encrypted_key_for_patient: WrappedKey::wrap(
                &sealed.secret,
                Recipient::Passphrase(PASSPHRASE),
            )
            .unwrap(),
            wrapped_keys: BTreeMap::new(),
        })
        .await
        .unwrap();
    let id = FileId::new("bafy123", PATIENT_ID);

    // provider asks, patient approves on the ledger
    env.ledger
        .request_full_access(&env.provider, env.patient.address())
        .await
        .unwrap();
    assert_eq!(
        reconciler
            .status(env.patient.address(), env.provider.address())
            .await
            .into_value(),
        Some(ConsentStatus::Pending)
    );
    env.ledger
        .grant(&env.patient, env.provider.address())
        .await
        .unwrap();
    assert_eq!(
        reconciler
            .status(env.patient.address(), env.provider.address())
            .await
            .into_value(),
        Some(ConsentStatus::Approved)
    );

    // patient shares the key, provider reads
    env.keyring
        .wrap_for_provider(&id, env.provider.address(), &sealed.secret)
        .await
        .unwrap();
    let file = env.keyring.store().file(&id).await.unwrap().unwrap();
    let opened = open_for_provider(&fetcher, &file, env.provider.address(), &env.provider_key)
        .await
        .unwrap();
    assert_eq!(opened, plaintext);

    // patient revokes on the ledger and in the store
    env.ledger
        .revoke(&env.patient, env.provider.address())
        .await
        .unwrap();
    assert_eq!(
        reconciler
            .status(env.patient.address(), env.provider.address())
            .await
            .into_value(),
        Some(ConsentStatus::Denied)
    );
    let removed = env
        .keyring
        .revoke(PATIENT_ID, env.provider.address())
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let file = env.keyring.store().file(&id).await.unwrap().unwrap();
    assert!(resolve_for_recipient(&file, env.provider.address()).is_none());
    assert!(matches!(
        open_for_provider(&fetcher, &file, env.provider.address(), &env.provider_key).await,
        Err(OpenError::AccessDenied(_))
    ));

    // the patient still reads their own copy
    let own = open_for_patient(&fetcher, &file, PASSPHRASE).await.unwrap();
    assert_eq!(own, plaintext);
}

#[tokio::test]
async fn test_prepare_upload_wraps_for_initial_providers() {
    let env = setup_test_env().await;
    let fetcher = env.network.fetcher(&GATEWAYS).unwrap();
    let providers = vec![(env.provider.address().clone(), env.provider_key.public())];

    let new_file = prepare_upload(
        &env.network,
        UploadRequest {
            patient_id: PATIENT_ID,
            file_name: "labs.csv",
            file_type: "text/csv",
            patient_passphrase: PASSPHRASE,
            providers: &providers,
        },
        b"glucose,5.1",
    )
    .await
    .unwrap();
    assert!(new_file.cid.starts_with("bafk"));

    let record = env.keyring.register_file(new_file).await.unwrap();
    let opened = open_for_provider(&fetcher, &record, env.provider.address(), &env.provider_key)
        .await
        .unwrap();
    assert_eq!(opened, b"glucose,5.1");
}

#[tokio::test]
async fn test_integrity_failure_is_not_access_denial() {
    let env = setup_test_env().await;
    let fetcher = env.network.fetcher(&GATEWAYS).unwrap();
    let providers = vec![(env.provider.address().clone(), env.provider_key.public())];

    let new_file = prepare_upload(
        &env.network,
        UploadRequest {
            patient_id: PATIENT_ID,
            file_name: "scan.dcm",
            file_type: "application/dicom",
            patient_passphrase: PASSPHRASE,
            providers: &providers,
        },
        b"DICM....",
    )
    .await
    .unwrap();
    let record = env.keyring.register_file(new_file).await.unwrap();
    assert!(env.network.corrupt(&record.cid));

    let result =
        open_for_provider(&fetcher, &record, env.provider.address(), &env.provider_key).await;
    assert!(matches!(result, Err(OpenError::Integrity)));

    // a different provider key cannot unwrap at all
    let stranger = SecretKey::generate();
    let result = open_for_provider(&fetcher, &record, env.provider.address(), &stranger).await;
    assert!(matches!(result, Err(OpenError::Unwrap(_))));
}

#[tokio::test]
async fn test_unreachable_content_is_retrieval_failure() {
    let env = setup_test_env().await;
    let fetcher = env.network.fetcher(&GATEWAYS).unwrap();
    let providers = vec![(env.provider.address().clone(), env.provider_key.public())];

    let new_file = prepare_upload(
        &env.network,
        UploadRequest {
            patient_id: PATIENT_ID,
            file_name: "note.txt",
            file_type: "text/plain",
            patient_passphrase: PASSPHRASE,
            providers: &providers,
        },
        b"follow up in 2 weeks",
    )
    .await
    .unwrap();
    let record = env.keyring.register_file(new_file).await.unwrap();

    for host in GATEWAYS {
        env.network.take_down(host);
    }
    let result =
        open_for_provider(&fetcher, &record, env.provider.address(), &env.provider_key).await;
    assert!(matches!(
        result,
        Err(OpenError::Retrieval(FetchError::RetrievalExhausted { attempts: 2, .. }))
    ));

    env.network.restore("gw2.test");
    let opened = open_for_provider(&fetcher, &record, env.provider.address(), &env.provider_key)
        .await
        .unwrap();
    assert_eq!(opened, b"follow up in 2 weeks");
    assert_eq!(fetcher.preferred_gateway().unwrap().host_str(), Some("gw2.test"));
}
