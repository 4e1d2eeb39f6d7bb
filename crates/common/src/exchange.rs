//! Client-side upload and download of records
//!
//! Everything that touches plaintext or an unwrapped key happens here, on
//! the patient's or provider's machine. The metadata service only ever sees
//! ciphertext addresses, nonces and wrapped keys.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

use bytes::Bytes;

use crate::crypto::{
    decrypt, encrypt, PublicKey, Recipient, SecretError, SecretKey, WrappedKey, WrappedKeyError,
};
use crate::content::ContentPublisher;
use crate::fetcher::{FetchError, GatewayFetcher, GatewayTransport};
use crate::keyring::{resolve_for_recipient, wrap_for_recipient};
use crate::records::{FileRecord, NewFile};
use crate::wallet::Address;

#[derive(Debug, thiserror::Error)]
pub enum UploadError<E: Display + Debug> {
    #[error("failed to encrypt file: {0}")]
    Encrypt(#[from] SecretError),
    #[error("failed to publish ciphertext: {0}")]
    Publish(E),
    #[error("failed to wrap file key: {0}")]
    Wrap(#[from] WrappedKeyError),
}

/// Why a record could not be opened
///
/// `AccessDenied` and `Integrity` are deliberately separate: the first means
/// nobody wrapped a key for you, the second means the bytes are wrong.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("access denied: no key has been shared with {0} for this file")]
    AccessDenied(Address),
    #[error("could not unwrap the file key: {0}")]
    Unwrap(#[from] WrappedKeyError),
    #[error(transparent)]
    Retrieval(#[from] FetchError),
    #[error("integrity check failed: the file is corrupted or does not match its key")]
    Integrity,
}

impl From<SecretError> for OpenError {
    fn from(_: SecretError) -> Self {
        OpenError::Integrity
    }
}

/// Metadata a client supplies alongside the plaintext
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub patient_id: &'a str,
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub patient_passphrase: &'a str,
    /// Providers to share with immediately
    pub providers: &'a [(Address, PublicKey)],
}

/// Encrypt, publish and wrap a file, returning what to register
pub async fn prepare_upload<P: ContentPublisher>(
    publisher: &P,
    request: UploadRequest<'_>,
    data: &[u8],
) -> Result<NewFile, UploadError<P::Error>> {
    let sealed = encrypt(data)?;

    let cid = publisher
        .publish(Bytes::from(sealed.ciphertext))
        .await
        .map_err(UploadError::Publish)?;

    let encrypted_key_for_patient = wrap_for_recipient(
        &sealed.secret,
        Recipient::Passphrase(request.patient_passphrase),
    )?;

    let mut wrapped_keys = BTreeMap::new();
    for (provider, public_key) in request.providers {
        let wrapped = wrap_for_recipient(&sealed.secret, Recipient::Key(public_key))?;
        wrapped_keys.insert(provider.clone(), wrapped);
    }

    tracing::info!(
        %cid,
        patient_id = %request.patient_id,
        providers = wrapped_keys.len(),
        "prepared upload"
    );

    Ok(NewFile {
        cid,
        patient_id: request.patient_id.to_string(),
        file_name: request.file_name.to_string(),
        file_type: request.file_type.to_string(),
        iv: sealed.iv,
        encrypted_key_for_patient,
        wrapped_keys,
    })
}

async fn fetch_and_decrypt<T: GatewayTransport>(
    fetcher: &GatewayFetcher<T>,
    file: &FileRecord,
    secret: crate::crypto::Secret,
) -> Result<Vec<u8>, OpenError> {
    let ciphertext = fetcher.fetch(&file.cid).await?;
    let plaintext = decrypt(&ciphertext, &secret, &file.iv).map_err(|e| {
        tracing::error!(cid = %file.cid, error = %e, "downloaded file failed decryption");
        OpenError::from(e)
    })?;
    Ok(plaintext)
}

/// Provider side: unwrap this provider's key, fetch and decrypt
pub async fn open_for_provider<T: GatewayTransport>(
    fetcher: &GatewayFetcher<T>,
    file: &FileRecord,
    provider: &Address,
    provider_key: &SecretKey,
) -> Result<Vec<u8>, OpenError> {
    let wrapped: &WrappedKey = resolve_for_recipient(file, provider)
        .ok_or_else(|| OpenError::AccessDenied(provider.clone()))?;
    let secret = wrapped.unwrap_with_key(provider_key)?;
    fetch_and_decrypt(fetcher, file, secret).await
}

/// Patient side: unwrap the patient's own copy, fetch and decrypt
pub async fn open_for_patient<T: GatewayTransport>(
    fetcher: &GatewayFetcher<T>,
    file: &FileRecord,
    passphrase: &str,
) -> Result<Vec<u8>, OpenError> {
    let secret = file.encrypted_key_for_patient.unwrap_with_passphrase(passphrase)?;
    fetch_and_decrypt(fetcher, file, secret).await
}
