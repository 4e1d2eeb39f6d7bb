//! Off-chain metadata records
//!
//! These are what the metadata store persists and what the HTTP API returns,
//! so they serialize in camelCase.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{Iv, PublicKey, WrappedKey};
use crate::wallet::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub wallet_address: Address,
    pub patient_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub wallet_address: Address,
    pub hospital_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_public_key: Option<PublicKey>,
    pub created_at: DateTime<Utc>,
}

/// A file is identified by its content address together with its owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileId {
    pub cid: String,
    pub patient_id: String,
}

impl FileId {
    pub fn new(cid: impl Into<String>, patient_id: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            patient_id: patient_id.into(),
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.cid, self.patient_id)
    }
}

/// What a client submits to register an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub cid: String,
    pub patient_id: String,
    pub file_name: String,
    pub file_type: String,
    pub iv: Iv,
    pub encrypted_key_for_patient: WrappedKey,
    #[serde(default)]
    pub wrapped_keys: BTreeMap<Address, WrappedKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub cid: String,
    pub patient_id: String,
    pub file_name: String,
    pub file_type: String,
    pub iv: Iv,
    pub encrypted_key_for_patient: WrappedKey,
    /// At most one entry per provider, keyed by normalized address
    pub wrapped_keys: BTreeMap<Address, WrappedKey>,
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn from_new(file: NewFile, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            cid: file.cid,
            patient_id: file.patient_id,
            file_name: file.file_name,
            file_type: file.file_type,
            iv: file.iv,
            encrypted_key_for_patient: file.encrypted_key_for_patient,
            wrapped_keys: file.wrapped_keys,
            uploaded_at,
        }
    }

    pub fn id(&self) -> FileId {
        FileId::new(self.cid.clone(), self.patient_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccessRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for AccessRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown access request status: {other}")),
        }
    }
}

/// Unique key of an off-chain access request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestKey {
    pub cid: String,
    pub provider_wallet: Address,
    pub patient_id: String,
}

impl fmt::Display for AccessRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}@{}",
            self.provider_wallet, self.cid, self.patient_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub cid: String,
    pub provider_wallet: Address,
    pub patient_id: String,
    pub status: AccessRequestStatus,
    pub created_at: DateTime<Utc>,
}

impl AccessRequest {
    pub fn key(&self) -> AccessRequestKey {
        AccessRequestKey {
            cid: self.cid.clone(),
            provider_wallet: self.provider_wallet.clone(),
            patient_id: self.patient_id.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{Recipient, Secret};

    #[test]
    fn test_file_record_json_shape() {
        let secret = Secret::generate();
        let record = FileRecord {
            cid: "bafy123".into(),
            patient_id: "P1".into(),
            file_name: "scan.pdf".into(),
            file_type: "application/pdf".into(),
            iv: Iv::generate(),
            encrypted_key_for_patient: WrappedKey::wrap(&secret, Recipient::Passphrase("pw"))
                .unwrap(),
            wrapped_keys: BTreeMap::new(),
            uploaded_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["patientId"], "P1");
        assert!(value["encryptedKeyForPatient"]
            .as_str()
            .unwrap()
            .starts_with("argon2id:"));
        assert!(value["wrappedKeys"].as_object().unwrap().is_empty());

        let parsed: FileRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_status_strings() {
        for status in [
            AccessRequestStatus::Pending,
            AccessRequestStatus::Approved,
            AccessRequestStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<AccessRequestStatus>().unwrap(), status);
        }
        assert!(!AccessRequestStatus::Pending.is_terminal());
        assert!(AccessRequestStatus::Rejected.is_terminal());
    }
}
