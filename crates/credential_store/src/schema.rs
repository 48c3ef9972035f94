use serde::{Deserialize, Serialize};

pub const CREDENTIAL_RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRecordType {
    Credential,
}

/// On-disk shape of a persisted credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialRecord {
    #[serde(rename = "type")]
    pub record_type: CredentialRecordType,
    pub version: u32,
    pub access_token: String,
    pub saved_at: String,
}

impl CredentialRecord {
    #[must_use]
    pub fn v1(access_token: impl Into<String>, saved_at: impl Into<String>) -> Self {
        Self {
            record_type: CredentialRecordType::Credential,
            version: CREDENTIAL_RECORD_VERSION,
            access_token: access_token.into(),
            saved_at: saved_at.into(),
        }
    }
}
