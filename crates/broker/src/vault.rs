//! Credential vault.
//!
//! Holds one active credential per provider. Secret material leaves the
//! vault only by being serialised into an outbound request (or into the
//! vault's own store file); every public projection carries a fingerprint
//! instead.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ProxyError;
use crate::persist::{load_json, write_json_atomic};
use crate::registry::{AuthMethod, ProviderConfig};

/// A provider secret. Zeroised on drop; `Debug` shows the fingerprint only.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret. Callers must not log or surface the value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Last four characters of the secret; safe to display.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(****{})", self.fingerprint())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultRecord {
    provider_id: String,
    credential: Credential,
    stored_at: DateTime<Utc>,
    active: bool,
}

/// Public projection of a vault record; never carries the secret.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    pub provider_id: String,
    pub stored_at: DateTime<Utc>,
    pub active: bool,
    pub fingerprint: String,
}

impl VaultEntry {
    fn from_record(record: &VaultRecord) -> Self {
        Self {
            provider_id: record.provider_id.clone(),
            stored_at: record.stored_at,
            active: record.active,
            fingerprint: record.credential.fingerprint(),
        }
    }
}

pub struct CredentialVault {
    path: PathBuf,
    records: Vec<VaultRecord>,
}

impl CredentialVault {
    /// Load the vault file, starting empty when it is missing or corrupt.
    #[must_use]
    pub fn load(path: PathBuf) -> Self {
        let records: Vec<VaultRecord> = load_json(&path).unwrap_or_default();
        Self { path, records }
    }

    /// Upsert the credential for a provider and persist.
    pub fn store(
        &mut self,
        provider_id: &str,
        credential: Credential,
    ) -> Result<VaultEntry, ProxyError> {
        let record = VaultRecord {
            provider_id: provider_id.to_string(),
            credential,
            stored_at: Utc::now(),
            active: true,
        };
        match self
            .records
            .iter_mut()
            .find(|r| r.provider_id == provider_id)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.persist()?;
        tracing::debug!(provider_id, "credential stored");
        // Upsert above guarantees the record exists.
        let entry = self
            .records
            .iter()
            .find(|r| r.provider_id == provider_id)
            .map(VaultEntry::from_record)
            .ok_or_else(|| ProxyError::Persistence("vault record vanished".to_string()))?;
        Ok(entry)
    }

    /// Remove a provider's credential; returns whether one existed.
    pub fn remove(&mut self, provider_id: &str) -> Result<bool, ProxyError> {
        let before = self.records.len();
        self.records.retain(|r| r.provider_id != provider_id);
        let removed = self.records.len() != before;
        if removed {
            self.persist()?;
            tracing::debug!(provider_id, "credential removed");
        }
        Ok(removed)
    }

    /// Public projections of every record; no secret material.
    #[must_use]
    pub fn list(&self) -> Vec<VaultEntry> {
        self.records.iter().map(VaultEntry::from_record).collect()
    }

    /// True only when a record exists and is active.
    #[must_use]
    pub fn has(&self, provider_id: &str) -> bool {
        self.active_record(provider_id).is_some()
    }

    /// Write the provider's credential into the header or query map per
    /// its auth recipe. Body injection is handled by the pipeline through
    /// [`CredentialVault::credential_for_body_injection`].
    pub fn inject_auth(
        &self,
        provider: &ProviderConfig,
        headers: &mut BTreeMap<String, String>,
        query_params: &mut BTreeMap<String, String>,
    ) -> Result<(), ProxyError> {
        let record = self
            .active_record(&provider.id)
            .ok_or_else(|| ProxyError::NoCredential(provider.id.clone()))?;
        let value = format!(
            "{}{}",
            provider.auth_prefix.as_deref().unwrap_or(""),
            record.credential.expose()
        );
        match provider.auth_method {
            AuthMethod::Header => {
                headers.insert(provider.auth_field.clone(), value);
            }
            AuthMethod::Query => {
                query_params.insert(provider.auth_field.clone(), value);
            }
            AuthMethod::Body => {}
        }
        Ok(())
    }

    /// Privileged accessor for body-auth providers. The caller must not
    /// log or surface the returned secret.
    pub fn credential_for_body_injection(&self, provider_id: &str) -> Result<String, ProxyError> {
        self.active_record(provider_id)
            .map(|r| r.credential.expose().to_string())
            .ok_or_else(|| ProxyError::NoCredential(provider_id.to_string()))
    }

    fn active_record(&self, provider_id: &str) -> Option<&VaultRecord> {
        self.records
            .iter()
            .find(|r| r.provider_id == provider_id && r.active)
    }

    fn persist(&self) -> Result<(), ProxyError> {
        write_json_atomic(&self.path, &self.records)
            .map_err(|error| ProxyError::Persistence(error.to_string()))
    }
}
