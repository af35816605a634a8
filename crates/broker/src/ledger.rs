//! Hash-chained receipt ledger.
//!
//! Every completed call appends one receipt whose hash covers the call's
//! request and response digests and the previous receipt's hash, so any
//! edit to a hashed field breaks the chain from that point on. The first
//! receipt links to the all-zero genesis hash.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;
use crate::hash::{GENESIS_HASH, canonical_sha256, sha256_hex};
use crate::persist::{load_json, write_json_atomic};

/// One completed call. The schema is fixed; all fields are required.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    pub receipt_id: String,
    pub context_id: String,
    pub provider_id: String,
    pub timestamp: DateTime<Utc>,
    /// Microdollars actually charged for the call.
    pub cost: u64,
    pub request_hash: String,
    pub response_hash: String,
    pub previous_receipt_hash: String,
    pub receipt_hash: String,
}

/// Result of a chain integrity walk.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChainVerification {
    fn valid() -> Self {
        Self {
            valid: true,
            broken_at: None,
            reason: None,
        }
    }

    fn broken(index: usize, reason: &str) -> Self {
        Self {
            valid: false,
            broken_at: Some(index),
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    pub count: u64,
    pub cost: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub total_receipts: usize,
    pub total_cost: u64,
    pub by_provider: BTreeMap<String, ProviderUsage>,
    pub chain_valid: bool,
    pub context_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerFile {
    context_id: String,
    receipts: Vec<CallReceipt>,
}

pub struct ReceiptLedger {
    path: PathBuf,
    context_id: String,
    receipts: Vec<CallReceipt>,
}

impl ReceiptLedger {
    /// Load the ledger file. A missing or corrupt file starts an empty
    /// chain under a freshly generated context id; the id then persists
    /// for the life of the file.
    #[must_use]
    pub fn load(path: PathBuf) -> Self {
        match load_json::<LedgerFile>(&path) {
            Some(file) => Self {
                path,
                context_id: file.context_id,
                receipts: file.receipts,
            },
            None => Self {
                path,
                context_id: uuid::Uuid::new_v4().simple().to_string(),
                receipts: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Append a receipt for a completed call and persist the chain.
    ///
    /// The request descriptor must already be credential-free; both it
    /// and the response body are hashed in canonical JSON form.
    pub fn mint(
        &mut self,
        provider_id: &str,
        cost: u64,
        request_descriptor: &Value,
        response_body: &Value,
    ) -> Result<CallReceipt, ProxyError> {
        let receipt_id = uuid::Uuid::new_v4().simple().to_string();
        let request_hash = canonical_sha256(request_descriptor);
        let response_hash = canonical_sha256(response_body);
        let previous_receipt_hash = self
            .receipts
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |r| r.receipt_hash.clone());
        let receipt_hash = chain_hash(
            &receipt_id,
            &self.context_id,
            &request_hash,
            &response_hash,
            &previous_receipt_hash,
        );

        let receipt = CallReceipt {
            receipt_id,
            context_id: self.context_id.clone(),
            provider_id: provider_id.to_string(),
            timestamp: Utc::now(),
            cost,
            request_hash,
            response_hash,
            previous_receipt_hash,
            receipt_hash,
        };
        self.receipts.push(receipt.clone());
        self.persist()?;
        tracing::debug!(
            provider_id,
            cost,
            receipt_id = %receipt.receipt_id,
            chain_len = self.receipts.len(),
            "receipt minted"
        );
        Ok(receipt)
    }

    #[must_use]
    pub fn chain(&self) -> &[CallReceipt] {
        &self.receipts
    }

    /// Tail of the chain; the whole chain when it is shorter than `n`.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[CallReceipt] {
        let start = self.receipts.len().saturating_sub(n);
        &self.receipts[start..]
    }

    /// Walk the chain: each receipt must link to its predecessor's hash
    /// (genesis at index 0) and its own hash must recompute. Reports the
    /// first failing index.
    #[must_use]
    pub fn verify(&self) -> ChainVerification {
        let mut previous = GENESIS_HASH.to_string();
        for (index, receipt) in self.receipts.iter().enumerate() {
            if receipt.previous_receipt_hash != previous {
                return ChainVerification::broken(index, "previous hash mismatch");
            }
            let recomputed = chain_hash(
                &receipt.receipt_id,
                &receipt.context_id,
                &receipt.request_hash,
                &receipt.response_hash,
                &receipt.previous_receipt_hash,
            );
            if recomputed != receipt.receipt_hash {
                return ChainVerification::broken(index, "hash mismatch");
            }
            previous = receipt.receipt_hash.clone();
        }
        ChainVerification::valid()
    }

    #[must_use]
    pub fn summary(&self) -> LedgerSummary {
        let mut by_provider: BTreeMap<String, ProviderUsage> = BTreeMap::new();
        let mut total_cost: u64 = 0;
        for receipt in &self.receipts {
            let usage = by_provider.entry(receipt.provider_id.clone()).or_default();
            usage.count += 1;
            usage.cost = usage.cost.saturating_add(receipt.cost);
            total_cost = total_cost.saturating_add(receipt.cost);
        }
        LedgerSummary {
            total_receipts: self.receipts.len(),
            total_cost,
            by_provider,
            chain_valid: self.verify().valid,
            context_id: self.context_id.clone(),
        }
    }

    fn persist(&self) -> Result<(), ProxyError> {
        let file = LedgerFile {
            context_id: self.context_id.clone(),
            receipts: self.receipts.clone(),
        };
        write_json_atomic(&self.path, &file)
            .map_err(|error| ProxyError::Persistence(error.to_string()))
    }
}

/// The chained receipt hash: the five components joined by a literal
/// two-character `||` separator, UTF-8, SHA-256.
fn chain_hash(
    receipt_id: &str,
    context_id: &str,
    request_hash: &str,
    response_hash: &str,
    previous_receipt_hash: &str,
) -> String {
    sha256_hex(&format!(
        "{receipt_id}||{context_id}||{request_hash}||{response_hash}||{previous_receipt_hash}"
    ))
}
