//! Budget wallet.
//!
//! Tracks the total budget and cumulative spend in integer microdollars,
//! gates calls before dispatch, and records actual spend afterwards. All
//! arithmetic saturates rather than wrapping; a saturated wallet shows
//! zero remaining and keeps denying.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::persist::{load_json, write_json_atomic};

/// Snapshot of the wallet; safe to show to the agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub total_budget: u64,
    pub spent: u64,
    pub by_provider: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
}

impl WalletState {
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total_budget.saturating_sub(self.spent)
    }
}

/// Outcome of a pre-call budget check.
#[derive(Clone, Debug)]
pub struct BudgetCheck {
    pub allowed: bool,
    pub estimated_cost: u64,
    pub remaining_after: u64,
    pub reason: Option<String>,
}

pub struct BudgetWallet {
    path: PathBuf,
    state: WalletState,
}

impl BudgetWallet {
    /// Load the wallet file; a missing or corrupt file starts a fresh
    /// wallet with the given budget.
    #[must_use]
    pub fn load(path: PathBuf, starting_budget: u64) -> Self {
        let state = load_json(&path).unwrap_or_else(|| WalletState {
            total_budget: starting_budget,
            spent: 0,
            by_provider: BTreeMap::new(),
            created_at: Utc::now(),
        });
        Self { path, state }
    }

    #[must_use]
    pub fn state(&self) -> &WalletState {
        &self.state
    }

    /// Allow when the estimate fits the remaining budget; an estimate
    /// exactly equal to the remainder passes.
    #[must_use]
    pub fn check_budget(&self, provider_id: &str, estimated_cost: u64) -> BudgetCheck {
        let remaining = self.state.remaining();
        if estimated_cost <= remaining {
            BudgetCheck {
                allowed: true,
                estimated_cost,
                remaining_after: remaining - estimated_cost,
                reason: None,
            }
        } else {
            tracing::debug!(provider_id, estimated_cost, remaining, "budget check denied");
            BudgetCheck {
                allowed: false,
                estimated_cost,
                remaining_after: remaining,
                reason: Some(format!(
                    "estimated cost {estimated_cost} exceeds remaining budget {remaining}"
                )),
            }
        }
    }

    /// Add actual spend for a provider, persist, and return the updated
    /// remaining budget.
    pub fn record_spend(&mut self, provider_id: &str, actual_cost: u64) -> Result<u64, ProxyError> {
        self.state.spent = self.state.spent.saturating_add(actual_cost);
        let entry = self
            .state
            .by_provider
            .entry(provider_id.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(actual_cost);
        self.persist()?;
        tracing::debug!(provider_id, actual_cost, spent = self.state.spent, "spend recorded");
        Ok(self.state.remaining())
    }

    pub fn set_budget(&mut self, total_budget: u64) -> Result<(), ProxyError> {
        self.state.total_budget = total_budget;
        self.persist()
    }

    pub fn reset_spend(&mut self) -> Result<(), ProxyError> {
        self.state.spent = 0;
        self.state.by_provider.clear();
        self.persist()
    }

    fn persist(&self) -> Result<(), ProxyError> {
        write_json_atomic(&self.path, &self.state)
            .map_err(|error| ProxyError::Persistence(error.to_string()))
    }
}
