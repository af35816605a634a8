use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const ENV_DATA_DIR: &str = "BUTTERKNIFE_DATA_DIR";
pub const ENV_BUDGET: &str = "BUTTERKNIFE_BUDGET";

pub const VAULT_FILE: &str = "vault.json";
pub const WALLET_FILE: &str = "wallet.json";
pub const RECEIPTS_FILE: &str = "receipts.json";

const DEFAULT_DATA_DIR: &str = ".butterknife";
const DEFAULT_BUDGET_MICRODOLLARS: u64 = 10_000_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid BUTTERKNIFE_BUDGET: {0}")]
    InvalidBudget(String),
}

/// Broker settings: where the three store files live, the budget a fresh
/// wallet starts with, and the outbound HTTP timeout.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub data_dir: PathBuf,
    pub starting_budget_microdollars: u64,
    pub http_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DATA_DIR);
        Self {
            data_dir,
            starting_budget_microdollars: DEFAULT_BUDGET_MICRODOLLARS,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(dir) = env::var(ENV_DATA_DIR) {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                config.data_dir = PathBuf::from(trimmed);
            }
        }
        if let Ok(budget) = env::var(ENV_BUDGET) {
            config.starting_budget_microdollars = budget
                .trim()
                .parse::<u64>()
                .map_err(|error| ConfigError::InvalidBudget(error.to_string()))?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn vault_path(&self) -> PathBuf {
        self.data_dir.join(VAULT_FILE)
    }

    #[must_use]
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join(WALLET_FILE)
    }

    #[must_use]
    pub fn receipts_path(&self) -> PathBuf {
        self.data_dir.join(RECEIPTS_FILE)
    }
}
