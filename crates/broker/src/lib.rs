//! Local credential broker for agent API access.
//!
//! The broker stands between an untrusted agent and external HTTP APIs:
//! the agent names a provider and a request, the broker resolves the
//! credential from a local vault, gates the call on a spending budget,
//! dispatches it, meters actual cost, and mints a hash-chained receipt.
//! The agent only ever observes the response body, the status, and an
//! opaque receipt identifier.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod persist;
pub mod pipeline;
pub mod registry;
pub mod tools;
pub mod vault;
pub mod wallet;

pub use config::BrokerConfig;
pub use dispatch::{DispatchError, HttpCallRequest, HttpCallResponse, HttpDispatcher, ReqwestDispatcher};
pub use error::ProxyError;
pub use ledger::{CallReceipt, ChainVerification, LedgerSummary, ReceiptLedger};
pub use pipeline::{ApiCallRequest, ApiCallResponse, CallPipeline};
pub use registry::{AuthMethod, CostUnit, ProviderConfig, ProviderRegistry};
pub use tools::{ToolError, ToolRouter};
pub use vault::{Credential, CredentialVault, VaultEntry};
pub use wallet::{BudgetCheck, BudgetWallet, WalletState};
