//! The call pipeline.
//!
//! Orchestrates one brokered call: registry lookup, credential check,
//! cost estimate, budget gate, request composition with auth injection,
//! dispatch, response parsing, cost metering, spend recording, and
//! receipt minting. Any failure aborts the remaining steps; spend and
//! receipt exist only once a response is in hand.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::BrokerConfig;
use crate::dispatch::{HttpCallRequest, HttpDispatcher};
use crate::error::ProxyError;
use crate::ledger::{CallReceipt, ReceiptLedger};
use crate::registry::{AuthMethod, CostUnit, ProviderRegistry, metered_cost};
use crate::vault::CredentialVault;
use crate::wallet::BudgetWallet;

/// One brokered call as named by the agent. Header and query maps are
/// the caller's own; credentials are injected later and never echoed.
#[derive(Debug, Clone)]
pub struct ApiCallRequest {
    pub provider_id: String,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// What the agent gets back: response, metered cost, and the receipt.
#[derive(Debug, Clone)]
pub struct ApiCallResponse {
    pub status: u16,
    pub data: Value,
    pub receipt: CallReceipt,
    pub cost: u64,
    pub remaining_budget: u64,
}

/// Owns the four state-bearing collaborators for a single local consumer.
pub struct CallPipeline {
    registry: ProviderRegistry,
    vault: CredentialVault,
    wallet: BudgetWallet,
    ledger: ReceiptLedger,
    dispatcher: Arc<dyn HttpDispatcher>,
}

impl CallPipeline {
    /// Load all three stores from the configured data directory.
    #[must_use]
    pub fn new(config: &BrokerConfig, dispatcher: Arc<dyn HttpDispatcher>) -> Self {
        Self {
            registry: ProviderRegistry::new(),
            vault: CredentialVault::load(config.vault_path()),
            wallet: BudgetWallet::load(config.wallet_path(), config.starting_budget_microdollars),
            ledger: ReceiptLedger::load(config.receipts_path()),
            dispatcher,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut CredentialVault {
        &mut self.vault
    }

    #[must_use]
    pub fn wallet(&self) -> &BudgetWallet {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut BudgetWallet {
        &mut self.wallet
    }

    #[must_use]
    pub fn ledger(&self) -> &ReceiptLedger {
        &self.ledger
    }

    /// Run one call through the pipeline.
    pub async fn call(&mut self, request: ApiCallRequest) -> Result<ApiCallResponse, ProxyError> {
        let method = request.method.to_uppercase();

        // Resolve provider.
        let provider = self
            .registry
            .get(&request.provider_id)
            .cloned()
            .ok_or_else(|| ProxyError::UnknownProvider(request.provider_id.clone()))?;

        // Credential check before any spend-side effects.
        if !self.vault.has(&provider.id) {
            return Err(ProxyError::NoCredential(provider.id.clone()));
        }

        // Estimate and gate.
        let estimated_cost = self
            .registry
            .estimate_cost(&provider.id, request.body.as_ref());
        let check = self.wallet.check_budget(&provider.id, estimated_cost);
        if !check.allowed {
            return Err(ProxyError::BudgetExceeded(check.reason.unwrap_or_else(
                || format!("estimated cost {estimated_cost} exceeds remaining budget"),
            )));
        }
        tracing::debug!(
            provider_id = %provider.id,
            %method,
            path = %request.path,
            estimated_cost,
            "budget gate passed"
        );

        // Compose: defaults under caller headers, then auth injection.
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.extend(request.headers.clone());
        let mut query_params = request.query_params.clone();
        self.vault
            .inject_auth(&provider, &mut headers, &mut query_params)?;

        let mut body = request.body.clone();
        if provider.auth_method == AuthMethod::Body {
            let credential = self.vault.credential_for_body_injection(&provider.id)?;
            match body.as_mut() {
                Some(Value::Object(map)) => {
                    map.insert(provider.auth_field.clone(), Value::String(credential));
                }
                _ => {
                    return Err(ProxyError::InvalidRequest(format!(
                        "provider {} uses body auth and requires a JSON object body",
                        provider.id
                    )));
                }
            }
        }

        let url = build_url(&provider.base_url, &request.path, &query_params)?;

        // Dispatch. GET never carries a body.
        let body_bytes = if method == "GET" {
            None
        } else {
            match body.as_ref() {
                Some(value) => Some(serde_json::to_vec(value).map_err(|error| {
                    ProxyError::InvalidRequest(format!("unserialisable body: {error}"))
                })?),
                None => None,
            }
        };
        let response = self
            .dispatcher
            .dispatch(HttpCallRequest {
                method: method.clone(),
                url,
                headers,
                body: body_bytes,
            })
            .await
            .map_err(|error| ProxyError::Network(error.to_string()))?;
        tracing::debug!(provider_id = %provider.id, status = response.status, "response received");

        // Parse: JSON when advertised, raw text otherwise.
        let data = parse_response_body(response.content_type(), &response.body);

        // Meter actual cost; reported usage supersedes the estimate.
        let cost = actual_cost(&data, provider.cost_unit, provider.cost_per_unit)
            .unwrap_or(estimated_cost);

        // Record spend, then mint. Both must complete before returning.
        let remaining_budget = self.wallet.record_spend(&provider.id, cost)?;
        let request_descriptor = json!({
            "method": method,
            "path": request.path,
            "queryParams": request.query_params,
            "bodyHash": if request.body.is_some() { "present" } else { "absent" },
        });
        let receipt = self
            .ledger
            .mint(&provider.id, cost, &request_descriptor, &data)?;

        Ok(ApiCallResponse {
            status: response.status,
            data,
            receipt,
            cost,
            remaining_budget,
        })
    }
}

/// Join base URL and path with exactly one `/`, then append query params.
fn build_url(
    base_url: &str,
    path: &str,
    query_params: &BTreeMap<String, String>,
) -> Result<String, ProxyError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = url::Url::parse(&joined)
        .map_err(|error| ProxyError::InvalidRequest(format!("invalid request URL: {error}")))?;
    if !query_params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query_params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url.to_string())
}

fn parse_response_body(content_type: Option<&str>, body: &[u8]) -> Value {
    let text = || Value::String(String::from_utf8_lossy(body).to_string());
    if content_type.is_some_and(|ct| ct.contains("application/json")) {
        serde_json::from_slice(body).unwrap_or_else(|_| text())
    } else {
        text()
    }
}

/// Usage-reported cost: only when the response carries a numeric
/// `usage.total_tokens` and the provider bills per 1k tokens.
fn actual_cost(data: &Value, cost_unit: CostUnit, cost_per_unit: u64) -> Option<u64> {
    if cost_unit != CostUnit::Per1kTokens {
        return None;
    }
    let total_tokens = data.get("usage")?.get("total_tokens")?.as_u64()?;
    Some(metered_cost(total_tokens, cost_per_unit))
}
