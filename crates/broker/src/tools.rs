//! Inbound tool surface.
//!
//! The tool-protocol front end hands each operation a weakly-typed JSON
//! parameter object. This layer validates those parameters into typed
//! pipeline inputs, ignores unknown fields, and answers with either a
//! structured payload or a `{code, message}` error. The agent never sees
//! credential material or chain internals through any of these payloads.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::ProxyError;
use crate::pipeline::{ApiCallRequest, CallPipeline};
use crate::registry::ProviderConfig;
use crate::vault::Credential;

const DEFAULT_RECEIPT_LIMIT: usize = 10;

/// Structured error returned to the tool-protocol front end.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl ToolError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: "INVALID_PARAMS".to_string(),
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL".to_string(),
            message: message.into(),
        }
    }
}

impl From<ProxyError> for ToolError {
    fn from(error: ProxyError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Routes the six named tool operations into the pipeline.
pub struct ToolRouter {
    pipeline: CallPipeline,
}

impl ToolRouter {
    #[must_use]
    pub fn new(pipeline: CallPipeline) -> Self {
        Self { pipeline }
    }

    #[must_use]
    pub fn pipeline(&self) -> &CallPipeline {
        &self.pipeline
    }

    /// Dispatch one tool invocation by name.
    pub async fn handle(&mut self, tool: &str, params: Value) -> Result<Value, ToolError> {
        tracing::debug!(tool, "tool invocation");
        match tool {
            "call_api" => self.call_api(params).await,
            "store_credential" => self.store_credential(&params),
            "list_providers" => self.list_providers(),
            "wallet" => Ok(self.wallet_state()),
            "receipts" => self.receipts(&params),
            "add_provider" => self.add_provider(params),
            _ => Err(ToolError {
                code: "UNKNOWN_TOOL".to_string(),
                message: format!("unknown tool: {tool}"),
            }),
        }
    }

    async fn call_api(&mut self, params: Value) -> Result<Value, ToolError> {
        let provider_id = require_string(&params, "provider")?;
        let path = require_string(&params, "path")?;
        let method = optional_string(&params, "method")?.unwrap_or_else(|| "POST".to_string());
        let headers = optional_string_map(&params, "headers")?;
        let query_params = optional_string_map(&params, "queryParams")?;
        let body = params.get("body").filter(|v| !v.is_null()).cloned();

        let response = self
            .pipeline
            .call(ApiCallRequest {
                provider_id,
                method,
                path,
                headers,
                query_params,
                body,
            })
            .await?;

        Ok(json!({
            "status": response.status,
            "data": response.data,
            "receiptId": response.receipt.receipt_id,
            "cost": response.cost,
            "remainingBudget": response.remaining_budget,
        }))
    }

    fn store_credential(&mut self, params: &Value) -> Result<Value, ToolError> {
        let provider_id = require_string(params, "provider")?;
        let secret = require_string(params, "credential")?;
        let entry = self
            .pipeline
            .vault_mut()
            .store(&provider_id, Credential::new(secret))?;
        serde_json::to_value(entry).map_err(|error| ToolError::internal(error.to_string()))
    }

    fn list_providers(&self) -> Result<Value, ToolError> {
        let mut providers = Vec::new();
        for provider in self.pipeline.registry().list() {
            let mut value = serde_json::to_value(provider)
                .map_err(|error| ToolError::internal(error.to_string()))?;
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "hasCredential".to_string(),
                    Value::Bool(self.pipeline.vault().has(&provider.id)),
                );
            }
            providers.push(value);
        }
        Ok(json!({ "providers": providers }))
    }

    fn wallet_state(&self) -> Value {
        let state = self.pipeline.wallet().state();
        json!({
            "totalBudget": state.total_budget,
            "spent": state.spent,
            "remaining": state.remaining(),
            "byProvider": state.by_provider,
        })
    }

    fn receipts(&self, params: &Value) -> Result<Value, ToolError> {
        let limit = match params.get("limit") {
            None | Some(Value::Null) => DEFAULT_RECEIPT_LIMIT,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ToolError::invalid_params("limit must be a non-negative integer"))?
                as usize,
        };
        let ledger = self.pipeline.ledger();
        let receipts = serde_json::to_value(ledger.recent(limit))
            .map_err(|error| ToolError::internal(error.to_string()))?;
        let summary = serde_json::to_value(ledger.summary())
            .map_err(|error| ToolError::internal(error.to_string()))?;
        Ok(json!({
            "contextId": ledger.context_id(),
            "receipts": receipts,
            "summary": summary,
        }))
    }

    fn add_provider(&mut self, params: Value) -> Result<Value, ToolError> {
        let mut provider: ProviderConfig = serde_json::from_value(params)
            .map_err(|error| ToolError::invalid_params(format!("invalid provider: {error}")))?;
        provider.id = provider.id.trim().to_lowercase();
        if provider.id.is_empty() {
            return Err(ToolError::invalid_params("provider id is required"));
        }
        if provider.base_url.trim().is_empty() {
            return Err(ToolError::invalid_params("provider baseUrl is required"));
        }
        let stored = provider.clone();
        self.pipeline.registry_mut().add(provider);
        serde_json::to_value(stored).map_err(|error| ToolError::internal(error.to_string()))
    }
}

fn require_string(params: &Value, field: &str) -> Result<String, ToolError> {
    match params.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        Some(Value::String(_)) => Err(ToolError::invalid_params(format!(
            "{field} must not be empty"
        ))),
        Some(_) => Err(ToolError::invalid_params(format!(
            "{field} must be a string"
        ))),
        None => Err(ToolError::invalid_params(format!("{field} is required"))),
    }
}

fn optional_string(params: &Value, field: &str) -> Result<Option<String>, ToolError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.trim().to_string())),
        Some(_) => Err(ToolError::invalid_params(format!(
            "{field} must be a string"
        ))),
    }
}

fn optional_string_map(
    params: &Value,
    field: &str,
) -> Result<BTreeMap<String, String>, ToolError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(object)) => string_map(object, field),
        Some(_) => Err(ToolError::invalid_params(format!(
            "{field} must be an object of strings"
        ))),
    }
}

fn string_map(object: &Map<String, Value>, field: &str) -> Result<BTreeMap<String, String>, ToolError> {
    let mut map = BTreeMap::new();
    for (name, value) in object {
        let Value::String(value) = value else {
            return Err(ToolError::invalid_params(format!(
                "{field}.{name} must be a string"
            )));
        };
        map.insert(name.clone(), value.clone());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::ToolRouter;
    use crate::config::BrokerConfig;
    use crate::dispatch::{DispatchError, HttpCallRequest, HttpCallResponse, HttpDispatcher};
    use crate::pipeline::CallPipeline;

    struct NoDispatch;

    #[async_trait]
    impl HttpDispatcher for NoDispatch {
        async fn dispatch(
            &self,
            _request: HttpCallRequest,
        ) -> Result<HttpCallResponse, DispatchError> {
            Err(DispatchError::Transport("no dispatch in this test".to_string()))
        }
    }

    fn temp_router() -> (tempfile::TempDir, ToolRouter) {
        #[allow(clippy::unwrap_used)]
        let dir = tempfile::tempdir().unwrap();
        let config = BrokerConfig {
            data_dir: dir.path().to_path_buf(),
            starting_budget_microdollars: 10_000_000,
            http_timeout: std::time::Duration::from_secs(5),
        };
        let pipeline = CallPipeline::new(&config, Arc::new(NoDispatch));
        (dir, ToolRouter::new(pipeline))
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let (_dir, mut router) = temp_router();
        let error = router.handle("mint_money", json!({})).await.err();
        assert_eq!(error.map(|e| e.code), Some("UNKNOWN_TOOL".to_string()));
    }

    #[tokio::test]
    async fn call_api_requires_provider_and_path() {
        let (_dir, mut router) = temp_router();
        let error = router
            .handle("call_api", json!({"path": "/x"}))
            .await
            .err();
        assert_eq!(error.map(|e| e.code), Some("INVALID_PARAMS".to_string()));
    }

    #[tokio::test]
    async fn store_credential_returns_public_projection() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut router) = temp_router();
        let entry = router
            .handle(
                "store_credential",
                json!({"provider": "openai", "credential": "sk-test-ABCDWXYZ", "extra": "ignored"}),
            )
            .await
            .map_err(|e| e.message)?;
        assert_eq!(entry["fingerprint"], "WXYZ");
        assert_eq!(entry["providerId"], "openai");
        assert!(entry.get("credential").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn list_providers_reports_credential_presence() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut router) = temp_router();
        router
            .handle(
                "store_credential",
                json!({"provider": "openai", "credential": "sk-test-ABCDWXYZ"}),
            )
            .await
            .map_err(|e| e.message)?;
        let listed = router
            .handle("list_providers", json!({}))
            .await
            .map_err(|e| e.message)?;
        let providers = listed["providers"]
            .as_array()
            .ok_or("providers must be an array")?;
        let openai = providers
            .iter()
            .find(|p| p["id"] == "openai")
            .ok_or("openai must be listed")?;
        assert_eq!(openai["hasCredential"], Value::Bool(true));
        let groq = providers
            .iter()
            .find(|p| p["id"] == "groq")
            .ok_or("groq must be listed")?;
        assert_eq!(groq["hasCredential"], Value::Bool(false));
        let rendered = serde_json::to_string(&listed)?;
        assert!(!rendered.contains("sk-test"));
        Ok(())
    }

    #[tokio::test]
    async fn wallet_reports_remaining() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut router) = temp_router();
        let wallet = router
            .handle("wallet", json!({}))
            .await
            .map_err(|e| e.message)?;
        assert_eq!(wallet["totalBudget"], 10_000_000);
        assert_eq!(wallet["spent"], 0);
        assert_eq!(wallet["remaining"], 10_000_000);
        Ok(())
    }

    #[tokio::test]
    async fn add_provider_normalises_and_upserts() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut router) = temp_router();
        let stored = router
            .handle(
                "add_provider",
                json!({
                    "id": "  MyApi ",
                    "name": "My API",
                    "baseUrl": "https://api.my.test",
                    "authMethod": "query",
                    "authField": "key",
                    "costPerUnit": 500,
                    "costUnit": "per_request",
                }),
            )
            .await
            .map_err(|e| e.message)?;
        assert_eq!(stored["id"], "myapi");
        assert!(router.pipeline().registry().has("myapi"));
        Ok(())
    }

    #[tokio::test]
    async fn receipts_defaults_to_recent_ten() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut router) = temp_router();
        let payload = router
            .handle("receipts", json!({}))
            .await
            .map_err(|e| e.message)?;
        assert_eq!(payload["summary"]["totalReceipts"], 0);
        assert_eq!(payload["summary"]["chainValid"], Value::Bool(true));
        assert_eq!(payload["receipts"].as_array().map(Vec::len), Some(0));
        Ok(())
    }
}
