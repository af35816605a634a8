//! Provider descriptors and cost estimation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::canonical_json;

/// Where the credential is injected into an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Header,
    Query,
    Body,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Body => "body",
        }
    }
}

/// Unit the provider bills in; drives both estimation and metering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostUnit {
    PerRequest,
    #[serde(rename = "per_1k_tokens")]
    Per1kTokens,
    #[serde(rename = "per_1k_chars")]
    Per1kChars,
}

impl CostUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerRequest => "per_request",
            Self::Per1kTokens => "per_1k_tokens",
            Self::Per1kChars => "per_1k_chars",
        }
    }
}

/// One provider's base URL, auth recipe, and cost model.
///
/// Immutable once registered; re-adding the same id replaces the whole
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub auth_method: AuthMethod,
    pub auth_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_prefix: Option<String>,
    /// Microdollars per billing unit.
    pub cost_per_unit: u64,
    pub cost_unit: CostUnit,
}

/// Registry of provider descriptors: the built-in set first, in a fixed
/// order, then user additions in registration order.
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: builtin_providers(),
        }
    }

    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == provider_id)
    }

    #[must_use]
    pub fn has(&self, provider_id: &str) -> bool {
        self.get(provider_id).is_some()
    }

    #[must_use]
    pub fn list(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Upsert by id. A replaced provider keeps its position in the list.
    pub fn add(&mut self, provider: ProviderConfig) {
        match self.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(existing) => *existing = provider,
            None => self.providers.push(provider),
        }
    }

    /// Pre-call cost estimate in microdollars.
    ///
    /// Token estimation is a crude 4-bytes-per-token proxy over the
    /// canonical JSON form of the body; the actual cost supersedes it
    /// whenever the response reports usage. Unknown providers estimate
    /// to zero and are rejected by the pipeline's provider lookup.
    #[must_use]
    pub fn estimate_cost(&self, provider_id: &str, request_body: Option<&Value>) -> u64 {
        let Some(provider) = self.get(provider_id) else {
            return 0;
        };
        match provider.cost_unit {
            CostUnit::PerRequest => provider.cost_per_unit,
            CostUnit::Per1kTokens => {
                let serialised = canonical_body(request_body);
                let tokens = (serialised.len() as u64).div_ceil(4);
                metered_cost(tokens, provider.cost_per_unit)
            }
            CostUnit::Per1kChars => {
                let serialised = canonical_body(request_body);
                let chars = serialised.chars().count() as u64;
                metered_cost(chars, provider.cost_per_unit)
            }
        }
    }
}

fn canonical_body(body: Option<&Value>) -> String {
    match body {
        Some(value) => canonical_json(value),
        None => canonical_json(&Value::Null),
    }
}

/// `ceil(units / 1000 * cost_per_unit)` in saturating integer arithmetic.
/// Shared by pre-call estimation and usage-reported metering.
#[must_use]
pub fn metered_cost(units: u64, cost_per_unit: u64) -> u64 {
    units.saturating_mul(cost_per_unit).div_ceil(1000)
}

/// The fixed built-in provider set. Ids and auth recipes are stable so
/// existing vault files keep resolving.
fn builtin_providers() -> Vec<ProviderConfig> {
    let bearer = |id: &str, name: &str, base_url: &str, cost_per_unit: u64| ProviderConfig {
        id: id.to_string(),
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth_method: AuthMethod::Header,
        auth_field: "Authorization".to_string(),
        auth_prefix: Some("Bearer ".to_string()),
        cost_per_unit,
        cost_unit: CostUnit::Per1kTokens,
    };

    vec![
        bearer("openai", "OpenAI", "https://api.openai.com/v1", 3000),
        ProviderConfig {
            id: "anthropic".to_string(),
            name: "Anthropic".to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            auth_method: AuthMethod::Header,
            auth_field: "x-api-key".to_string(),
            auth_prefix: None,
            cost_per_unit: 3000,
            cost_unit: CostUnit::Per1kTokens,
        },
        bearer("groq", "Groq", "https://api.groq.com/openai/v1", 100),
        bearer("together", "Together", "https://api.together.xyz/v1", 200),
        bearer(
            "fireworks",
            "Fireworks",
            "https://api.fireworks.ai/inference/v1",
            200,
        ),
        bearer("perplexity", "Perplexity", "https://api.perplexity.ai", 1000),
    ]
}
