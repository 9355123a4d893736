//! The agent HTTP client.

use std::time::Duration;

use fwsync_core::{Agent, RuleTuple, RulesEnvelope};
use tracing::warn;

use crate::error::FetchError;

/// Fixed path of the rule-set endpoint on every agent.
pub const RULES_PATH: &str = "/api/v1/firewall/rules";

/// Header carrying the agent credential.
const API_KEY_HEADER: &str = "X-API-Key";

/// Upper bound on error-body text carried into log messages.
const ERROR_BODY_LIMIT: usize = 256;

/// Timeouts and identification for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Total request timeout, connect included.
    pub request_timeout: Duration,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            user_agent: "fwsync/0.1".to_string(),
        }
    }
}

/// A successfully fetched, normalized rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRules {
    /// Normalized rules in the order the agent delivered them.
    pub rules: Vec<RuleTuple>,
    /// Count of malformed rules skipped during normalization.
    pub skipped: usize,
}

/// Client for the agents' rule-set endpoint.
///
/// One instance is shared across the whole cycle; `reqwest::Client` pools
/// connections internally. Retry policy belongs to the caller.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    /// Builds the client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error when the TLS backend cannot be
    /// initialized.
    pub fn new(config: &AgentClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http })
    }

    /// Fetches and normalizes one agent's current rule set.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, credential rejection,
    /// an undecodable body, or a `success:false` envelope. Individual
    /// malformed rules are skipped and counted, not fatal.
    pub async fn fetch_rules(
        &self,
        agent: &Agent,
        port: u16,
    ) -> Result<FetchedRules, FetchError> {
        let url = format!("http://{}:{}{}", agent.address, port, RULES_PATH);

        let mut request = self.http.get(&url);
        if let Some(api_key) = agent.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchError::AuthenticationRejected { status: status.as_u16() });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Application {
                code: status.as_u16().to_string(),
                message: truncate(&body),
            });
        }

        let envelope: RulesEnvelope = response
            .json()
            .await
            .map_err(|err| FetchError::MalformedResponse(err.to_string()))?;

        if !envelope.success {
            return Err(FetchError::Application {
                code: envelope.code.unwrap_or_default(),
                message: envelope.message.unwrap_or_default(),
            });
        }

        let raw_rules = envelope.data.map(|data| data.rules).unwrap_or_default();
        let mut rules = Vec::with_capacity(raw_rules.len());
        let mut skipped = 0usize;
        for raw in &raw_rules {
            match raw.normalize() {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    warn!(
                        agent = %agent.name,
                        agent_id = %agent.id,
                        priority = raw.priority,
                        error = %err,
                        "skipping malformed rule"
                    );
                    skipped += 1;
                }
            }
        }

        Ok(FetchedRules { rules, skipped })
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    }
}
