//! TOML configuration for the daemon.
//!
//! One file declares the agent inventory, the engine cadence, and the HTTP
//! client timeouts. Cadence values land in a [`SettingsHandle`] so they
//! stay adjustable at runtime; the inventory seeds the store at startup.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use fwsync_client::AgentClientConfig;
use fwsync_core::{Agent, AgentId, SettingsSnapshot};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsConfig {
    #[serde(default = "default_collection_interval_secs")]
    pub collection_interval_secs: u64,
    #[serde(default = "default_expiry_interval_secs")]
    pub expiry_interval_secs: u64,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
    #[serde(default = "default_cycle_deadline_secs")]
    pub cycle_deadline_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// One managed firewall agent.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub id: u64,
    pub name: String,
    /// Host or IPv4 address; the port comes from `settings.agent_port`.
    pub address: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_collection_interval_secs() -> u64 {
    300
}
fn default_expiry_interval_secs() -> u64 {
    3600
}
fn default_concurrency_limit() -> usize {
    10
}
fn default_agent_port() -> u16 {
    8080
}
fn default_cycle_deadline_secs() -> u64 {
    1800
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_true() -> bool {
    true
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: default_collection_interval_secs(),
            expiry_interval_secs: default_expiry_interval_secs(),
            concurrency_limit: default_concurrency_limit(),
            agent_port: default_agent_port(),
            cycle_deadline_secs: default_cycle_deadline_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Reads and parses the config file.
    ///
    /// # Errors
    ///
    /// Fails when the file is unreadable or not valid TOML for this schema.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    #[must_use]
    pub fn settings_snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            collection_interval: Duration::from_secs(self.settings.collection_interval_secs),
            expiry_interval: Duration::from_secs(self.settings.expiry_interval_secs),
            concurrency_limit: self.settings.concurrency_limit,
            agent_port: self.settings.agent_port,
            cycle_deadline: Duration::from_secs(self.settings.cycle_deadline_secs),
        }
    }

    #[must_use]
    pub fn client_config(&self) -> AgentClientConfig {
        AgentClientConfig {
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.client.request_timeout_secs),
            ..AgentClientConfig::default()
        }
    }

    #[must_use]
    pub fn agent_inventory(&self) -> Vec<Agent> {
        self.agents
            .iter()
            .map(|agent| Agent {
                id: AgentId(agent.id),
                name: agent.name.clone(),
                address: agent.address.clone(),
                api_key: agent.api_key.clone(),
                active: agent.active,
            })
            .collect()
    }
}
