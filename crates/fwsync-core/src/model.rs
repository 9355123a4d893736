//! Policies, agents, and the normalized rule tuple.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Actor name stamped on every engine-originated mutation.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Source address recorded for engine-originated audit entries.
pub const SYSTEM_SOURCE_IP: &str = "127.0.0.1";

/// Identifier of a remote firewall agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a locally stored policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub u64);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport protocol of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Wire spelling of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Enforcement action of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Accept,
    Reject,
}

impl RuleAction {
    /// Wire spelling of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

/// Whether a rule covers one port or a contiguous range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    Single,
    Multi,
}

impl PortMode {
    /// Wire spelling of the port mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multi => "multi",
        }
    }
}

/// A port selector: a single port or an inclusive range.
///
/// Invariant: `mode == Single` implies `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub mode: PortMode,
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Selector for a single port.
    #[must_use]
    pub const fn single(port: u16) -> Self {
        Self { mode: PortMode::Single, start: port, end: port }
    }

    /// Selector for an inclusive range. Callers validate `start < end`.
    #[must_use]
    pub const fn range(start: u16, end: u16) -> Self {
        Self { mode: PortMode::Multi, start, end }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            PortMode::Single => write!(f, "{}", self.start),
            PortMode::Multi => write!(f, "{}-{}", self.start, self.end),
        }
    }
}

/// Where a policy's source selector comes from.
///
/// Manually authored policies reference an entry in the object catalog
/// (`Server`/`General`/`Network`); policies collected from an agent carry
/// the raw address directly (`DirectIp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicySource {
    Server { object_id: u64 },
    General { object_id: u64 },
    Network { object_id: u64 },
    DirectIp { ip: Ipv4Addr, bit: u8 },
}

impl PolicySource {
    /// Returns the direct address pair when this source was agent-collected.
    #[must_use]
    pub const fn direct_ip(&self) -> Option<(Ipv4Addr, u8)> {
        match self {
            Self::DirectIp { ip, bit } => Some((*ip, *bit)),
            _ => None,
        }
    }
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server { object_id } => write!(f, "SERVER#{object_id}"),
            Self::General { object_id } => write!(f, "GENERAL#{object_id}"),
            Self::Network { object_id } => write!(f, "NETWORK#{object_id}"),
            Self::DirectIp { ip, bit } => write!(f, "{ip}/{bit}"),
        }
    }
}

/// A locally stored access policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub agent_id: AgentId,
    /// Enforcement precedence within the owning agent.
    pub priority: i32,
    pub source: PolicySource,
    pub protocol: Protocol,
    pub port: PortRange,
    pub action: RuleAction,
    pub logging: bool,
    /// Lifetime in hours; `None` means unlimited.
    pub time_limit_hours: Option<u32>,
    /// Creation timestamp, immutable once set.
    pub registration_date: DateTime<Utc>,
    pub registrar: String,
    pub requester: Option<String>,
    pub description: Option<String>,
    /// Optimistic-concurrency counter, bumped on every committed write.
    pub version: u64,
}

impl Policy {
    /// Expiry instant derived from registration date and time limit.
    ///
    /// Never stored independently; recomputed from its inputs on demand.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.time_limit_hours
            .map(|hours| self.registration_date + Duration::hours(i64::from(hours)))
    }

    /// True when the policy has a time limit and it elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    /// Reconciliation match key, present only for agent-collected sources.
    #[must_use]
    pub fn rule_key(&self) -> Option<RuleKey> {
        let (ip, bit) = self.source.direct_ip()?;
        Some(RuleKey {
            ip,
            bit,
            protocol: self.protocol,
            port: self.port,
            action: self.action,
        })
    }
}

/// A policy that has not been assigned an id or version yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPolicy {
    pub agent_id: AgentId,
    pub priority: i32,
    pub source: PolicySource,
    pub protocol: Protocol,
    pub port: PortRange,
    pub action: RuleAction,
    pub logging: bool,
    pub time_limit_hours: Option<u32>,
    pub registration_date: DateTime<Utc>,
    pub registrar: String,
    pub requester: Option<String>,
    pub description: Option<String>,
}

impl NewPolicy {
    /// Builds the policy the reconciler creates for a freshly collected rule:
    /// direct-IP source, unlimited lifetime, logging on, system registrar.
    #[must_use]
    pub fn collected(agent_id: AgentId, rule: &RuleTuple, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            priority: rule.priority,
            source: PolicySource::DirectIp { ip: rule.ip, bit: rule.bit },
            protocol: rule.protocol,
            port: rule.port,
            action: rule.action,
            logging: true,
            time_limit_hours: None,
            registration_date: now,
            registrar: SYSTEM_ACTOR.to_string(),
            requester: None,
            description: Some("collected from agent rule set".to_string()),
        }
    }
}

/// A remote firewall agent, read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Network address the rule-set endpoint is reached at (host or IP).
    pub address: String,
    /// Credential presented on every fetch; absent means unauthenticated.
    pub api_key: Option<String>,
    /// Only active agents participate in collection cycles.
    pub active: bool,
}

/// The normalized, in-memory shape of one remote rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleTuple {
    pub priority: i32,
    pub ip: Ipv4Addr,
    pub bit: u8,
    pub protocol: Protocol,
    pub port: PortRange,
    pub action: RuleAction,
}

impl RuleTuple {
    /// Reconciliation match key. Priority is deliberately excluded: it may
    /// drift on the agent without changing the rule's identity.
    #[must_use]
    pub const fn key(&self) -> RuleKey {
        RuleKey {
            ip: self.ip,
            bit: self.bit,
            protocol: self.protocol,
            port: self.port,
            action: self.action,
        }
    }
}

/// Composite natural key used to match fetched rules against stored policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub ip: Ipv4Addr,
    pub bit: u8,
    pub protocol: Protocol,
    pub port: PortRange,
    pub action: RuleAction,
}
