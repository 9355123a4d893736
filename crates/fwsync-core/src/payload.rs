//! Wire payload model for agent rule-set responses.
//!
//! Agents answer the rule-set fetch with a loosely typed JSON envelope:
//! ports arrive as native integers or numeric strings in `single` mode and
//! as `"start-end"` strings in `multi` mode. This module normalizes each
//! raw rule into a [`RuleTuple`] or rejects it with a [`RuleParseError`].
//! One malformed rule is skipped and counted by the caller; it never fails
//! the agent's whole cycle.

use std::net::Ipv4Addr;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{PortRange, Protocol, RuleAction, RuleTuple};

/// Top-level response envelope from an agent's rule-set endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesEnvelope {
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<RulesData>,
}

/// Payload body carrying the rule list.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesData {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

/// One rule as the agent describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    pub priority: i32,
    pub ip: RawIp,
    pub port: RawPort,
    pub protocol: String,
    /// Action field; the wire calls it `rule`.
    pub rule: String,
}

/// Source address block of a raw rule. `bit` is kept wide and signed so an
/// out-of-range value fails that one rule's normalization instead of the
/// whole envelope decode.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIp {
    pub ipv4_ip: String,
    pub bit: i64,
}

/// Port block of a raw rule. `port` is an integer or a string depending on
/// the agent implementation, so it is kept as a raw JSON value until
/// normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPort {
    pub mode: String,
    pub port: Value,
}

/// Why a single raw rule could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    #[error("port is not a number: {0}")]
    PortNotNumeric(String),
    #[error("port {0} out of range")]
    PortOutOfRange(i64),
    #[error("multi-mode port must be \"start-end\", got {0:?}")]
    BadPortRange(String),
    #[error("port range start {start} must be below end {end}")]
    InvertedPortRange { start: u16, end: u16 },
    #[error("unknown port mode {0:?}")]
    UnknownPortMode(String),
    #[error("invalid source ip {0:?}")]
    BadSourceIp(String),
    #[error("prefix length {0} out of range")]
    BadPrefixLength(i64),
    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),
    #[error("unknown action {0:?}")]
    UnknownAction(String),
}

impl RawRule {
    /// Normalizes this raw rule into the canonical tuple shape.
    ///
    /// # Errors
    ///
    /// Returns [`RuleParseError`] when any field fails to round-trip into
    /// its canonical form; the caller skips and counts the rule.
    pub fn normalize(&self) -> Result<RuleTuple, RuleParseError> {
        let ip: Ipv4Addr = self
            .ip
            .ipv4_ip
            .parse()
            .map_err(|_| RuleParseError::BadSourceIp(self.ip.ipv4_ip.clone()))?;
        let bit = u8::try_from(self.ip.bit)
            .ok()
            .filter(|bit| *bit <= 32)
            .ok_or(RuleParseError::BadPrefixLength(self.ip.bit))?;

        let port = parse_port(&self.port)?;
        let protocol = parse_protocol(&self.protocol)?;
        let action = parse_action(&self.rule)?;

        Ok(RuleTuple { priority: self.priority, ip, bit, protocol, port, action })
    }
}

fn parse_protocol(raw: &str) -> Result<Protocol, RuleParseError> {
    match raw {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        other => Err(RuleParseError::UnknownProtocol(other.to_string())),
    }
}

fn parse_action(raw: &str) -> Result<RuleAction, RuleParseError> {
    match raw {
        "accept" => Ok(RuleAction::Accept),
        "reject" => Ok(RuleAction::Reject),
        other => Err(RuleParseError::UnknownAction(other.to_string())),
    }
}

fn parse_port(raw: &RawPort) -> Result<PortRange, RuleParseError> {
    match raw.mode.as_str() {
        "single" => {
            let port = single_port_value(&raw.port)?;
            Ok(PortRange::single(port))
        }
        "multi" => {
            let Value::String(text) = &raw.port else {
                return Err(RuleParseError::BadPortRange(raw.port.to_string()));
            };
            let Some((start_text, end_text)) = text.split_once('-') else {
                return Err(RuleParseError::BadPortRange(text.clone()));
            };
            let start = numeric_port(start_text)?;
            let end = numeric_port(end_text)?;
            if end <= start {
                return Err(RuleParseError::InvertedPortRange { start, end });
            }
            Ok(PortRange::range(start, end))
        }
        other => Err(RuleParseError::UnknownPortMode(other.to_string())),
    }
}

fn single_port_value(value: &Value) -> Result<u16, RuleParseError> {
    match value {
        Value::Number(number) => {
            let raw = number
                .as_i64()
                .ok_or_else(|| RuleParseError::PortNotNumeric(number.to_string()))?;
            u16::try_from(raw).map_err(|_| RuleParseError::PortOutOfRange(raw))
        }
        Value::String(text) => numeric_port(text),
        other => Err(RuleParseError::PortNotNumeric(other.to_string())),
    }
}

fn numeric_port(text: &str) -> Result<u16, RuleParseError> {
    let raw: i64 = text
        .trim()
        .parse()
        .map_err(|_| RuleParseError::PortNotNumeric(text.to_string()))?;
    u16::try_from(raw).map_err(|_| RuleParseError::PortOutOfRange(raw))
}
