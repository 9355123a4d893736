//! Core domain model for the fwsync policy synchronization engine.
//!
//! This crate defines the shapes shared by every other fwsync crate:
//!
//! - [`Policy`], [`Agent`], and the normalized [`RuleTuple`] that both the
//!   remote payload and stored policies are projected into for comparison
//! - the wire payload model for agent rule-set responses ([`payload`])
//! - the collaborator traits the engine is written against:
//!   [`PolicyStore`], [`OperationLog`], and [`SettingsSource`]
//!
//! The crate is deliberately free of I/O; everything here is plain data
//! plus the trait seams the engine and store crates fill in.

mod model;
pub mod payload;
mod settings;
mod store;

pub use model::{
    Agent, AgentId, NewPolicy, Policy, PolicyId, PolicySource, PortMode, PortRange, Protocol,
    RuleAction, RuleKey, RuleTuple, SYSTEM_ACTOR, SYSTEM_SOURCE_IP,
};
pub use payload::{RuleParseError, RulesEnvelope};
pub use settings::{SettingsSnapshot, SettingsSource};
pub use store::{LogCategory, OperationLog, OperationLogEntry, PolicyStore, StoreError};
