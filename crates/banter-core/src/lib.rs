//! # banter-core
//!
//! Core routing and authorization for the banter chat backend.
//!
//! This crate provides the behavioral heart of the system:
//!
//! - **PresenceRegistry** - concurrent set of online identities
//! - **UserDirectory** - registered identities and their online flags
//! - **GroupRegistry** - group entities, membership sets, and their rules
//! - **Broker** - publish-to-topic/queue abstraction with an in-process binding
//! - **RoutingEngine** - validates inbound events, persists them, fans them out
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌───────────────┐     ┌────────────┐
//! │  Session   │────▶│ RoutingEngine │────▶│   Broker   │
//! └────────────┘     └───────┬───────┘     └────────────┘
//!                            │
//!              ┌─────────────┼─────────────┐
//!              ▼             ▼             ▼
//!       ┌───────────┐ ┌────────────┐ ┌──────────┐
//!       │  Presence │ │   Groups   │ │ EventLog │
//!       └───────────┘ └────────────┘ └──────────┘
//! ```
//!
//! Every routing call persists its event before fanning it out, so a history
//! query issued right after a delivery always includes what was delivered.

pub mod broker;
pub mod directory;
pub mod engine;
pub mod group;
pub mod presence;

pub use broker::{Broker, BrokerError, Delivery, InProcessBroker};
pub use directory::{DirectoryError, User, UserDirectory};
pub use engine::{EngineConfig, EngineError, RoutingEngine};
pub use group::{Group, GroupError, GroupRegistry, GroupUpdate, Visibility};
pub use presence::PresenceRegistry;
