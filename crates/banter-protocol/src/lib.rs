//! # banter-protocol
//!
//! Wire protocol definitions for the banter chat backend.
//!
//! This crate defines everything a client and server must agree on:
//!
//! - **ChatEvent** - the unified chat record that is persisted and fanned out
//! - **Frame** - the messages exchanged over a connection
//! - **GroupNotice** - tagged group-lifecycle payloads
//! - **destination** - deterministic topic/queue naming
//! - **codec** - MessagePack serialization with length-prefixed framing

pub mod codec;
pub mod destination;
pub mod event;
pub mod frame;

pub use codec::ProtocolError;
pub use event::{ChatEvent, EventId, EventKind, GroupId, GroupNotice, GroupSummary};
pub use frame::Frame;
