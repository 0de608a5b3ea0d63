//! # banter-store
//!
//! The durable chat event log: an append/query service interface plus an
//! in-memory reference implementation.
//!
//! The log exclusively owns persisted [`ChatEvent`]s. It is append-only
//! except for the single permitted in-place content edit of a chat message
//! and requester-authorized deletion; the *authorization* for both lives in
//! the routing engine, which treats this crate as a dumb storage service.
//!
//! [`ChatEvent`]: banter_protocol::ChatEvent

pub mod log;
pub mod memory;

pub use log::{EventLog, LogError};
pub use memory::MemoryLog;
