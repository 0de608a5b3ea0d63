//! Broker abstraction.
//!
//! The routing engine publishes to named destinations and is indifferent to
//! whether delivery is in-process or relayed to an external broker over a
//! wire protocol. [`InProcessBroker`] is the in-process binding: one
//! broadcast channel per destination, created on first subscription.
//! Delivery is best-effort; publishing to a destination nobody subscribes
//! to delivers to zero recipients.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Maximum destination name length.
pub const MAX_DESTINATION_LENGTH: usize = 256;

/// Default per-destination broadcast capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Invalid destination name.
    #[error("Invalid destination: {0}")]
    InvalidDestination(&'static str),
}

/// Validate a destination name.
///
/// # Errors
///
/// Returns an error message if the destination name is invalid.
pub fn validate_destination(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("destination cannot be empty");
    }
    if name.len() > MAX_DESTINATION_LENGTH {
        return Err("destination too long");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("destination contains invalid characters");
    }
    Ok(())
}

/// A payload delivered to subscribers of a destination.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The destination the payload was published on.
    pub destination: String,
    /// The encoded payload.
    pub payload: Bytes,
}

/// Publish-to-destination interface.
///
/// Implementations must be safe to call concurrently from many
/// connection-handling tasks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a payload to a topic or queue.
    ///
    /// Returns the number of subscribers that received the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination name is invalid.
    async fn publish(&self, destination: &str, payload: Bytes) -> Result<usize, BrokerError>;
}

/// In-process fan-out broker.
pub struct InProcessBroker {
    destinations: DashMap<String, broadcast::Sender<Arc<Delivery>>>,
    capacity: usize,
}

impl InProcessBroker {
    /// Create a broker with the default per-destination capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a broker with a specific per-destination capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            destinations: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to a destination, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination name is invalid.
    pub fn subscribe(
        &self,
        destination: &str,
    ) -> Result<broadcast::Receiver<Arc<Delivery>>, BrokerError> {
        validate_destination(destination).map_err(BrokerError::InvalidDestination)?;

        let sender = self
            .destinations
            .entry(destination.to_string())
            .or_insert_with(|| {
                debug!(destination = %destination, "Creating destination");
                broadcast::channel(self.capacity).0
            });

        Ok(sender.subscribe())
    }

    /// Number of live subscribers on a destination.
    #[must_use]
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.destinations
            .get(destination)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Number of known destinations.
    #[must_use]
    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Drop destinations with no remaining subscribers.
    ///
    /// Returns the number of destinations removed.
    pub fn purge_idle(&self) -> usize {
        let before = self.destinations.len();
        self.destinations.retain(|_, sender| sender.receiver_count() > 0);
        let removed = before - self.destinations.len();
        if removed > 0 {
            debug!(removed, "Purged idle destinations");
        }
        removed
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InProcessBroker {
    async fn publish(&self, destination: &str, payload: Bytes) -> Result<usize, BrokerError> {
        validate_destination(destination).map_err(BrokerError::InvalidDestination)?;

        let Some(sender) = self.destinations.get(destination) else {
            debug!(destination = %destination, "Publish to destination with no subscribers");
            return Ok(0);
        };

        let delivery = Arc::new(Delivery {
            destination: destination.to_string(),
            payload,
        });
        let count = sender.send(delivery).unwrap_or_default();
        trace!(destination = %destination, recipients = count, "Published");
        Ok(count)
    }
}
