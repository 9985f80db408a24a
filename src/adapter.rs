//! # Adapter Contract
//!
//! Every protocol driver implements [`Adapter`]. One instance serves exactly
//! one device connection and moves through the states
//!
//! ```text
//! Uninitialized --init--> Initialized --connect--> Connected
//!                                                   |    ^
//!                                         disconnect|    |connect
//!                                                   v    |
//!                                                 Disconnected
//! ```
//!
//! All methods take `&self`: an implementation serializes its own operations
//! behind an internal lock so that foreground calls and its polling thread
//! never interleave transport I/O.
//!
//! Subscriptions deliver data through a [`DataHandler`]. Handlers run on the
//! adapter's polling thread and delay the next cycle while they execute, so
//! they must not block indefinitely.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult, StatusCode};
use crate::tag::DeviceTag;
use crate::value::DataValue;
use crate::worker::Worker;

/// Tag to value map, iterated in tag order.
pub type TagValues = BTreeMap<DeviceTag, DataValue>;

// ============================================================================
// Contract
// ============================================================================

/// Capability set of a protocol driver.
pub trait Adapter: Send + Sync {
    /// Validate and store configuration. Does not open the transport.
    ///
    /// Fails with `BadConfig` on missing or invalid keys and with
    /// `AlreadyConnected` when the adapter was already initialized.
    fn init(&self, config: &AdapterConfig) -> AdapterResult<()>;

    /// Open the transport. Requires a prior successful `init`.
    fn connect(&self) -> AdapterResult<()>;

    /// Release the transport and stop any active subscription.
    ///
    /// Always succeeds, including when never connected.
    fn disconnect(&self) -> AdapterResult<()>;

    /// Read one value per tag, in input order. The first failing tag aborts
    /// the whole call with that tag's error.
    fn read(&self, tags: &[DeviceTag]) -> AdapterResult<Vec<DataValue>>;

    /// Apply each pair in tag order, stopping at the first failure.
    fn write(&self, values: &TagValues) -> AdapterResult<()>;

    /// Start polling `tags`, replacing any active subscription. The previous
    /// polling loop is joined before the new one starts.
    fn subscribe(&self, tags: &[DeviceTag], handler: Box<dyn DataHandler>) -> AdapterResult<()>;

    /// Stop and join the polling loop. Idempotent.
    fn unsubscribe(&self) -> AdapterResult<()>;

    /// `NotInitialized`, `NotConnected` or `Ok`. No side effects.
    fn status(&self) -> StatusCode;
}

// ============================================================================
// Lifecycle state
// ============================================================================

/// Connection state of an adapter instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdapterState {
    #[default]
    Uninitialized,
    Initialized,
    Connected,
    Disconnected,
}

impl AdapterState {
    pub fn status(self) -> StatusCode {
        match self {
            AdapterState::Uninitialized => StatusCode::NotInitialized,
            AdapterState::Initialized | AdapterState::Disconnected => StatusCode::NotConnected,
            AdapterState::Connected => StatusCode::Ok,
        }
    }

    /// Guard for operations that need an open transport.
    pub fn require_connected(self) -> AdapterResult<()> {
        match self {
            AdapterState::Connected => Ok(()),
            AdapterState::Uninitialized => Err(AdapterError::NotInitialized),
            _ => Err(AdapterError::NotConnected),
        }
    }

    /// Guard for `connect`.
    pub fn require_connectable(self) -> AdapterResult<()> {
        match self {
            AdapterState::Initialized | AdapterState::Disconnected => Ok(()),
            AdapterState::Uninitialized => Err(AdapterError::NotInitialized),
            AdapterState::Connected => Err(AdapterError::AlreadyConnected),
        }
    }
}

// ============================================================================
// Data delivery
// ============================================================================

/// Receiver of subscription payloads.
pub trait DataHandler: Send + 'static {
    fn on_data(&self, values: &TagValues);
}

impl<F> DataHandler for F
where
    F: Fn(&TagValues) + Send + 'static,
{
    fn on_data(&self, values: &TagValues) {
        self(values)
    }
}

/// Forwards every payload into an mpsc channel.
///
/// Payloads are dropped silently once the receiver is gone.
pub struct ChannelHandler {
    sender: Mutex<Sender<TagValues>>,
}

impl ChannelHandler {
    pub fn new(sender: Sender<TagValues>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl DataHandler for ChannelHandler {
    fn on_data(&self, values: &TagValues) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.send(values.clone()).is_err() {
            trace!("subscription receiver dropped");
        }
    }
}

/// One polling cycle: read each tag on its own and keep the successes.
///
/// Per-tag failures are skipped; they are expected in field communication.
pub fn poll_tags<F>(tags: &[DeviceTag], mut read_one: F) -> TagValues
where
    F: FnMut(&DeviceTag) -> AdapterResult<DataValue>,
{
    let mut values = TagValues::new();
    for tag in tags {
        match read_one(tag) {
            Ok(value) => {
                values.insert(tag.clone(), value);
            }
            Err(e) => debug!(tag = %tag, error = %e, "poll read failed"),
        }
    }
    values
}

// ============================================================================
// Subscription slot
// ============================================================================

/// Holds at most one polling loop for an adapter instance.
///
/// The slot lock is held across stop-then-start, so concurrent subscribe
/// calls on one instance serialize and never leave two loops running.
#[derive(Default)]
pub struct Subscription {
    slot: Mutex<Option<Worker>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the current loop, if any, then start `poll` on a new one.
    pub fn replace<F>(&self, name: &str, interval: Duration, poll: F) -> AdapterResult<()>
    where
        F: FnMut() + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut previous) = slot.take() {
            previous.stop();
        }
        let worker = Worker::spawn(name, interval, poll).map_err(|e| {
            tracing::error!(error = %e, "failed to spawn polling thread");
            AdapterError::Error
        })?;
        *slot = Some(worker);
        Ok(())
    }

    /// Join the current loop. Idempotent.
    pub fn clear(&self) {
        let worker = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut worker) = worker {
            worker.stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
