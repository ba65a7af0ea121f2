//! Event System
//!
//! Pub/sub bus the resolvers and the scheduler report progress on.

use parking_lot::RwLock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Events emitted while resolving, ordering and running
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Direct dependencies of a node were resolved
    DepsResolved { node: String, count: usize },
    /// A dependency source failed for one node
    DepsFailed { node: String, error: String },
    /// An ordering pass finished
    OrderComputed { nodes: usize },
    /// A cycle was broken by dropping a back-edge
    CycleBroken { path: Vec<String> },
    /// A scheduled task started
    TaskStarted { name: String },
    /// A scheduled task finished successfully
    TaskFinished { name: String, duration_secs: f64 },
    /// A scheduled task failed
    TaskFailed { name: String, error: String },
    /// A task was not run because a dependency failed or the run was
    /// cancelled
    TaskSkipped { name: String },
    /// An output file was written (or left untouched when unchanged)
    OutputWritten { path: std::path::PathBuf, changed: bool },
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain everything received so far
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<Event>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers.
    ///
    /// Subscribers whose receiving end was dropped are forgotten.
    pub fn emit(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());

        let delivered = subscribers.len();
        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of subscribers still listening
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
