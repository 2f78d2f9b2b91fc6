//! Integration events
//!
//! Subsystems publish to an [`EventBus`]; consumers subscribe and get
//! back an explicit [`Subscription`] handle. Handles are collected by
//! their owner and released on teardown, so deregistration is a visible
//! operation rather than a stored closure.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use broadrust_types::{DeviceDescriptor, MacAddr};

/// What the integration reports to its host.
#[derive(Debug, Clone)]
pub enum Event {
    /// A device entered the locked state and needs the user to walk
    /// through re-authentication. Emitted once per lock transition.
    ReauthNeeded {
        mac: MacAddr,
        host: Ipv4Addr,
        name: String,
    },

    /// A device that is not registered yet answered a probe.
    Discovered(DeviceDescriptor),

    /// A registered device reappeared at a different address.
    HostChanged { mac: MacAddr, host: Ipv4Addr },

    /// A registered device's availability changed.
    Availability { mac: MacAddr, available: bool },
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<u64, mpsc::UnboundedSender<Event>>,
}

/// Fan-out of [`Event`]s to any number of subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Keep the handle; its receiver stops getting
    /// events once [`Subscription::unsubscribe`] runs.
    pub fn subscribe(&self) -> (Subscription, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, tx);
        (
            Subscription {
                id,
                bus: Arc::clone(&self.inner),
            },
            rx,
        )
    }

    /// Deliver an event to all live listeners, pruning closed ones.
    pub fn publish(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner
            .listeners
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Handle for one [`EventBus`] listener.
pub struct Subscription {
    id: u64,
    bus: Arc<Mutex<BusInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.bus.lock().listeners.remove(&self.id);
    }
}
