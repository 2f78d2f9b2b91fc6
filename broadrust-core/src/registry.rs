//! Session registry
//!
//! One live session per MAC. The registry is an explicit object owned
//! by the application root and handed to the subsystems that need
//! lookup; nothing here is process-global.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

use broadrust_types::MacAddr;

use crate::error::{Error, Result};
use crate::session::DeviceSession;

#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<MacAddr, Arc<DeviceSession>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails if one already exists for the MAC.
    pub fn insert(&self, session: Arc<DeviceSession>) -> Result<()> {
        let mac = session.mac();
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&mac) {
            return Err(Error::AlreadyRegistered(mac));
        }
        sessions.insert(mac, session);
        Ok(())
    }

    /// Remove and return the session for `mac`, if any.
    pub fn remove(&self, mac: MacAddr) -> Option<Arc<DeviceSession>> {
        self.sessions.write().remove(&mac)
    }

    pub fn get(&self, mac: MacAddr) -> Option<Arc<DeviceSession>> {
        self.sessions.read().get(&mac).cloned()
    }

    pub fn contains(&self, mac: MacAddr) -> bool {
        self.sessions.read().contains_key(&mac)
    }

    /// MACs of every registered session.
    pub fn macs(&self) -> Vec<MacAddr> {
        self.sessions.read().keys().copied().collect()
    }

    /// Hosts of every registered session (watchdog input).
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        self.sessions.read().values().map(|s| s.host()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
