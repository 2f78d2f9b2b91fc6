//! Device session state machine
//!
//! A session owns one device's connection state: authorization
//! (tri-state, so a lock transition can be detected by comparing the
//! previous and new value), lock flag, firmware version, and the
//! bounded re-auth-and-retry policy for command dispatch.
//!
//! State is kept behind a short-lived mutex that is never held across
//! an await point; network calls run first, the state update follows.

use std::future::Future;
use std::net::Ipv4Addr;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error};

use broadrust_api::{ApiError, Command, DeviceApi};
use broadrust_types::{DeviceDescriptor, DeviceKind, MacAddr, PollData};

use crate::events::{Event, EventBus};

/// Authorization state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorized {
    /// No handshake attempted yet
    Unknown,

    /// Last handshake succeeded
    Yes,

    /// Device denied the handshake (locked)
    No,
}

/// Outcome of an authentication attempt.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Handshake succeeded; the session is usable for commands.
    Authorized,

    /// The device denied the handshake. `newly_locked` is set only on
    /// the transition into the locked state, not on repeats.
    Locked { newly_locked: bool },

    /// Timeout or network failure; worth retrying later.
    Unreachable(ApiError),

    /// Unexpected protocol failure; retrying blindly will not help.
    Failed(ApiError),
}

struct State {
    authorized: Authorized,
    locked: bool,
    fw_version: Option<u16>,
}

/// Manages one device's connection lifecycle.
///
/// At most one session exists per MAC at a time; the
/// [`Registry`](crate::Registry) enforces that.
pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    kind: DeviceKind,
    api: Box<dyn DeviceApi>,
    bus: Option<EventBus>,
    state: Mutex<State>,
}

impl DeviceSession {
    pub fn new(descriptor: DeviceDescriptor, kind: DeviceKind, api: Box<dyn DeviceApi>) -> Self {
        let locked = descriptor.is_locked;
        Self {
            descriptor,
            kind,
            api,
            bus: None,
            state: Mutex::new(State {
                authorized: Authorized::Unknown,
                locked,
                fw_version: None,
            }),
        }
    }

    /// Attach the event bus used for lock-transition notifications.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn mac(&self) -> MacAddr {
        self.descriptor.mac
    }

    pub fn host(&self) -> Ipv4Addr {
        self.descriptor.host
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn authorized(&self) -> Authorized {
        self.state.lock().authorized
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn fw_version(&self) -> Option<u16> {
        self.state.lock().fw_version
    }

    /// Attempt the handshake and record the result.
    ///
    /// Entering the locked state publishes one `ReauthNeeded` event per
    /// transition; repeated denials while already locked stay silent.
    pub async fn auth(&self) -> AuthOutcome {
        match self.api.auth().await {
            Ok(()) => {
                self.state.lock().authorized = Authorized::Yes;
                debug!("authenticated to the device at {}", self.host());
                AuthOutcome::Authorized
            }
            Err(ApiError::AuthenticationDenied) => {
                let newly_locked = {
                    let mut state = self.state.lock();
                    let previous = state.authorized;
                    state.authorized = Authorized::No;
                    state.locked = true;
                    previous != Authorized::No
                };
                if newly_locked {
                    error!(
                        "the device at {} is locked for authentication; \
                         unlock it and re-authenticate",
                        self.host()
                    );
                    if let Some(bus) = &self.bus {
                        bus.publish(Event::ReauthNeeded {
                            mac: self.mac(),
                            host: self.host(),
                            name: self.name().to_string(),
                        });
                    }
                }
                AuthOutcome::Locked { newly_locked }
            }
            Err(err) if err.is_transient() => {
                debug!(
                    "failed to authenticate to the device at {}: {}",
                    self.host(),
                    err
                );
                AuthOutcome::Unreachable(err)
            }
            Err(err) => {
                error!(
                    "failed to authenticate to the device at {}: {}",
                    self.host(),
                    err
                );
                AuthOutcome::Failed(err)
            }
        }
    }

    /// Run an operation with the bounded recovery policy: on an
    /// authorization-revoked or connection-closed failure, re-auth once
    /// and retry once. If re-auth fails the original error propagates
    /// unchanged; a failed retry propagates its own error.
    pub async fn request<T, F, Fut>(&self, op: F) -> broadrust_api::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = broadrust_api::Result<T>>,
    {
        match op().await {
            Err(err) if err.requires_reauth() => {
                debug!(
                    "request to the device at {} failed ({}), re-authenticating",
                    self.host(),
                    err
                );
                match self.auth().await {
                    AuthOutcome::Authorized => op().await,
                    _ => Err(err),
                }
            }
            result => result,
        }
    }

    /// Fetch this device's status metrics.
    pub async fn fetch_status(&self) -> broadrust_api::Result<PollData> {
        self.request(|| self.api.fetch_status()).await
    }

    /// Dispatch a command.
    pub async fn send_command(&self, command: Command) -> broadrust_api::Result<Option<Bytes>> {
        self.request(|| self.api.send_command(command.clone()))
            .await
    }

    /// Clear the device's lock flag so authentication is permitted
    /// again.
    pub async fn unlock(&self) -> broadrust_api::Result<()> {
        self.api.set_lock(false).await?;
        self.state.lock().locked = false;
        Ok(())
    }

    /// Fetch and cache the firmware version. Best effort: failures are
    /// logged and ignored.
    pub async fn load_fw_version(&self) {
        match self.request(|| self.api.get_fwversion()).await {
            Ok(version) => self.state.lock().fw_version = Some(version),
            Err(err) => debug!(
                "could not read firmware version from the device at {}: {}",
                self.host(),
                err
            ),
        }
    }
}
