//! Guided onboarding flow
//!
//! A UI-less rendition of the original configuration flow: each step
//! returns a typed [`FlowStep`] telling the caller what to ask the user
//! next. The graph is user → (discover | hello) → auth → (reset |
//! unlock)? → finish.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use broadrust_api::ProtocolClient;
use broadrust_core::{AuthOutcome, Discovery, DeviceSession, Outcome, Target};
use broadrust_types::descriptor::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use broadrust_types::{DeviceDescriptor, DeviceKind, DeviceRecord, MacAddr, RecordStore};

use crate::error::{Error, Result};

/// What the caller should present next.
#[derive(Debug)]
pub enum FlowStep {
    /// Several devices answered; call [`SetupFlow::user`] again with
    /// the chosen device's host.
    SelectDevice(Vec<DeviceDescriptor>),

    /// Authentication was denied. Guide the user to unlock the device
    /// in the vendor app, then call [`SetupFlow::retry_auth`].
    ResetRequired {
        name: String,
        model: String,
        host: Ipv4Addr,
    },

    /// Authorized, but the device is still flagged locked. Offer
    /// [`SetupFlow::unlock`] (or skip it) to avoid later authorization
    /// errors.
    UnlockOffer {
        name: String,
        model: String,
        host: Ipv4Addr,
    },

    /// Ready: call [`SetupFlow::finish`] with the confirmed name.
    ConfirmName { suggested: String },
}

/// One onboarding attempt.
pub struct SetupFlow {
    client: Arc<dyn ProtocolClient>,
    store: RecordStore,
    known: HashSet<MacAddr>,
    timeout: Duration,
    session: Option<DeviceSession>,
}

impl SetupFlow {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        store: RecordStore,
        known: HashSet<MacAddr>,
    ) -> Self {
        Self {
            client,
            store,
            known,
            timeout: DEFAULT_TIMEOUT,
            session: None,
        }
    }

    /// Entry step. No host (or a broadcast address) runs discovery; a
    /// specific host is probed directly with a unicast hello.
    pub async fn user(&mut self, host: Option<Ipv4Addr>, timeout: Option<Duration>) -> Result<FlowStep> {
        self.timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let target = Target::from_host(host);
        let discovery = Discovery::new(Arc::clone(&self.client), self.timeout);

        match discovery.sweep(target, &self.known).await? {
            Outcome::Single(descriptor) => {
                self.set_device(descriptor)?;
                self.auth_step().await
            }
            Outcome::Multiple(devices) => {
                debug!("{} devices found; disambiguation required", devices.len());
                Ok(FlowStep::SelectDevice(devices))
            }
        }
    }

    /// Re-run authentication after the user unlocked the device.
    ///
    /// The device is probed again first: the lock flag of the old
    /// descriptor is stale once the user changed it in the vendor app.
    pub async fn retry_auth(&mut self) -> Result<FlowStep> {
        let session = self.session.take().ok_or(Error::NoDeviceSelected)?;
        let host = session.host();

        let descriptor = match self.client.hello(host, DEFAULT_PORT, self.timeout).await {
            Ok(descriptor) => descriptor,
            Err(err) if err.is_transient() => return Err(Error::NotReady(err)),
            Err(err) => return Err(Error::Setup(err)),
        };
        self.set_device(descriptor)?;
        self.auth_step().await
    }

    /// Accept the unlock offer: clear the device's lock flag.
    pub async fn unlock(&mut self) -> Result<FlowStep> {
        let session = self.session.as_ref().ok_or(Error::NoDeviceSelected)?;
        match session.unlock().await {
            Ok(()) => self.confirm_step(),
            Err(err) if err.is_transient() => Err(Error::NotReady(err)),
            Err(err) => {
                warn!(
                    "failed to unlock the device at {}: {}",
                    session.host(),
                    err
                );
                Err(Error::Setup(err))
            }
        }
    }

    /// Decline the unlock offer and proceed with a locked device.
    pub fn skip_unlock(&self) -> Result<FlowStep> {
        self.confirm_step()
    }

    /// Produce the persisted record under the confirmed name.
    pub fn finish(&self, name: &str) -> Result<DeviceRecord> {
        let session = self.session.as_ref().ok_or(Error::NoDeviceSelected)?;
        let descriptor = session.descriptor();
        Ok(DeviceRecord {
            host: descriptor.host,
            mac: descriptor.mac,
            devtype: descriptor.devtype,
            name: name.to_string(),
            timeout_secs: self.timeout.as_secs(),
            lock: Some(session.is_locked()),
        })
    }

    /// The descriptor of the currently selected device, if any.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.session.as_ref().map(|s| s.descriptor())
    }

    fn set_device(&mut self, mut descriptor: DeviceDescriptor) -> Result<()> {
        // A known MAC reappearing here means the device is configured
        // already; refresh its recorded host/timeout and abort.
        if self.known.contains(&descriptor.mac) {
            self.refresh_known(&descriptor);
            return Err(broadrust_core::Error::AlreadyRegistered(descriptor.mac).into());
        }

        let kind = DeviceKind::from_devtype(descriptor.devtype)?;
        descriptor.timeout = self.timeout;
        debug!(
            "onboarding {} ({} at {})",
            descriptor.name, kind, descriptor.host
        );
        let api = self.client.gen_device(&descriptor).map_err(Error::Setup)?;
        self.session = Some(DeviceSession::new(descriptor, kind, api));
        Ok(())
    }

    fn refresh_known(&self, descriptor: &DeviceDescriptor) {
        let result = self.store.load().and_then(|mut records| {
            if let Some(record) = records.iter_mut().find(|r| r.mac == descriptor.mac) {
                record.host = descriptor.host;
                record.timeout_secs = self.timeout.as_secs();
                self.store.save(&records)?;
            }
            Ok(())
        });
        if let Err(err) = result {
            warn!(
                "could not refresh the record of {}: {}",
                descriptor.mac, err
            );
        }
    }

    async fn auth_step(&mut self) -> Result<FlowStep> {
        let session = self.session.as_ref().ok_or(Error::NoDeviceSelected)?;
        match session.auth().await {
            AuthOutcome::Authorized => {
                if session.is_locked() {
                    let descriptor = session.descriptor();
                    Ok(FlowStep::UnlockOffer {
                        name: descriptor.name.clone(),
                        model: descriptor.model.clone(),
                        host: descriptor.host,
                    })
                } else {
                    self.confirm_step()
                }
            }
            AuthOutcome::Locked { .. } => {
                let descriptor = session.descriptor();
                Ok(FlowStep::ResetRequired {
                    name: descriptor.name.clone(),
                    model: descriptor.model.clone(),
                    host: descriptor.host,
                })
            }
            AuthOutcome::Unreachable(err) => Err(Error::NotReady(err)),
            AuthOutcome::Failed(err) => Err(Error::Setup(err)),
        }
    }

    fn confirm_step(&self) -> Result<FlowStep> {
        let session = self.session.as_ref().ok_or(Error::NoDeviceSelected)?;
        Ok(FlowStep::ConfirmName {
            suggested: session.name().to_string(),
        })
    }
}
