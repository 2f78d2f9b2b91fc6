//! Device discovery
//!
//! One-shot sweeps for onboarding ([`Discovery`]) and the periodic
//! background re-discovery task ([`Scout`]).
//!
//! Probes within a sweep always run in sequence: overlapping listen
//! windows on a shared socket would steal each other's responses.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use broadrust_api::ProtocolClient;
use broadrust_types::descriptor::DEFAULT_PORT;
use broadrust_types::{DeviceDescriptor, MacAddr};

use crate::constants::{ALL_NETWORKS, DISCOVERY_INTERVAL, DISCOVERY_TIMEOUT};
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::netif;
use crate::registry::Registry;

/// Where a sweep should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every broadcast domain of the local interfaces.
    AllNetworks,

    /// One specific broadcast domain.
    Broadcast(Ipv4Addr),

    /// A single host, probed with a unicast hello.
    Host(Ipv4Addr),
}

impl Target {
    /// Classify a user-supplied address. No address, or the all-networks
    /// broadcast value, means "sweep everything".
    pub fn from_host(host: Option<Ipv4Addr>) -> Self {
        match host {
            None => Self::AllNetworks,
            Some(addr) if addr == ALL_NETWORKS => Self::AllNetworks,
            Some(addr) if addr.octets()[3] == 255 => Self::Broadcast(addr),
            Some(addr) => Self::Host(addr),
        }
    }
}

/// Result of a successful sweep.
#[derive(Debug)]
pub enum Outcome {
    /// Exactly one device answered; proceed with it directly.
    Single(DeviceDescriptor),

    /// Several devices answered; the caller must disambiguate by host.
    Multiple(Vec<DeviceDescriptor>),
}

/// Merge probe batches, deduplicating by MAC and dropping known ones.
/// First sighting wins; later batches cannot override host or name.
fn merge_batches(
    batches: Vec<Vec<DeviceDescriptor>>,
    known: &HashSet<MacAddr>,
) -> Vec<DeviceDescriptor> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for device in batches.into_iter().flatten() {
        if known.contains(&device.mac) || !seen.insert(device.mac) {
            continue;
        }
        merged.push(device);
    }
    merged
}

/// One-shot discovery used by the setup flow.
pub struct Discovery {
    client: Arc<dyn ProtocolClient>,
    timeout: Duration,
}

impl Discovery {
    pub fn new(client: Arc<dyn ProtocolClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Run one sweep. `known` holds MACs to exclude: devices already
    /// configured or mid-onboarding elsewhere.
    pub async fn sweep(&self, target: Target, known: &HashSet<MacAddr>) -> Result<Outcome> {
        let mut devices = match target {
            Target::Host(host) => {
                // Single-device path: unicast hello, no full discovery.
                let device = self.client.hello(host, DEFAULT_PORT, self.timeout).await?;
                vec![device]
            }
            Target::Broadcast(addr) => self.probe(&[addr], known).await?,
            Target::AllNetworks => {
                let addrs = netif::broadcast_addrs();
                self.probe(&addrs, known).await?
            }
        };

        match devices.len() {
            0 => Err(Error::NoDevicesFound),
            1 => Ok(Outcome::Single(devices.remove(0))),
            _ => Ok(Outcome::Multiple(devices)),
        }
    }

    /// Probe each broadcast address in sequence and merge the results.
    /// A failing probe is recorded but never aborts its siblings; the
    /// last error only surfaces when the whole sweep came up empty.
    pub async fn probe(
        &self,
        addrs: &[Ipv4Addr],
        known: &HashSet<MacAddr>,
    ) -> Result<Vec<DeviceDescriptor>> {
        let mut batches = Vec::new();
        let mut last_err = None;

        for addr in addrs {
            match self.client.discover(*addr, self.timeout).await {
                Ok(devices) => {
                    debug!("probe on {} answered by {} device(s)", addr, devices.len());
                    batches.push(devices);
                }
                Err(err) => {
                    warn!("discovery probe on {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }

        let merged = merge_batches(batches, known);
        if merged.is_empty() {
            if let Some(err) = last_err {
                return Err(err.into());
            }
        }
        Ok(merged)
    }
}

/// Source of broadcast addresses, swappable for tests.
type AddrSource = Box<dyn Fn() -> Vec<Ipv4Addr> + Send>;

/// Background re-discovery task.
///
/// Sweeps all networks on a fixed interval (and on debounced manual
/// refresh), reporting unknown devices and host changes of registered
/// ones to the event bus. Probe failures are logged and swallowed.
pub struct Scout;

/// Running scout task.
pub struct ScoutHandle {
    refresh: Arc<Debouncer>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScoutHandle {
    /// Debounced manual sweep request.
    pub fn request_refresh(&self) {
        self.refresh.request();
    }

    /// The shared refresh trigger, for subsystems (pollers) that nudge
    /// re-discovery when a device goes missing.
    pub fn refresher(&self) -> Arc<Debouncer> {
        Arc::clone(&self.refresh)
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl Scout {
    pub fn spawn(client: Arc<dyn ProtocolClient>, registry: Arc<Registry>, bus: EventBus) -> ScoutHandle {
        Self::spawn_with(
            client,
            registry,
            bus,
            DISCOVERY_INTERVAL,
            DISCOVERY_TIMEOUT,
            Box::new(netif::broadcast_addrs),
        )
    }

    pub fn spawn_with(
        client: Arc<dyn ProtocolClient>,
        registry: Arc<Registry>,
        bus: EventBus,
        interval: Duration,
        timeout: Duration,
        broadcasts: AddrSource,
    ) -> ScoutHandle {
        let refresh = Arc::new(Debouncer::new(timeout));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let refresh_task = Arc::clone(&refresh);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = refresh_task.triggered() => {}
                    _ = shutdown_rx.changed() => break,
                }
                sweep_once(&*client, &registry, &bus, timeout, &broadcasts()).await;
            }
            debug!("discovery scout stopped");
        });

        ScoutHandle {
            refresh,
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn sweep_once(
    client: &dyn ProtocolClient,
    registry: &Registry,
    bus: &EventBus,
    timeout: Duration,
    addrs: &[Ipv4Addr],
) {
    let mut seen = HashSet::new();

    for addr in addrs {
        let devices = match client.discover(*addr, timeout).await {
            Ok(devices) => devices,
            Err(err) => {
                debug!("scout probe on {} failed: {}", addr, err);
                continue;
            }
        };

        for device in devices {
            if !seen.insert(device.mac) {
                continue;
            }
            match registry.get(device.mac) {
                Some(session) if session.host() != device.host => {
                    debug!(
                        "device {} moved from {} to {}",
                        device.mac,
                        session.host(),
                        device.host
                    );
                    bus.publish(Event::HostChanged {
                        mac: device.mac,
                        host: device.host,
                    });
                }
                Some(_) => {}
                None => bus.publish(Event::Discovered(device)),
            }
        }
    }
}
