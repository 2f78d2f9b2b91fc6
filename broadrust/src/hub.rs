//! Application root
//!
//! The [`Hub`] owns the registry, the event bus, the persisted record
//! store and the shared background tasks (discovery scout, watchdog).
//! Per-device setup/unload mirrors the lifecycle contract: setup fails
//! soft ("not ready") on transient errors, hard on authentication
//! denial, and unload is idempotent and waits for task teardown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use broadrust_api::ProtocolClient;
use broadrust_core::poller::{self, PollerHandle};
use broadrust_core::{
    AuthOutcome, Debouncer, DeviceSession, Event, EventBus, Registry, Scout, ScoutHandle,
    Subscription, Watchdog, WatchdogHandle,
};
use broadrust_types::{DeviceKind, DeviceRecord, MacAddr, PollResult, RecordStore};

use crate::error::{Error, Result};
use crate::flow::SetupFlow;

/// Everything a live device carries besides its session.
struct DeviceEntry {
    poller: PollerHandle,
    /// Event subscriptions scoped to this device; released on unload,
    /// before the poller teardown.
    subscriptions: Vec<Subscription>,
}

/// Shared services, started with the first device and stopped with the
/// last.
struct Shared {
    scout: ScoutHandle,
    watchdog: WatchdogHandle,
    record_sync: Subscription,
    record_task: JoinHandle<()>,
}

#[derive(Default)]
struct HubState {
    devices: HashMap<MacAddr, DeviceEntry>,
    shared: Option<Shared>,
}

/// Manages the full set of configured devices.
pub struct Hub {
    client: Arc<dyn ProtocolClient>,
    registry: Arc<Registry>,
    bus: EventBus,
    store: RecordStore,
    inner: Mutex<HubState>,
}

impl Hub {
    pub fn new(client: Arc<dyn ProtocolClient>, store: RecordStore) -> Self {
        Self {
            client,
            registry: Arc::new(Registry::new()),
            bus: EventBus::new(),
            store,
            inner: Mutex::new(HubState::default()),
        }
    }

    /// Start a guided onboarding flow. Already configured and already
    /// registered devices are excluded from its discovery results.
    pub fn flow(&self) -> Result<SetupFlow> {
        let mut known: HashSet<MacAddr> = self.registry.macs().into_iter().collect();
        for record in self.store.load()? {
            known.insert(record.mac);
        }
        Ok(SetupFlow::new(
            Arc::clone(&self.client),
            self.store.clone(),
            known,
        ))
    }

    /// Set up one device from its persisted record.
    ///
    /// Transient network failures surface as [`Error::NotReady`] so the
    /// host can retry later; authentication denial fails setup with
    /// [`Error::Locked`] after emitting one re-authentication event.
    pub async fn setup(&self, record: DeviceRecord) -> Result<()> {
        let mac = record.mac;
        let kind = DeviceKind::from_devtype(record.devtype)?;
        if self.registry.contains(mac) {
            return Err(broadrust_core::Error::AlreadyRegistered(mac).into());
        }

        let descriptor = record.to_descriptor();
        info!(
            "setting up {} ({} at {})",
            descriptor.name, kind, descriptor.host
        );
        let api = self.client.gen_device(&descriptor).map_err(Error::Setup)?;
        let session =
            Arc::new(DeviceSession::new(descriptor, kind, api).with_bus(self.bus.clone()));

        match session.auth().await {
            AuthOutcome::Authorized => {}
            AuthOutcome::Locked { .. } => return Err(Error::Locked),
            AuthOutcome::Unreachable(err) => return Err(Error::NotReady(err)),
            AuthOutcome::Failed(err) => return Err(Error::Setup(err)),
        }

        // The device only counts as ready once one status fetch worked.
        let initial = match session.fetch_status().await {
            Ok(data) => data,
            Err(err) if err.is_transient() => return Err(Error::NotReady(err)),
            Err(err) => return Err(Error::Setup(err)),
        };

        session.load_fw_version().await;

        self.registry.insert(Arc::clone(&session))?;
        let scout_refresh = self.ensure_shared();

        let poller = poller::spawn(
            Arc::clone(&session),
            self.bus.clone(),
            Some(scout_refresh),
            Some(initial),
        );
        self.inner.lock().devices.insert(
            mac,
            DeviceEntry {
                poller,
                subscriptions: Vec::new(),
            },
        );

        self.store.upsert(record)?;
        info!("device {} ready (fw: {:?})", mac, session.fw_version());
        Ok(())
    }

    /// Set up every persisted device, reporting per-device results.
    pub async fn setup_all(&self) -> Vec<(MacAddr, Result<()>)> {
        let records = match self.store.load() {
            Ok(records) => records,
            Err(err) => {
                warn!("could not load device records: {}", err);
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for record in records {
            let mac = record.mac;
            let result = self.setup(record).await;
            if let Err(err) = &result {
                warn!("setup of {} failed ({}): {}", mac, err.code(), err);
            }
            results.push((mac, result));
        }
        results
    }

    /// Tear down one device. Idempotent: a device that never finished
    /// setup, or was already unloaded, unloads successfully. Waits for
    /// the poller task to finish before returning.
    pub async fn unload(&self, mac: MacAddr) -> Result<()> {
        let entry = self.inner.lock().devices.remove(&mac);
        self.registry.remove(mac);

        let Some(entry) = entry else {
            debug!("device {} has no update manager; nothing to unload", mac);
            return Ok(());
        };

        // Listeners first, then the poller teardown is awaited.
        for sub in entry.subscriptions {
            sub.unsubscribe();
        }
        entry.poller.shutdown().await;
        info!("unloaded device {}", mac);

        if self.registry.is_empty() {
            self.stop_shared().await;
        }
        Ok(())
    }

    /// Unload a device and delete its persisted record.
    pub async fn remove(&self, mac: MacAddr) -> Result<()> {
        self.unload(mac).await?;
        self.store.remove(mac)?;
        Ok(())
    }

    /// Rename a device and reload it so the new name reaches the
    /// session and its consumers.
    pub async fn rename(&self, mac: MacAddr, name: &str) -> Result<()> {
        let mut records = self.store.load()?;
        let Some(record) = records.iter_mut().find(|r| r.mac == mac) else {
            return Err(Error::UnknownDevice(mac));
        };
        record.name = name.to_string();
        let updated = record.clone();
        self.store.save(&records)?;

        self.unload(mac).await?;
        self.setup(updated).await
    }

    /// Unload everything and stop the shared tasks.
    pub async fn shutdown(&self) {
        let macs: Vec<MacAddr> = self.inner.lock().devices.keys().copied().collect();
        for mac in macs {
            if let Err(err) = self.unload(mac).await {
                warn!("unload of {} failed: {}", mac, err);
            }
        }
        self.stop_shared().await;
    }

    pub fn device(&self, mac: MacAddr) -> Option<Arc<DeviceSession>> {
        self.registry.get(mac)
    }

    /// Receiver of the device's poll results, if it is set up.
    pub fn poll_results(&self, mac: MacAddr) -> Option<watch::Receiver<PollResult>> {
        self.inner
            .lock()
            .devices
            .get(&mac)
            .map(|entry| entry.poller.subscribe())
    }

    /// Debounced manual refresh. Returns whether the device was set up.
    pub fn request_refresh(&self, mac: MacAddr) -> bool {
        let inner = self.inner.lock();
        match inner.devices.get(&mac) {
            Some(entry) => {
                entry.poller.request_refresh();
                true
            }
            None => false,
        }
    }

    /// Listen for integration events.
    pub fn subscribe(&self) -> (Subscription, mpsc::UnboundedReceiver<Event>) {
        self.bus.subscribe()
    }

    /// Scope an event subscription to a device: it is released when the
    /// device unloads, before its poller teardown.
    pub fn attach_subscription(&self, mac: MacAddr, subscription: Subscription) -> bool {
        let mut inner = self.inner.lock();
        match inner.devices.get_mut(&mac) {
            Some(entry) => {
                entry.subscriptions.push(subscription);
                true
            }
            None => false,
        }
    }

    fn ensure_shared(&self) -> Arc<Debouncer> {
        let mut inner = self.inner.lock();
        if let Some(shared) = &inner.shared {
            return shared.scout.refresher();
        }

        debug!("starting shared discovery and watchdog tasks");
        let scout = Scout::spawn(
            Arc::clone(&self.client),
            Arc::clone(&self.registry),
            self.bus.clone(),
        );
        let watchdog = Watchdog::spawn(Arc::clone(&self.client), Arc::clone(&self.registry));
        let (record_sync, rx) = self.bus.subscribe();
        let record_task = tokio::spawn(sync_records(self.store.clone(), rx));

        let refresher = scout.refresher();
        inner.shared = Some(Shared {
            scout,
            watchdog,
            record_sync,
            record_task,
        });
        refresher
    }

    async fn stop_shared(&self) {
        let shared = self.inner.lock().shared.take();
        if let Some(shared) = shared {
            debug!("stopping shared discovery and watchdog tasks");
            shared.record_sync.unsubscribe();
            shared.scout.shutdown().await;
            shared.watchdog.shutdown().await;
            let _ = shared.record_task.await;
        }
    }
}

/// Keeps persisted records in step with what discovery reports: a known
/// device answering from a new address gets its record host updated, so
/// the next (re)load connects to the right place.
async fn sync_records(store: RecordStore, mut rx: mpsc::UnboundedReceiver<Event>) {
    while let Some(event) = rx.recv().await {
        let Event::HostChanged { mac, host } = event else {
            continue;
        };
        let result = store.load().and_then(|mut records| {
            if let Some(record) = records.iter_mut().find(|r| r.mac == mac) {
                record.host = host;
                store.save(&records)?;
            }
            Ok(())
        });
        match result {
            Ok(()) => debug!("updated record host of {} to {}", mac, host),
            Err(err) => warn!("could not update record host of {}: {}", mac, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadrust_api::{ApiError, DeviceApi, MockDeviceApi, MockProtocolClient};
    use broadrust_types::PollData;
    use std::net::Ipv4Addr;

    fn record(mac: &str) -> DeviceRecord {
        DeviceRecord {
            host: Ipv4Addr::new(192, 168, 0, 10),
            mac: mac.parse().unwrap(),
            devtype: 0x2737,
            name: "Office".to_string(),
            timeout_secs: 5,
            lock: None,
        }
    }

    fn temp_store(tag: &str) -> RecordStore {
        let path = std::env::temp_dir().join(format!(
            "broadrust-hub-{}-{}.json",
            std::process::id(),
            tag
        ));
        let _ = std::fs::remove_file(&path);
        RecordStore::new(path)
    }

    /// A protocol client whose generated devices authenticate and poll
    /// successfully; discovery and keep-alive are inert.
    fn happy_client() -> MockProtocolClient {
        let mut client = MockProtocolClient::new();
        client.expect_gen_device().returning(|_| {
            let mut api = MockDeviceApi::new();
            api.expect_auth().returning(|| Ok(()));
            api.expect_fetch_status().returning(|| Ok(PollData::new()));
            api.expect_get_fwversion().returning(|| Ok(0x44));
            Ok(Box::new(api) as Box<dyn DeviceApi>)
        });
        client.expect_discover().returning(|_, _| Ok(vec![]));
        client.expect_keep_alive().returning(|_| Ok(()));
        client
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_registers_device_and_persists_record() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("setup"));
        let rec = record("34ea34010203");

        hub.setup(rec.clone()).await.unwrap();

        let session = hub.device(rec.mac).unwrap();
        assert_eq!(session.fw_version(), Some(0x44));
        assert_eq!(hub.store.load().unwrap(), vec![rec.clone()]);
        assert!(hub.poll_results(rec.mac).is_some());

        hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_locked_device_fails_and_emits_one_event() {
        let mut client = MockProtocolClient::new();
        client.expect_gen_device().returning(|_| {
            let mut api = MockDeviceApi::new();
            api.expect_auth()
                .returning(|| Err(ApiError::AuthenticationDenied));
            Ok(Box::new(api) as Box<dyn DeviceApi>)
        });

        let hub = Hub::new(Arc::new(client), temp_store("locked"));
        let (_sub, mut rx) = hub.subscribe();

        let err = hub.setup(record("34ea34010203")).await.unwrap_err();
        assert!(matches!(err, Error::Locked));
        assert_eq!(err.code(), "invalid_auth");
        assert!(matches!(rx.try_recv(), Ok(Event::ReauthNeeded { .. })));
        assert!(hub.device(record("34ea34010203").mac).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_timeout_is_not_ready() {
        let mut client = MockProtocolClient::new();
        client.expect_gen_device().returning(|_| {
            let mut api = MockDeviceApi::new();
            api.expect_auth().returning(|| Err(ApiError::NetworkTimeout));
            Ok(Box::new(api) as Box<dyn DeviceApi>)
        });

        let hub = Hub::new(Arc::new(client), temp_store("notready"));
        let err = hub.setup(record("34ea34010203")).await.unwrap_err();
        assert!(matches!(err, Error::NotReady(ApiError::NetworkTimeout)));
        assert_eq!(err.code(), "cannot_connect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failed_initial_poll_is_not_ready() {
        let mut client = MockProtocolClient::new();
        client.expect_gen_device().returning(|_| {
            let mut api = MockDeviceApi::new();
            api.expect_auth().returning(|| Ok(()));
            api.expect_fetch_status()
                .returning(|| Err(ApiError::NetworkTimeout));
            Ok(Box::new(api) as Box<dyn DeviceApi>)
        });

        let hub = Hub::new(Arc::new(client), temp_store("poll-notready"));
        let err = hub.setup(record("34ea34010203")).await.unwrap_err();
        assert!(matches!(err, Error::NotReady(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_unsupported_type_is_rejected() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("unsupported"));
        let mut rec = record("34ea34010203");
        rec.devtype = 0xbeef;

        let err = hub.setup(rec).await.unwrap_err();
        assert_eq!(err.code(), "not_supported");
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_twice_is_already_registered() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("dup"));
        let rec = record("34ea34010203");

        hub.setup(rec.clone()).await.unwrap();
        let err = hub.setup(rec).await.unwrap_err();
        assert_eq!(err.code(), "already_configured");

        hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unload_is_idempotent() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("idem"));
        let mac: MacAddr = "34ea34010203".parse().unwrap();

        // Never set up: both unloads succeed.
        hub.unload(mac).await.unwrap();
        hub.unload(mac).await.unwrap();

        // Set up, then unload twice: both succeed.
        hub.setup(record("34ea34010203")).await.unwrap();
        hub.unload(mac).await.unwrap();
        hub.unload(mac).await.unwrap();
        assert!(hub.device(mac).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_reloads_with_new_name() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("rename"));
        let rec = record("34ea34010203");

        hub.setup(rec.clone()).await.unwrap();
        hub.rename(rec.mac, "Living Room").await.unwrap();

        let session = hub.device(rec.mac).unwrap();
        assert_eq!(session.name(), "Living Room");
        assert_eq!(hub.store.load().unwrap()[0].name, "Living Room");

        hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_unknown_device() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("rename-unknown"));
        let mac: MacAddr = "34ea34010203".parse().unwrap();
        let err = hub.rename(mac, "Nope").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_subscription_released_on_unload() {
        let hub = Hub::new(Arc::new(happy_client()), temp_store("subs"));
        let rec = record("34ea34010203");
        hub.setup(rec.clone()).await.unwrap();

        let (sub, _rx) = hub.subscribe();
        // One hub-internal listener (record sync) plus ours.
        assert_eq!(hub.bus.listener_count(), 2);
        assert!(hub.attach_subscription(rec.mac, sub));

        hub.unload(rec.mac).await.unwrap();
        assert_eq!(hub.bus.listener_count(), 0);
    }
}
