//! Periodic status polling
//!
//! One poller task per registered device. Results are published on a
//! `watch` channel: consumers always see the last good metrics, plus
//! whether the most recent attempt succeeded. The task never crashes
//! on device failures; it degrades availability and keeps scheduling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use broadrust_api::ApiError;
use broadrust_types::{PollData, PollResult};

use crate::constants::{POLL_FAILURE_GRACE_INTERVALS, POLL_SUSPEND_FAILURES};
use crate::debounce::Debouncer;
use crate::events::{Event, EventBus};
use crate::session::DeviceSession;

/// Running poller task for one device.
pub struct PollerHandle {
    rx: watch::Receiver<PollResult>,
    refresh: Arc<Debouncer>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// A receiver of published results. `changed()` resolves on every
    /// poll attempt, successful or not.
    pub fn subscribe(&self) -> watch::Receiver<PollResult> {
        self.rx.clone()
    }

    /// Snapshot of the latest published result.
    pub fn latest(&self) -> PollResult {
        self.rx.borrow().clone()
    }

    /// Debounced manual refresh: immediate when idle, coalesced into
    /// one trailing poll during the cooldown window.
    pub fn request_refresh(&self) {
        self.refresh.request();
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the poller for `session`.
///
/// `initial` seeds the channel with metrics already fetched during
/// setup; seeding skips the immediate first poll. `scout_refresh`, when
/// given, is nudged whenever the device becomes unavailable so a device
/// that moved hosts is re-discovered.
pub fn spawn(
    session: Arc<DeviceSession>,
    bus: EventBus,
    scout_refresh: Option<Arc<Debouncer>>,
    initial: Option<PollData>,
) -> PollerHandle {
    spawn_with_interval(
        session.kind().poll_interval(),
        session,
        bus,
        scout_refresh,
        initial,
    )
}

pub fn spawn_with_interval(
    interval: Duration,
    session: Arc<DeviceSession>,
    bus: EventBus,
    scout_refresh: Option<Arc<Debouncer>>,
    initial: Option<PollData>,
) -> PollerHandle {
    let seeded = initial.is_some();
    let first = match initial {
        Some(data) => PollResult::ok(data),
        None => PollResult::default(),
    };

    let (tx, rx) = watch::channel(first);
    let refresh = Arc::new(Debouncer::new(interval / 2));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let refresh_task = Arc::clone(&refresh);
    let task = tokio::spawn(async move {
        let mut worker = Worker {
            session,
            bus,
            scout_refresh,
            tx,
            interval,
            failures: 0,
            suspended: false,
            available: if seeded { Some(true) } else { None },
            last_success: if seeded { Some(Instant::now()) } else { None },
        };

        let start = if seeded {
            Instant::now() + interval
        } else {
            Instant::now()
        };
        let mut ticker = time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Scheduled cadence pauses while suspended; manual
                // refreshes still go through below.
                _ = ticker.tick(), if !worker.suspended => {}
                _ = refresh_task.triggered() => {}
                _ = shutdown_rx.changed() => break,
            }
            worker.poll_once().await;
        }
        debug!("poller for {} stopped", worker.session.host());
    });

    PollerHandle {
        rx,
        refresh,
        shutdown: shutdown_tx,
        task,
    }
}

struct Worker {
    session: Arc<DeviceSession>,
    bus: EventBus,
    scout_refresh: Option<Arc<Debouncer>>,
    tx: watch::Sender<PollResult>,
    interval: Duration,
    failures: u32,
    suspended: bool,
    available: Option<bool>,
    last_success: Option<Instant>,
}

impl Worker {
    async fn poll_once(&mut self) {
        match self.session.fetch_status().await {
            Ok(data) => self.on_success(data),
            Err(err) => self.on_failure(err),
        }
    }

    fn on_success(&mut self, data: PollData) {
        if self.available == Some(false) {
            warn!("connected to the device at {}", self.session.host());
        }
        if self.available != Some(true) {
            self.bus.publish(Event::Availability {
                mac: self.session.mac(),
                available: true,
            });
        }
        if self.suspended {
            debug!(
                "resuming scheduled polls of the device at {}",
                self.session.host()
            );
            self.suspended = false;
        }
        self.available = Some(true);
        self.failures = 0;
        self.last_success = Some(Instant::now());
        self.tx.send_replace(PollResult::ok(data));
    }

    fn on_failure(&mut self, err: ApiError) {
        self.failures += 1;
        debug!(
            "poll of the device at {} failed ({} consecutive): {}",
            self.session.host(),
            self.failures,
            err
        );

        // Authorization and OS-level failures count immediately; plain
        // timeouts get a grace period before the device is declared
        // gone.
        let immediate = err.requires_reauth()
            || matches!(err, ApiError::NetworkUnreachable | ApiError::Io(_));
        let grace = self.interval * POLL_FAILURE_GRACE_INTERVALS;
        let grace_expired = self
            .last_success
            .map_or(true, |t| t.elapsed() > grace);

        if self.available != Some(false) && (immediate || grace_expired) {
            self.available = Some(false);
            warn!("disconnected from the device at {}", self.session.host());
            self.bus.publish(Event::Availability {
                mac: self.session.mac(),
                available: false,
            });
            // The device may have moved; ask discovery to look for it.
            if let Some(scout) = &self.scout_refresh {
                scout.request();
            }
        }

        if !self.suspended && self.failures >= POLL_SUSPEND_FAILURES {
            warn!(
                "suspending scheduled polls of the device at {} after {} failures; \
                 manual refreshes still go through",
                self.session.host(),
                self.failures
            );
            self.suspended = true;
        }

        let degraded = self.tx.borrow().failed();
        self.tx.send_replace(degraded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadrust_api::MockDeviceApi;
    use broadrust_types::{DeviceDescriptor, DeviceKind, MacAddr};
    use mockall::Sequence;
    use std::net::Ipv4Addr;

    const INTERVAL: Duration = Duration::from_secs(60);

    fn session_with(api: MockDeviceApi) -> Arc<DeviceSession> {
        let descriptor = DeviceDescriptor::new(
            Ipv4Addr::new(192, 168, 0, 10),
            MacAddr::parse("34ea34010203").unwrap(),
            0x2737,
        );
        Arc::new(DeviceSession::new(descriptor, DeviceKind::Rm2, Box::new(api)))
    }

    fn metrics(value: f64) -> PollData {
        let mut data = PollData::new();
        data.insert("temperature".to_string(), serde_json::json!(value));
        data
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_publishes_metrics() {
        let mut api = MockDeviceApi::new();
        api.expect_fetch_status().returning(|| Ok(metrics(21.5)));

        let handle = spawn_with_interval(
            INTERVAL,
            session_with(api),
            EventBus::new(),
            None,
            None,
        );
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        let result = rx.borrow().clone();
        assert!(result.success);
        assert_eq!(result.data, metrics(21.5));
        assert!(result.fetched_at.is_some());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_cached_metrics() {
        let mut api = MockDeviceApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(metrics(21.5)));
        api.expect_fetch_status()
            .returning(|| Err(ApiError::NetworkTimeout));

        let handle = spawn_with_interval(
            INTERVAL,
            session_with(api),
            EventBus::new(),
            None,
            None,
        );
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        assert!(rx.borrow().success);

        rx.changed().await.unwrap();
        let degraded = rx.borrow().clone();
        assert!(!degraded.success);
        assert_eq!(degraded.data, metrics(21.5));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_degrade_only_after_grace() {
        let mut api = MockDeviceApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(metrics(21.5)));
        api.expect_fetch_status()
            .returning(|| Err(ApiError::NetworkTimeout));

        let bus = EventBus::new();
        let (_sub, mut events) = bus.subscribe();

        let handle =
            spawn_with_interval(INTERVAL, session_with(api), bus, None, None);
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap(); // first success
        assert!(matches!(
            events.try_recv(),
            Ok(Event::Availability { available: true, .. })
        ));

        // Three failed polls inside the grace window: still available.
        for _ in 0..3 {
            rx.changed().await.unwrap();
        }
        assert!(events.try_recv().is_err());

        // The next failure is past the grace period.
        rx.changed().await.unwrap();
        assert!(matches!(
            events.try_recv(),
            Ok(Event::Availability { available: false, .. })
        ));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_os_error_degrades_immediately_and_nudges_discovery() {
        let mut api = MockDeviceApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(metrics(21.5)));
        api.expect_fetch_status()
            .returning(|| Err(ApiError::NetworkUnreachable));

        let bus = EventBus::new();
        let (_sub, mut events) = bus.subscribe();
        let scout_refresh = Arc::new(Debouncer::new(Duration::from_secs(5)));

        let handle = spawn_with_interval(
            INTERVAL,
            session_with(api),
            bus,
            Some(Arc::clone(&scout_refresh)),
            None,
        );
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap(); // success
        let _ = events.try_recv(); // drain the available event

        rx.changed().await.unwrap(); // unreachable
        assert!(matches!(
            events.try_recv(),
            Ok(Event::Availability { available: false, .. })
        ));

        // The scout was asked to look for the device.
        tokio::time::timeout(Duration::from_millis(1), scout_refresh.triggered())
            .await
            .expect("discovery nudge expected");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_suspends_scheduling() {
        let mut api = MockDeviceApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(metrics(21.5)));
        api.expect_fetch_status()
            .times(10)
            .in_sequence(&mut seq)
            .returning(|| Err(ApiError::NetworkTimeout));
        api.expect_fetch_status()
            .returning(|| Ok(metrics(22.0)));

        let handle = spawn_with_interval(
            INTERVAL,
            session_with(api),
            EventBus::new(),
            None,
            None,
        );
        let mut rx = handle.subscribe();

        // One success, then ten straight failures.
        for _ in 0..11 {
            rx.changed().await.unwrap();
        }

        // Scheduling is suspended: nothing polls on its own anymore.
        assert!(
            tokio::time::timeout(Duration::from_secs(600), rx.changed())
                .await
                .is_err()
        );

        // A manual refresh still goes through; success resumes the
        // schedule.
        handle.request_refresh();
        rx.changed().await.unwrap();
        assert!(rx.borrow().success);

        rx.changed().await.unwrap(); // scheduled cadence is back
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeded_poller_skips_immediate_poll() {
        let api = MockDeviceApi::new();
        // No expectations: a fetch before shutdown would panic.

        let handle = spawn_with_interval(
            INTERVAL,
            session_with(api),
            EventBus::new(),
            None,
            Some(metrics(19.0)),
        );

        let initial = handle.latest();
        assert!(initial.success);
        assert_eq!(initial.data, metrics(19.0));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_polls_out_of_schedule() {
        let mut api = MockDeviceApi::new();
        api.expect_fetch_status().returning(|| Ok(metrics(23.0)));

        let handle = spawn_with_interval(
            INTERVAL,
            session_with(api),
            EventBus::new(),
            None,
            Some(metrics(19.0)),
        );
        let mut rx = handle.subscribe();

        handle.request_refresh();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().data, metrics(23.0));

        handle.shutdown().await;
    }
}
